//! CLI argument definitions for the `cdrflow` binary.
//!
//! Uses `clap` v4 derive macros. Flags given here are the last configuration
//! layer and win over the config file and `CDRFLOW_*` environment variables.

use std::path::PathBuf;

use clap::Parser;

use cdrflow_core::config::{CdrflowConfig, SinkMode};

/// CDR batch ingestion daemon.
///
/// Watches the drop directory for compressed CDR batches, parses every line
/// and hands the records to the configured sink before archiving the batch.
#[derive(Parser, Debug, Default)]
#[command(name = "cdrflow")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to the cdrflow.toml configuration file.
    #[arg(short, long, default_value = "cdrflow.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate the configuration and exit without watching anything.
    #[arg(long)]
    pub validate: bool,

    /// Log parsed records instead of storing them (forces `sink.mode = "echo"`).
    #[arg(long)]
    pub dry_run: bool,

    /// Override the drop directory.
    #[arg(long)]
    pub drop_dir: Option<String>,

    /// Override the working directory.
    #[arg(long)]
    pub work_dir: Option<String>,

    /// Override the archive directory.
    #[arg(long)]
    pub archive_dir: Option<String>,

    /// Override the SQLite database path.
    #[arg(long)]
    pub database: Option<String>,
}

impl DaemonCli {
    /// Apply CLI overrides on top of an already loaded configuration.
    pub fn apply_overrides(&self, config: &mut CdrflowConfig) {
        if let Some(level) = &self.log_level {
            config.general.log_level.clone_from(level);
        }
        if let Some(format) = &self.log_format {
            config.general.log_format.clone_from(format);
        }
        if let Some(dir) = &self.drop_dir {
            config.ingest.drop_dir.clone_from(dir);
        }
        if let Some(dir) = &self.work_dir {
            config.ingest.work_dir.clone_from(dir);
        }
        if let Some(dir) = &self.archive_dir {
            config.ingest.archive_dir.clone_from(dir);
        }
        if let Some(path) = &self.database {
            config.sink.database_path.clone_from(path);
        }
        if self.dry_run {
            config.sink.mode = SinkMode::Echo;
        }
    }
}
