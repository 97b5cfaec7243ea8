//! Daemon assembly and lifecycle.
//!
//! The [`Orchestrator`] owns the loaded configuration, the configured sink
//! and the shared [`IngestPipeline`]. Running it performs, in order:
//!
//! 1. Directory setup and recovery of batches orphaned in the working
//!    directory by a previous crash
//! 2. Startup sweep of the drop directory (inside [`DirectoryWatcher::run`])
//! 3. Live watching until `SIGTERM`/`SIGINT` or the shutdown token fires
//!
//! Batches still in flight at shutdown are abandoned. Their archives stay
//! in the working directory and are recovered on the next start.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use tokio_util::sync::CancellationToken;

use cdrflow_core::config::{CdrflowConfig, SinkMode};
use cdrflow_pipeline::{ConfiguredSink, DirectoryWatcher, IngestConfig, IngestPipeline};

use crate::metrics_server;

/// The assembled daemon.
pub struct Orchestrator {
    config: CdrflowConfig,
    pipeline: Arc<IngestPipeline<ConfiguredSink>>,
    shutdown: CancellationToken,
}

impl Orchestrator {
    /// Load `cdrflow.toml` (plus env overrides) and build the daemon.
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = CdrflowConfig::load(config_path)
            .await
            .with_context(|| format!("failed to load {}", config_path.display()))?;
        Self::build_from_config(config)
    }

    /// Build from an already loaded configuration.
    ///
    /// Opens the sink (creating the SQLite table in persist mode) and installs
    /// the metrics recorder when `[metrics]` is enabled.
    pub fn build_from_config(config: CdrflowConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow!("config validation failed: {e}"))?;

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
        }

        let sink = ConfiguredSink::from_config(&config.sink)
            .map_err(|e| anyhow!("failed to open {} sink: {e}", config.sink.mode))?;
        if config.sink.mode == SinkMode::Echo {
            tracing::warn!("echo mode: records are logged, not stored");
        }

        let ingest = IngestConfig::from_core(&config.ingest);
        let pipeline = IngestPipeline::new(ingest, Arc::new(sink))
            .map_err(|e| anyhow!("failed to build ingest pipeline: {e}"))?;

        tracing::info!(
            drop_dir = %config.ingest.drop_dir,
            archive_dir = %config.ingest.archive_dir,
            generation = %config.ingest.log_generation,
            sink = %config.sink.mode,
            "orchestrator initialized"
        );

        Ok(Self {
            config,
            pipeline: Arc::new(pipeline),
            shutdown: CancellationToken::new(),
        })
    }

    /// Run until a termination signal arrives or the watcher fails.
    pub async fn run(&self) -> Result<()> {
        let watching = self.watch();
        tokio::pin!(watching);

        tokio::select! {
            result = &mut watching => return result,
            signal = wait_for_shutdown_signal() => {
                tracing::info!(signal = signal?, "shutdown signal received");
            }
        }

        self.shutdown.cancel();
        watching.await?;
        tracing::info!("cdrflow stopped");
        Ok(())
    }

    /// Recover, sweep, then watch until the shutdown token is cancelled.
    pub async fn watch(&self) -> Result<()> {
        let recovered = self
            .pipeline
            .recover()
            .await
            .map_err(|e| anyhow!("startup recovery failed: {e}"))?;
        if !recovered.is_empty() {
            tracing::info!(count = recovered.len(), "orphaned batches returned to drop directory");
        }

        DirectoryWatcher::new(Arc::clone(&self.pipeline))
            .run(self.shutdown.clone())
            .await
            .map_err(|e| anyhow!("directory watcher failed: {e}"))
    }

    /// Token that stops [`watch`](Self::watch) when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn pipeline(&self) -> &Arc<IngestPipeline<ConfiguredSink>> {
        &self.pipeline
    }

    pub fn config(&self) -> &CdrflowConfig {
        &self.config
    }
}

/// Wait for `SIGTERM` or `SIGINT` and return which one arrived.
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm =
        signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("failed to install SIGINT handler")?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}
