//! Logging initialization for the `cdrflow` binary.
//!
//! Installs a `tracing-subscriber` registry from the `[general]` section:
//! `RUST_LOG` wins when set, otherwise `general.log_level` is used.
//! `json` emits one JSON object per event, `pretty` is for terminals.
//! Echoed records go to the `cdrflow::echo` target, so
//! `RUST_LOG=info,cdrflow::echo=off` silences them.

use anyhow::{Result, anyhow, bail};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use cdrflow_core::config::GeneralConfig;

/// Install the global tracing subscriber. Call once, before the first event.
pub fn init_tracing(config: &GeneralConfig) -> Result<()> {
    if !matches!(config.log_format.as_str(), "json" | "pretty") {
        bail!(
            "unknown log format '{}', expected 'json' or 'pretty'",
            config.log_format
        );
    }

    let registry = tracing_subscriber::registry().with(env_filter(&config.log_level));
    let installed = if config.log_format == "json" {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().pretty()).try_init()
    };

    installed.map_err(|e| {
        anyhow!(
            "failed to install {} tracing subscriber: {e}",
            config.log_format
        )
    })
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}
