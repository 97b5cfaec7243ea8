//! Prometheus scrape endpoint.
//!
//! `metrics-exporter-prometheus` serves `GET /metrics` from its built-in
//! HTTP listener; every `metrics::counter!` / `histogram!` call in the
//! pipeline records into the recorder installed here.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;

use cdrflow_core::config::MetricsConfig;

/// Resolve `listen_addr:port` into a socket address.
pub fn listen_addr(config: &MetricsConfig) -> Result<SocketAddr> {
    format!("{}:{}", config.listen_addr, config.port)
        .parse::<SocketAddr>()
        .with_context(|| {
            format!(
                "invalid metrics listen address '{}:{}'",
                config.listen_addr, config.port
            )
        })
}

/// Install the global recorder and start the HTTP listener.
///
/// Only one recorder can exist per process; a second call fails.
pub fn install_metrics_recorder(config: &MetricsConfig) -> Result<()> {
    let addr = listen_addr(config)?;

    if addr.ip().is_unspecified() {
        tracing::warn!(
            listen_addr = %addr,
            "metrics endpoint listens on all interfaces"
        );
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("failed to install Prometheus recorder")?;

    cdrflow_core::metrics::describe_all();

    tracing::info!(listen_addr = %addr, endpoint = %config.endpoint, "metrics endpoint active");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_default_address() {
        let addr = listen_addr(&MetricsConfig::default()).unwrap();
        assert_eq!(addr, "127.0.0.1:9100".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn rejects_hostnames() {
        let config = MetricsConfig {
            listen_addr: "metrics.local".to_owned(),
            ..MetricsConfig::default()
        };
        let err = listen_addr(&config).unwrap_err();
        assert!(err.to_string().contains("metrics.local"));
    }
}
