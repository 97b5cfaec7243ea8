use anyhow::{Context, Result};
use clap::Parser;

use cdrflow_core::config::CdrflowConfig;
use cdrflow_daemon::{DaemonCli, Orchestrator, logging};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    // file -> env -> CLI
    let mut config = CdrflowConfig::from_file(&cli.config)
        .await
        .with_context(|| format!("failed to read {}", cli.config.display()))?;
    config.apply_env_overrides();
    cli.apply_overrides(&mut config);
    config
        .validate()
        .with_context(|| format!("invalid configuration in {}", cli.config.display()))?;

    if cli.validate {
        println!("{}: configuration is valid", cli.config.display());
        return Ok(());
    }

    logging::init_tracing(&config.general)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "cdrflow starting"
    );

    let orchestrator = Orchestrator::build_from_config(config)?;
    if let Err(e) = orchestrator.run().await {
        tracing::error!(error = %e, "cdrflow terminated with error");
        return Err(e);
    }
    Ok(())
}
