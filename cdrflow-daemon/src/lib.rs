//! cdrflow daemon library.
//!
//! Exposes the daemon's building blocks for integration tests; production
//! runs go through the `cdrflow` binary (main.rs).

pub mod cli;
pub mod logging;
pub mod metrics_server;
pub mod orchestrator;

pub use cli::DaemonCli;
pub use orchestrator::Orchestrator;
