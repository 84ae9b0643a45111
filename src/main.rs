//! Foreman - autonomous coding-agent orchestrator
//!
//! Main entry point for the CLI application.

use clap::Parser;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use foreman::cli::{commands, Cli};
use foreman::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG-controlled diagnostics on stderr; the ledger is the product output
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();

    let cli = Cli::parse();
    let config = Config::load();

    commands::run(cli, config).await
}
