//! Binary entrypoint for the harvester CLI.

use clap::Parser;
use doorstep_harvester::cli::{self, Cli};
use doorstep_harvester::shutdown::ShutdownCoordinator;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("doorstep_harvester=info"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let shutdown = ShutdownCoordinator::shared();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received, draining in-flight work");
                shutdown.request_shutdown();
            }
        });
    }

    cli::execute(cli, shutdown).await
}
