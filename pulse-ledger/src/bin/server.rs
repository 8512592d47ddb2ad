//! Pulse ledger TCP server binary

use pulse_ledger::{server::Server, Config, Ledger};
use tokio::sync::broadcast;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());
    if config.server.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!("Starting pulse ledger server");

    // Refuses to start on a corrupt genesis
    let ledger = Ledger::open(config.clone())?;
    let server = Server::bind(config.server.clone(), ledger.handle().clone()).await?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let server_task = tokio::spawn(server.run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down pulse ledger server");

    let _ = shutdown_tx.send(());
    server_task.await??;
    ledger.shutdown().await?;
    Ok(())
}
