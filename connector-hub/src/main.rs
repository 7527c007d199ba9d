use anyhow::{Context, Result};
use area::config::{encryption_key_from_env, load_from_env};
use area::{PersistenceGateway, Scheduler, SqliteGateway};
use connector_hub::builtin_registry;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "connector_hub=info,area=info".into()),
        )
        .init();

    info!("Connector Hub starting...");

    let config = load_from_env().context("Failed to load configuration")?;
    config.validate()?;

    let encryption_key = encryption_key_from_env()?;

    info!(
        database = %config.database.path,
        public_url = %config.oauth.public_url,
        max_concurrency = config.scheduler.max_concurrency,
        "Configuration loaded"
    );

    let gateway = SqliteGateway::open(&config.database.path, &encryption_key)
        .context("Failed to open database")?;
    let gateway: Arc<dyn PersistenceGateway> = Arc::new(gateway);
    info!("Persistence gateway initialized");

    let registry = Arc::new(builtin_registry(&config)?);
    info!(connectors = registry.len(), "Connector registry initialized");

    let scheduler = Scheduler::new(registry, gateway, config.scheduler_config());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = scheduler.start(shutdown_rx);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutdown signal received");
    let _ = shutdown_tx.send(true);
    handle.await.context("Scheduler task failed")?;

    info!("Connector Hub stopped");
    Ok(())
}
