use std::sync::Arc;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use herald_broker::{PgBroker, PgBrokerOptions};
use herald_common::{AppEnv, Config};
use herald_dispatch::{ActionRegistry, Channels, EventConsumer, EventProcessor};
use herald_events::{PgActionConfigStore, PgEventLog};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize logging
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("herald=info".parse()?));
    if config.app_env == AppEnv::Production {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!("Herald event consumer starting...");
    config.log_redacted();

    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(&config.database_url)
        .await?;
    info!("Connected to database");

    sqlx::migrate!("../../migrations").run(&pool).await?;
    info!("Migrations complete");

    let channels = Channels::from_config(&config)?;
    let registry = ActionRegistry::standard(&channels, config.telegram_chat_id.clone());
    info!(actions = ?registry.kinds(), "Action registry ready");

    let processor = Arc::new(EventProcessor::new(
        Arc::new(PgEventLog::new(pool.clone())),
        Arc::new(PgActionConfigStore::new(pool.clone())),
        registry,
    ));

    let broker = Arc::new(PgBroker::new(
        pool.clone(),
        PgBrokerOptions {
            partitions: config.partitions,
            poll_interval: config.poll_interval,
        },
    ));

    let consumer = Arc::new(EventConsumer::new(
        broker,
        processor,
        config.topic.clone(),
        config.consumer_group.clone(),
    ));

    let on_signal = Arc::clone(&consumer);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, shutting down");
                on_signal.stop();
            }
            Err(e) => error!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });

    let stats = consumer.start_consuming().await?;
    info!(
        succeeded = stats.succeeded,
        failed = stats.failed,
        malformed = stats.malformed,
        "Herald event consumer exited"
    );

    pool.close().await;
    Ok(())
}
