//! Publish events and seed action configuration by hand.
//!
//! `publish` is the re-drive path for a FAILED event: it sends a new message
//! with a new id, leaving the failed row in the event log untouched.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

use herald_broker::{PgBroker, PgBrokerOptions};
use herald_common::{ActionConfig, Config, EventType, Payload};
use herald_dispatch::EventSender;
use herald_events::{PgActionConfigStore, PgEventLog};

#[derive(Parser)]
#[command(name = "herald-send")]
#[command(about = "Publish events to the herald pipeline")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish one event and print its id
    Publish {
        /// Event type, e.g. user_registered
        event_type: String,

        /// Payload as a JSON object
        #[arg(default_value = "{}")]
        payload: String,
    },

    /// Create or replace the action list for an event type
    SeedConfig {
        /// Event type, e.g. user_registered
        event_type: String,

        /// Actions as a JSON array, e.g. '[{"type": "send_sms", "receiver": "{{ phone }}"}]'
        actions: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("herald=warn".parse()?))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to DATABASE_URL")?;

    match cli.command {
        Commands::Publish {
            event_type,
            payload,
        } => {
            let payload: Payload =
                serde_json::from_str(&payload).context("Payload must be a JSON object")?;

            let broker = Arc::new(PgBroker::new(
                pool.clone(),
                PgBrokerOptions {
                    partitions: config.partitions,
                    poll_interval: config.poll_interval,
                },
            ));
            let sender =
                EventSender::new(broker, Arc::new(PgEventLog::new(pool.clone())), &config.topic);

            let id = sender.send(EventType::from(event_type), payload).await?;
            sender.close().await;
            println!("{id}");
        }
        Commands::SeedConfig {
            event_type,
            actions,
        } => {
            let actions: Vec<ActionConfig> = serde_json::from_str(&actions)
                .context("Actions must be a JSON array of action configs")?;
            let event_type = EventType::from(event_type);

            PgActionConfigStore::new(pool.clone())
                .upsert(&event_type, &actions)
                .await?;
            println!("{event_type}: {} action(s)", actions.len());
        }
    }

    pool.close().await;
    Ok(())
}
