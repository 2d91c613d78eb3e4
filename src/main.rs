mod config;
mod db;
mod error;
mod kafka;
mod models;
mod notify;
mod processor;
mod store;
#[cfg(test)]
mod testing;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use config::AppConfig;
use db::store::PgStore;
use notify::TripChangeFeed;
use processor::dispatcher::Dispatcher;
use processor::monitor::Monitor;
use tracing::{error, info};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "trip-monitor")]
#[command(about = "Real-time vehicle trip monitoring")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Monitor live telemetry (default)
    Run,
    /// Reconstruct stop completion for one trip from its coordinate log
    Backfill {
        #[arg(long)]
        trip_id: Uuid,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load config
    let config = AppConfig::load()?;

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(&config.log_level)
        .init();

    // Init DB
    let pool = db::init_pool(&config.database_url, config.db_max_connections).await?;
    info!("Connected to database");

    let store = Arc::new(PgStore::new(pool.clone()));
    let monitor = Monitor::new(store, config.monitor.clone());

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run(config, pool, monitor).await,
        Command::Backfill { trip_id } => {
            let report = monitor.backfill(trip_id).await?;
            info!(
                trip_id = %report.trip_id,
                state = ?report.state,
                examined = report.examined,
                completed = report.completed.len(),
                closed = report.closed,
                "Backfill finished"
            );
            for (customer, at) in &report.completed {
                info!(customer = %customer, at = %at, "completed");
            }
            Ok(())
        }
    }
}

async fn run(config: AppConfig, pool: db::DbPool, monitor: Monitor<PgStore>) -> anyhow::Result<()> {
    info!("Starting Trip Monitor...");

    let feed = TripChangeFeed::subscribe(&pool, &config.trip_change_channel).await?;

    // Registry must be populated before any telemetry is evaluated
    monitor.reconcile().await?;

    let listener = tokio::spawn(feed.run(monitor.clone()));
    let dispatcher = Dispatcher::new(monitor);
    let consumer = tokio::spawn(async move { kafka::start_kafka_consumer(&config, dispatcher).await });

    let exited = tokio::select! {
        res = listener => {
            res??;
            "Trip change listener"
        }
        res = consumer => {
            res??;
            "Kafka consumer"
        }
    };
    error!("{} exited", exited);
    anyhow::bail!("{exited} exited")
}
