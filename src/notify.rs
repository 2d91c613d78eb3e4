use crate::db::DbPool;
use crate::models::trip::TripChange;
use crate::processor::monitor::Monitor;
use crate::store::Store;
use sqlx::postgres::PgListener;
use std::time::Duration;
use tracing::{error, info, warn};

/// Trip-created / trip-ended notifications delivered over Postgres NOTIFY.
pub struct TripChangeFeed {
    listener: PgListener,
    channel: String,
}

impl TripChangeFeed {
    /// Subscribes before reconciliation so no change between the two is lost;
    /// notifications queue up until `run` starts draining them.
    pub async fn subscribe(pool: &DbPool, channel: &str) -> anyhow::Result<Self> {
        let mut listener = PgListener::connect_with(pool).await?;
        listener.listen(channel).await?;
        info!("Listening for trip changes on channel: {}", channel);
        Ok(Self { listener, channel: channel.to_string() })
    }

    pub async fn run<S: Store>(mut self, monitor: Monitor<S>) -> anyhow::Result<()> {
        loop {
            match self.listener.try_recv().await {
                Ok(Some(notification)) => {
                    match serde_json::from_str::<TripChange>(notification.payload()) {
                        Ok(change) => monitor.on_trip_change(change),
                        Err(e) => warn!("Invalid trip change payload '{}': {}", notification.payload(), e),
                    }
                }
                Ok(None) => {
                    // Connection dropped; anything sent meanwhile is lost, so resync.
                    warn!("Trip change listener on {} reconnecting", self.channel);
                    if let Err(e) = monitor.reconcile().await {
                        error!("Registry resync failed: {}", e);
                    }
                }
                Err(e) => {
                    error!("Trip change listener error: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }
}
