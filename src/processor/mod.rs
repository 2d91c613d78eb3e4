pub mod backfill;
pub mod dispatcher;
pub mod geo;
pub mod geofence;
pub mod lifecycle;
pub mod message_processor;
pub mod monitor;
pub mod registry;
pub mod stop_detector;
pub mod vehicle_state;

use std::future::Future;
use std::time::Duration;

use crate::error::Error;

/// Runs one store call under `limit`, mapping failures into the core's
/// error taxonomy.
pub async fn bounded<T, F>(operation: &'static str, limit: Duration, call: F) -> Result<T, Error>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => Err(Error::ExternalWrite { operation, source }),
        Err(_) => Err(Error::Timeout { operation }),
    }
}
