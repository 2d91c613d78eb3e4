use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::bounded;
use super::geo::distance_km;
use crate::error::Error;
use crate::models::trip::CustomerStop;
use crate::models::Position;
use crate::store::CustomerStopStore;

/// Result of one geofence pass over a trip's open stops.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Evaluation {
    pub newly_completed: Vec<String>,
    /// Stops still incomplete after this pass.
    pub remaining: usize,
}

impl Evaluation {
    /// Whether a trip-completion check is warranted after this pass.
    pub fn needs_completion_check(&self) -> bool {
        !self.newly_completed.is_empty() || self.remaining == 0
    }
}

/// Stops within `radius_km` of `position`, with their distance.
pub fn stops_within<'a>(
    stops: &'a [CustomerStop],
    position: Position,
    radius_km: f64,
) -> impl Iterator<Item = (&'a CustomerStop, f64)> + 'a {
    stops.iter().filter_map(move |stop| {
        let d = distance_km(position, Position::new(stop.latitude, stop.longitude));
        (d <= radius_km).then_some((stop, d))
    })
}

pub struct GeofenceEngine<S> {
    store: Arc<S>,
    timeout: Duration,
}

impl<S: CustomerStopStore> GeofenceEngine<S> {
    pub fn new(store: Arc<S>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Marks every incomplete stop of `trip_id` within `radius_km` of
    /// `position` as completed at `at`. A failed mark is logged and the
    /// remaining stops are still evaluated.
    pub async fn evaluate(
        &self,
        trip_id: Uuid,
        position: Position,
        radius_km: f64,
        at: NaiveDateTime,
    ) -> Result<Evaluation, Error> {
        let stops = bounded(
            "list_incomplete",
            self.timeout,
            self.store.list_incomplete(trip_id),
        )
        .await?;

        let mut evaluation = Evaluation { newly_completed: Vec::new(), remaining: stops.len() };
        for (stop, distance) in stops_within(&stops, position, radius_km) {
            let code = &stop.customer_code;
            match bounded(
                "mark_completed",
                self.timeout,
                self.store.mark_completed(trip_id, code, at),
            )
            .await
            {
                Ok(true) => {
                    info!(trip_id = %trip_id, customer = %code, distance_km = distance, "customer stop completed");
                    evaluation.newly_completed.push(code.clone());
                    evaluation.remaining -= 1;
                }
                Ok(false) => {
                    debug!(trip_id = %trip_id, customer = %code, "customer stop already completed");
                    evaluation.remaining -= 1;
                }
                Err(e) => error!(trip_id = %trip_id, customer = %code, "{}", e),
            }
        }
        Ok(evaluation)
    }
}
