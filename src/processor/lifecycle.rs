use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::bounded;
use super::registry::TripRegistry;
use crate::error::Error;
use crate::models::trip::Trip;
use crate::store::{CustomerStopStore, TripStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Closure {
    InFlight,
    Closed,
}

/// Drives trips from planned to active to completed.
pub struct TripLifecycle<S> {
    store: Arc<S>,
    registry: TripRegistry,
    closures: DashMap<Uuid, Closure>,
    timeout: Duration,
}

impl<S: TripStore + CustomerStopStore> TripLifecycle<S> {
    pub fn new(store: Arc<S>, registry: TripRegistry, timeout: Duration) -> Self {
        Self { store, registry, closures: DashMap::new(), timeout }
    }

    /// Persists the start time on the first movement of a planned trip and
    /// records it on `trip` so later samples need not re-read it.
    pub async fn start_if_planned(&self, trip: &mut Trip, at: NaiveDateTime) -> Result<bool, Error> {
        if trip.actual_start_time.is_some() {
            return Ok(false);
        }
        bounded(
            "set_actual_start",
            self.timeout,
            self.store.set_actual_start(trip.trip_id, at),
        )
        .await?;
        trip.actual_start_time = Some(at);
        info!(trip_id = %trip.trip_id, plate = %trip.vehicle_plate, "trip started");
        Ok(true)
    }

    /// Closes the trip when every customer stop is completed. Concurrent or
    /// repeated calls for the same trip produce at most one closure; the
    /// store refuses a second closure across processes.
    pub async fn check_and_maybe_close(
        &self,
        trip_id: Uuid,
        plate: &str,
        at: NaiveDateTime,
    ) -> Result<bool, Error> {
        match self.closures.entry(trip_id) {
            Entry::Occupied(state) => {
                debug!(trip_id = %trip_id, state = ?state.get(), "completion check skipped");
                return Ok(false);
            }
            Entry::Vacant(slot) => {
                slot.insert(Closure::InFlight);
            }
        }

        match self.close_if_complete(trip_id, at).await {
            Ok(true) => {
                self.closures.insert(trip_id, Closure::Closed);
                if let Err(e) = self.registry.remove(plate, trip_id) {
                    warn!(trip_id = %trip_id, "{}", e);
                }
                info!(trip_id = %trip_id, plate = %plate, "trip completed");
                Ok(true)
            }
            outcome => {
                self.closures.remove(&trip_id);
                outcome
            }
        }
    }

    async fn close_if_complete(&self, trip_id: Uuid, at: NaiveDateTime) -> Result<bool, Error> {
        let total = bounded("count_total", self.timeout, self.store.count_total(trip_id)).await?;
        if total == 0 {
            debug!(trip_id = %trip_id, "trip has no customer stops, leaving open");
            return Ok(false);
        }
        let completed =
            bounded("count_completed", self.timeout, self.store.count_completed(trip_id)).await?;
        if completed < total {
            debug!(trip_id = %trip_id, completed, total, "trip still has open stops");
            return Ok(false);
        }

        let closed = bounded("close_trip", self.timeout, self.store.close_trip(trip_id, at)).await?;
        if !closed {
            debug!(trip_id = %trip_id, "trip already ended in the store");
        }
        Ok(closed)
    }

    /// Drops bookkeeping for a trip that was closed, once its end has been
    /// acknowledged by the change feed.
    pub fn forget(&self, trip_id: Uuid) {
        self.closures.remove_if(&trip_id, |_, state| *state == Closure::Closed);
    }
}
