use std::sync::Arc;

use chrono::{NaiveDateTime, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::bounded;
use super::geofence::GeofenceEngine;
use super::lifecycle::TripLifecycle;
use super::registry::{select_trip, TripRegistry};
use super::stop_detector::LongStopEvent;
use super::vehicle_state::{SampleOrder, VehicleState, VehicleStateStore};
use crate::config::MonitorSettings;
use crate::error::Error;
use crate::models::message::TelemetrySample;
use crate::models::trip::{Trip, TripChange, TripState};
use crate::models::trip_points::TripPoint;
use crate::models::Position;
use crate::store::Store;

/// What a single telemetry sample caused.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TelemetryOutcome {
    pub trip_id: Option<Uuid>,
    pub started: bool,
    pub long_stop: Option<LongStopEvent>,
    pub completed: Vec<String>,
    pub closed: bool,
}

/// The monitoring core. Cheap to clone; clones share all state.
pub struct Monitor<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for Monitor<S> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

pub(super) struct Inner<S> {
    pub(super) store: Arc<S>,
    pub(super) settings: MonitorSettings,
    registry: TripRegistry,
    vehicles: VehicleStateStore,
    geofence: GeofenceEngine<S>,
    pub(super) lifecycle: TripLifecycle<S>,
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

impl<S: Store> Monitor<S> {
    pub fn new(store: Arc<S>, settings: MonitorSettings) -> Self {
        let registry = TripRegistry::new();
        let inner = Inner {
            geofence: GeofenceEngine::new(Arc::clone(&store), settings.store_timeout),
            lifecycle: TripLifecycle::new(
                Arc::clone(&store),
                registry.clone(),
                settings.store_timeout,
            ),
            vehicles: VehicleStateStore::new(settings.long_stop_minutes),
            registry,
            settings,
            store,
        };
        Self { inner: Arc::new(inner) }
    }

    pub(super) fn inner(&self) -> &Inner<S> {
        &self.inner
    }

    #[cfg(test)]
    pub fn registry(&self) -> &TripRegistry {
        &self.inner.registry
    }

    #[cfg(test)]
    pub fn tracked_vehicles(&self) -> usize {
        self.inner.vehicles.len()
    }

    pub fn is_monitored(&self, plate: &str) -> bool {
        self.inner.registry.get(plate).is_some()
    }

    /// Drops the in-memory state of a vehicle that is no longer monitored.
    /// State in use by a sample in flight is kept.
    pub fn release_vehicle(&self, plate: &str) -> bool {
        !self.is_monitored(plate) && self.inner.vehicles.evict(plate)
    }

    /// Rebuilds the registry from the trips the store reports as open.
    pub async fn reconcile(&self) -> Result<usize, Error> {
        let inner = &self.inner;
        let trips = bounded(
            "list_active_trips",
            inner.settings.store_timeout,
            inner.store.list_active_trips(),
        )
        .await?;
        let monitored = inner.registry.reconcile(trips);
        info!(monitored, "trip registry reconciled");
        Ok(monitored)
    }

    /// Applies one trip-change notification. Duplicates are no-ops.
    pub fn on_trip_change(&self, change: TripChange) {
        let registry = &self.inner.registry;
        let (trip_id, plate) = (change.trip_id(), change.plate());
        match &change {
            TripChange::Created { .. } => match registry.register(plate, trip_id) {
                Ok(true) => info!(plate = %plate, trip_id = %trip_id, "monitoring trip"),
                Ok(false) => debug!(plate = %plate, trip_id = %trip_id, "duplicate trip-created"),
                Err(e) => warn!(plate = %plate, "{}", e),
            },
            TripChange::Ended { .. } => {
                match registry.remove(plate, trip_id) {
                    Ok(true) => info!(plate = %plate, trip_id = %trip_id, "stopped monitoring trip"),
                    Ok(false) => debug!(plate = %plate, trip_id = %trip_id, "trip already unmonitored"),
                    Err(e) => warn!(plate = %plate, "{}", e),
                }
                self.inner.lifecycle.forget(trip_id);
            }
        }
    }

    /// Processes one sample for its vehicle. Never fails: problems are
    /// logged and the vehicle's in-memory state stays consistent.
    pub async fn on_telemetry(&self, sample: TelemetrySample) -> TelemetryOutcome {
        let mut vehicle = self.inner.vehicles.lock(&sample.plate).await;
        let order = vehicle.accept(&sample);

        let mut outcome = TelemetryOutcome::default();
        let Some(trip_id) = self.inner.registry.get(&sample.plate) else {
            vehicle.trip = None;
            debug!(plate = %sample.plate, "no monitored trip, skipping sample");
            return outcome;
        };
        outcome.trip_id = Some(trip_id);

        self.log_coordinates(trip_id, &sample);

        match order {
            SampleOrder::InOrder => {}
            SampleOrder::Untimed => {
                let e = Error::Validation(format!("unparsable locTime for {}", sample.plate));
                warn!(plate = %sample.plate, "{}", e);
                return outcome;
            }
            SampleOrder::Stale => {
                let e = Error::Validation(format!("out-of-order sample for {}", sample.plate));
                warn!(plate = %sample.plate, loc_time = ?sample.loc_time, "{}", e);
                return outcome;
            }
        }

        outcome.long_stop = match vehicle.detector.observe(&sample) {
            Ok(event) => event,
            Err(e) => {
                warn!(plate = %sample.plate, "{}", e);
                None
            }
        };
        if let Some(event) = &outcome.long_stop {
            info!(
                plate = %event.plate,
                stop_start = %event.stop_start,
                dwell_secs = (event.detected_at - event.stop_start).num_seconds(),
                "long stop detected"
            );
        }

        let Some(mut trip) = self.current_trip(&mut vehicle, trip_id, &sample.plate).await else {
            return outcome;
        };
        let trip_id = trip.trip_id;
        outcome.trip_id = Some(trip_id);

        if sample.speed > 0.0 {
            match self.inner.lifecycle.start_if_planned(&mut trip, now()).await {
                Ok(started) => outcome.started = started,
                Err(e) => error!(trip_id = %trip_id, code = e.code(), "{}", e),
            }
        }
        let active = trip.state() == TripState::Active;
        vehicle.trip = Some(trip);
        if !active {
            return outcome;
        }

        let mut positions = vec![sample.position];
        if let Some(event) = &outcome.long_stop {
            positions.push(event.location);
        }
        for position in positions {
            let (completed, closed) = self.complete_stops_near(trip_id, &sample.plate, position).await;
            outcome.completed.extend(completed);
            if closed {
                outcome.closed = true;
                vehicle.trip = None;
                break;
            }
        }
        outcome
    }

    /// Geofence pass at the live radius followed by the shared completion
    /// check. Both the per-sample and the long-stop path come through here.
    async fn complete_stops_near(
        &self,
        trip_id: Uuid,
        plate: &str,
        position: Position,
    ) -> (Vec<String>, bool) {
        let inner = &self.inner;
        let at = now();
        let evaluation = match inner
            .geofence
            .evaluate(trip_id, position, inner.settings.live_radius_km, at)
            .await
        {
            Ok(evaluation) => evaluation,
            Err(e) => {
                error!(trip_id = %trip_id, code = e.code(), "{}", e);
                return (Vec::new(), false);
            }
        };

        if !evaluation.needs_completion_check() {
            return (evaluation.newly_completed, false);
        }
        let closed = match inner.lifecycle.check_and_maybe_close(trip_id, plate, at).await {
            Ok(closed) => closed,
            Err(e) => {
                error!(trip_id = %trip_id, code = e.code(), "{}", e);
                false
            }
        };
        (evaluation.newly_completed, closed)
    }

    /// The cached trip when it still matches the registry, otherwise a fresh
    /// read from the store.
    async fn current_trip(
        &self,
        vehicle: &mut VehicleState,
        trip_id: Uuid,
        plate: &str,
    ) -> Option<Trip> {
        if let Some(trip) = vehicle.trip.take().filter(|t| t.trip_id == trip_id) {
            return Some(trip);
        }

        let inner = &self.inner;
        let open = match bounded(
            "find_open_trips_for_vehicle",
            inner.settings.store_timeout,
            inner.store.find_open_trips_for_vehicle(plate),
        )
        .await
        {
            Ok(open) => open,
            Err(e) => {
                error!(plate = %plate, code = e.code(), "{}", e);
                return None;
            }
        };
        if let Some(found) = open.iter().find(|t| t.trip_id == trip_id) {
            if open.len() > 1 {
                let e = Error::InconsistentRegistry(format!(
                    "{} open trips for {plate}, following monitored trip {trip_id}",
                    open.len()
                ));
                warn!(plate = %plate, "{}", e);
            }
            return Some(found.clone());
        }

        // The registered trip ended while a notification was lost or replayed.
        // Hand the plate over to whatever is open now.
        info!(plate = %plate, trip_id = %trip_id, "monitored trip is no longer open");
        if let Err(e) = inner.registry.remove(plate, trip_id) {
            warn!(plate = %plate, "{}", e);
        }
        let next = select_trip(&open)?.clone();
        match inner.registry.register(plate, next.trip_id) {
            Ok(_) => {
                info!(plate = %plate, trip_id = %next.trip_id, "monitoring trip");
                Some(next)
            }
            Err(e) => {
                warn!(plate = %plate, "{}", e);
                None
            }
        }
    }

    fn log_coordinates(&self, trip_id: Uuid, sample: &TelemetrySample) {
        let point = TripPoint {
            trip_id,
            plate: sample.plate.clone(),
            lat: sample.position.lat,
            lon: sample.position.lon,
            speed: sample.speed,
            loc_time: sample.loc_time.unwrap_or_else(now),
        };
        let store = Arc::clone(&self.inner.store);
        let timeout = self.inner.settings.store_timeout;
        tokio::spawn(async move {
            if let Err(e) = bounded("append", timeout, store.append(point)).await {
                error!(trip_id = %trip_id, code = e.code(), "{}", e);
            }
        });
    }
}
