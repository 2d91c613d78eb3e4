use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::warn;
use uuid::Uuid;

use crate::error::Error;
use crate::models::trip::Trip;

/// Monitored trips, keyed by vehicle plate. At most one trip per plate.
#[derive(Debug, Clone, Default)]
pub struct TripRegistry {
    trips: Arc<DashMap<String, Uuid>>,
}

impl TripRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, plate: &str) -> Option<Uuid> {
        self.trips.get(plate).map(|e| *e.value())
    }

    /// Registers `trip_id` for `plate`. Re-registering the same pair is a
    /// no-op; a plate already bound to another trip is left untouched.
    pub fn register(&self, plate: &str, trip_id: Uuid) -> Result<bool, Error> {
        match self.trips.entry(plate.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(trip_id);
                Ok(true)
            }
            Entry::Occupied(existing) if *existing.get() == trip_id => Ok(false),
            Entry::Occupied(existing) => Err(Error::InconsistentRegistry(format!(
                "plate {plate} is monitored for trip {}, refusing trip {trip_id}",
                existing.get()
            ))),
        }
    }

    /// Removes the entry only when it still points at `trip_id`.
    pub fn remove(&self, plate: &str, trip_id: Uuid) -> Result<bool, Error> {
        if self.trips.remove_if(plate, |_, current| *current == trip_id).is_some() {
            return Ok(true);
        }
        match self.get(plate) {
            None => Ok(false),
            Some(current) => Err(Error::InconsistentRegistry(format!(
                "plate {plate} is monitored for trip {current}, not {trip_id}"
            ))),
        }
    }

    /// Rebuilds the registry from the open trips in the store: one trip per
    /// plate is registered and entries for trips no longer open are dropped.
    /// Returns the number of monitored plates.
    pub fn reconcile(&self, trips: Vec<Trip>) -> usize {
        let mut by_plate: BTreeMap<String, Vec<Trip>> = BTreeMap::new();
        for trip in trips {
            by_plate.entry(trip.vehicle_plate.clone()).or_default().push(trip);
        }

        let mut open = HashSet::new();
        for (plate, candidates) in &by_plate {
            let Some(chosen) = select_trip(candidates) else { continue };
            open.insert(chosen.trip_id);
            if let Err(e) = self.register(plate, chosen.trip_id) {
                warn!(plate = %plate, "reconciliation kept existing entry: {}", e);
            }
        }

        self.trips.retain(|plate, trip_id| {
            let keep = open.contains(&*trip_id);
            if !keep {
                warn!(plate = %plate, trip_id = %trip_id, "dropping trip that is no longer open");
            }
            keep
        });
        self.trips.len()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.trips.len()
    }
}

/// Picks the monitored trip when a plate has several open trips: started
/// trips first by earliest start, then by trip id.
pub fn select_trip(candidates: &[Trip]) -> Option<&Trip> {
    if candidates.len() > 1 {
        let ids: Vec<String> = candidates.iter().map(|t| t.trip_id.to_string()).collect();
        warn!(
            plate = %candidates[0].vehicle_plate,
            "{}",
            Error::InconsistentRegistry(format!("multiple open trips: {}", ids.join(", ")))
        );
    }
    candidates
        .iter()
        .min_by_key(|t| (t.actual_start_time.is_none(), t.actual_start_time, t.trip_id))
}
