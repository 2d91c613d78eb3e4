use std::sync::Arc;

use chrono::NaiveDateTime;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::stop_detector::StopDetector;
use crate::models::message::TelemetrySample;
use crate::models::trip::Trip;

/// Where a sample falls relative to what the vehicle already reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOrder {
    InOrder,
    /// Older than the last accepted sample.
    Stale,
    /// No usable device timestamp.
    Untimed,
}

#[derive(Debug)]
pub struct VehicleState {
    latest: Option<TelemetrySample>,
    pub detector: StopDetector,
    /// Cached copy of the monitored trip, refreshed when the registry
    /// points at a different trip id.
    pub trip: Option<Trip>,
}

impl VehicleState {
    fn new(long_stop_minutes: i64) -> Self {
        Self { latest: None, detector: StopDetector::new(long_stop_minutes), trip: None }
    }

    pub fn latest(&self) -> Option<&TelemetrySample> {
        self.latest.as_ref()
    }

    fn last_loc_time(&self) -> Option<NaiveDateTime> {
        self.latest().and_then(|s| s.loc_time)
    }

    /// Classifies `sample` and, when it is in order, makes it the latest.
    pub fn accept(&mut self, sample: &TelemetrySample) -> SampleOrder {
        let Some(loc_time) = sample.loc_time else {
            return SampleOrder::Untimed;
        };
        if self.last_loc_time().is_some_and(|last| loc_time < last) {
            return SampleOrder::Stale;
        }
        self.latest = Some(sample.clone());
        SampleOrder::InOrder
    }
}

/// Per-vehicle state, sharded so vehicles never contend with each other.
#[derive(Debug, Clone)]
pub struct VehicleStateStore {
    long_stop_minutes: i64,
    vehicles: Arc<DashMap<String, Arc<Mutex<VehicleState>>>>,
}

impl VehicleStateStore {
    pub fn new(long_stop_minutes: i64) -> Self {
        Self { long_stop_minutes, vehicles: Arc::new(DashMap::new()) }
    }

    /// Exclusive access to one vehicle's state for the duration of a sample.
    pub async fn lock(&self, plate: &str) -> OwnedMutexGuard<VehicleState> {
        let entry = self
            .vehicles
            .entry(plate.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(VehicleState::new(self.long_stop_minutes))))
            .clone();
        entry.lock_owned().await
    }

    /// Removes the vehicle unless someone holds or waits on its lock.
    pub fn evict(&self, plate: &str) -> bool {
        self.vehicles.remove_if(plate, |_, state| Arc::strong_count(state) == 1).is_some()
    }

    #[cfg(test)]
    pub async fn latest_sample(&self, plate: &str) -> Option<TelemetrySample> {
        let entry = self.vehicles.get(plate).map(|e| Arc::clone(e.value()))?;
        let state = entry.lock().await;
        state.latest().cloned()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.vehicles.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Position;
    use chrono::{Duration, NaiveDate};

    fn sample(plate: &str, secs: Option<i64>) -> TelemetrySample {
        let base = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap().and_hms_opt(8, 0, 0).unwrap();
        TelemetrySample {
            plate: plate.into(),
            speed: 0.0,
            position: Position::new(1.0, 1.0),
            loc_time: secs.map(|s| base + Duration::seconds(s)),
            mileage: None,
            heading: None,
        }
    }

    #[tokio::test]
    async fn stale_samples_do_not_regress_latest() {
        let store = VehicleStateStore::new(5);
        {
            let mut state = store.lock("P1").await;
            assert_eq!(state.accept(&sample("P1", Some(60))), SampleOrder::InOrder);
            assert_eq!(state.accept(&sample("P1", Some(60))), SampleOrder::InOrder);
            assert_eq!(state.accept(&sample("P1", Some(30))), SampleOrder::Stale);
            assert_eq!(state.accept(&sample("P1", None)), SampleOrder::Untimed);
        }
        let latest = store.latest_sample("P1").await.unwrap();
        assert_eq!(latest.loc_time, sample("P1", Some(60)).loc_time);
        assert!(store.latest_sample("P2").await.is_none());
    }

    #[tokio::test]
    async fn vehicles_lock_independently() {
        let store = VehicleStateStore::new(5);
        let _a = store.lock("A").await;
        // would deadlock if locks were shared across plates
        let b = tokio::time::timeout(std::time::Duration::from_secs(1), store.lock("B")).await;
        assert!(b.is_ok());
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn evict_skips_vehicles_in_use() {
        let store = VehicleStateStore::new(5);
        let held = store.lock("A").await;
        drop(store.lock("B").await);

        assert!(!store.evict("A"));
        assert!(store.evict("B"));
        drop(held);
        assert!(store.evict("A"));
        assert_eq!(store.len(), 0);
    }
}
