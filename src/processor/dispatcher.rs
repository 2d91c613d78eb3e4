use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

use super::monitor::Monitor;
use crate::models::message::TelemetrySample;
use crate::store::Store;

/// Routes samples to one ordered queue per vehicle. Each queue is drained
/// by its own task, so vehicles are processed concurrently while every
/// vehicle sees its samples in arrival order. Workers exist only for
/// monitored vehicles and stop after `idle` without samples.
pub struct Dispatcher<S> {
    monitor: Monitor<S>,
    queues: Arc<DashMap<String, UnboundedSender<TelemetrySample>>>,
    idle: Duration,
}

impl<S: Store> Dispatcher<S> {
    pub fn new(monitor: Monitor<S>) -> Self {
        let idle = monitor.inner().settings.vehicle_idle;
        Self { monitor, queues: Arc::new(DashMap::new()), idle }
    }

    pub fn dispatch(&self, sample: TelemetrySample) {
        let plate = sample.plate.clone();
        // a running worker keeps its queue so the tail of a closing trip stays ordered
        if !self.queues.contains_key(&plate) && !self.monitor.is_monitored(&plate) {
            debug!(plate = %plate, "no monitored trip, dropping sample");
            return;
        }

        let queue = self
            .queues
            .entry(plate.clone())
            .or_insert_with(|| self.spawn_worker(&plate))
            .clone();

        if let Err(mpsc::error::SendError(sample)) = queue.send(sample) {
            debug!(plate = %plate, "vehicle worker stopped, restarting");
            let queue = self.spawn_worker(&plate);
            self.queues.insert(plate.clone(), queue.clone());
            if queue.send(sample).is_err() {
                warn!(plate = %plate, "vehicle worker unavailable, sample dropped");
            }
        }
    }

    fn spawn_worker(&self, plate: &str) -> UnboundedSender<TelemetrySample> {
        let (tx, rx) = mpsc::unbounded_channel::<TelemetrySample>();
        let monitor = self.monitor.clone();
        let queues = Arc::clone(&self.queues);
        let plate = plate.to_string();
        let idle = self.idle;
        tokio::spawn(async move {
            debug!(plate = %plate, "vehicle worker started");
            drain(&monitor, &plate, rx, idle).await;
            queues.remove_if(&plate, |_, queue| queue.is_closed());
            let released = monitor.release_vehicle(&plate);
            debug!(plate = %plate, released, "vehicle worker stopped");
        });
        tx
    }

    #[cfg(test)]
    fn workers(&self) -> usize {
        self.queues.len()
    }
}

/// Processes samples until the queue has been idle for `idle`. The queue is
/// closed before the final drain so nothing sent to it is lost.
async fn drain<S: Store>(
    monitor: &Monitor<S>,
    plate: &str,
    mut rx: UnboundedReceiver<TelemetrySample>,
    idle: Duration,
) {
    loop {
        match tokio::time::timeout(idle, rx.recv()).await {
            Ok(Some(sample)) => process(monitor, plate, sample).await,
            Ok(None) => return,
            Err(_) => break,
        }
    }
    rx.close();
    while let Ok(sample) = rx.try_recv() {
        process(monitor, plate, sample).await;
    }
}

async fn process<S: Store>(monitor: &Monitor<S>, plate: &str, sample: TelemetrySample) {
    let outcome = monitor.on_telemetry(sample).await;
    if let Some(trip_id) = outcome.trip_id {
        debug!(
            plate = %plate,
            trip_id = %trip_id,
            started = outcome.started,
            long_stop = outcome.long_stop.is_some(),
            completed = outcome.completed.len(),
            closed = outcome.closed,
            "sample processed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitorSettings;
    use crate::models::trip::TripChange;
    use crate::models::Position;
    use crate::testing::MemoryStore;
    use chrono::{Duration, NaiveDate};

    fn sample(plate: &str, secs: i64, speed: f64) -> TelemetrySample {
        let base = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap().and_hms_opt(7, 0, 0).unwrap();
        TelemetrySample {
            plate: plate.into(),
            speed,
            position: Position::new(-26.2, 28.0),
            loc_time: Some(base + Duration::seconds(secs)),
            mileage: None,
            heading: None,
        }
    }

    #[tokio::test]
    async fn samples_are_processed_in_arrival_order_per_vehicle() {
        let store = Arc::new(MemoryStore::new());
        let a = store.add_trip("A", None);
        let b = store.add_trip("B", None);
        let monitor = Monitor::new(Arc::clone(&store), MonitorSettings::default());
        monitor.on_trip_change(TripChange::Created { trip_id: a, plate: "A".into() });
        monitor.on_trip_change(TripChange::Created { trip_id: b, plate: "B".into() });

        let dispatcher = Dispatcher::new(monitor);
        for secs in 0..5 {
            dispatcher.dispatch(sample("A", secs * 10, 20.0));
            dispatcher.dispatch(sample("B", secs * 10, 0.0));
        }
        assert_eq!(dispatcher.workers(), 2);

        let points = store.wait_for_points(10).await;
        assert_eq!(points.len(), 10);
        let times_a: Vec<_> =
            points.iter().filter(|p| p.plate == "A").map(|p| p.loc_time).collect();
        assert_eq!(times_a.len(), 5);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(store.starts().len(), 1);
        assert_eq!(store.starts()[0].0, a);
    }

    #[tokio::test]
    async fn unmonitored_vehicles_get_no_worker() {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = Dispatcher::new(Monitor::new(Arc::clone(&store), MonitorSettings::default()));
        for secs in 0..3 {
            dispatcher.dispatch(sample("STRANGER", secs, 10.0));
        }
        assert_eq!(dispatcher.workers(), 0);
        assert_eq!(dispatcher.monitor.tracked_vehicles(), 0);
    }

    #[tokio::test]
    async fn idle_workers_are_evicted_and_restarted_on_demand() {
        let store = Arc::new(MemoryStore::new());
        let trip = store.add_trip("A", None);
        let settings = MonitorSettings {
            vehicle_idle: std::time::Duration::from_millis(30),
            ..MonitorSettings::default()
        };
        let monitor = Monitor::new(Arc::clone(&store), settings);
        monitor.on_trip_change(TripChange::Created { trip_id: trip, plate: "A".into() });
        let dispatcher = Dispatcher::new(monitor.clone());

        dispatcher.dispatch(sample("A", 0, 10.0));
        store.wait_for_points(1).await;
        monitor.on_trip_change(TripChange::Ended { trip_id: trip, plate: "A".into() });
        tokio::time::sleep(std::time::Duration::from_millis(150)).await;
        assert_eq!(dispatcher.workers(), 0);
        assert_eq!(monitor.tracked_vehicles(), 0);

        // a monitored vehicle keeps its state when its worker stops
        monitor.on_trip_change(TripChange::Created { trip_id: trip, plate: "A".into() });
        dispatcher.dispatch(sample("A", 60, 10.0));
        assert_eq!(store.wait_for_points(2).await.len(), 2);
        tokio::time::sleep(std::time::Duration::from_millis(150)).await;
        assert_eq!(dispatcher.workers(), 0);
        assert_eq!(monitor.tracked_vehicles(), 1);
    }
}
