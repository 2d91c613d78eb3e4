use tracing::{debug, warn};

use super::dispatcher::Dispatcher;
use crate::models::message::TelemetryMessage;
use crate::store::Store;

/// Parses one telemetry payload and hands it to the vehicle's queue.
/// Malformed records are logged and dropped.
pub fn process_message<S: Store>(dispatcher: &Dispatcher<S>, payload: &[u8]) {
    // 1. Parse JSON
    let message: TelemetryMessage = match serde_json::from_slice(payload) {
        Ok(m) => m,
        Err(e) => {
            warn!("Failed to parse telemetry: {}", e);
            return;
        }
    };

    // 2. Validate
    let sample = match message.into_sample() {
        Ok(s) => s,
        Err(e) => {
            warn!("Rejected telemetry: {}", e);
            return;
        }
    };

    debug!(
        plate = %sample.plate,
        speed = sample.speed,
        loc_time = ?sample.loc_time,
        heading = ?sample.heading,
        mileage = ?sample.mileage,
        "telemetry received"
    );

    // 3. Route to the vehicle's ordered pipeline
    dispatcher.dispatch(sample);
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::MonitorSettings;
    use crate::models::trip::TripChange;
    use crate::processor::monitor::Monitor;
    use crate::testing::MemoryStore;

    #[tokio::test]
    async fn malformed_payloads_do_not_stop_the_stream() {
        let store = Arc::new(MemoryStore::new());
        let trip = store.add_trip("GP1", None);
        let monitor = Monitor::new(Arc::clone(&store), MonitorSettings::default());
        monitor.on_trip_change(TripChange::Created { trip_id: trip, plate: "GP1".into() });
        let dispatcher = Dispatcher::new(monitor);

        process_message(&dispatcher, b"not json");
        process_message(&dispatcher, br#"{"plate":"GP1","speed":10}"#);
        process_message(
            &dispatcher,
            br#"{"plate":"GP1","speed":"12.5","latitude":"-26.2","longitude":"28.0","locTime":"2025-03-01 07:00:00"}"#,
        );

        let points = store.wait_for_points(1).await;
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].speed, 12.5);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(store.starts().len(), 1);
    }
}
