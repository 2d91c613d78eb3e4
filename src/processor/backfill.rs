use chrono::NaiveDateTime;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::bounded;
use super::geo::distance_km;
use super::monitor::Monitor;
use crate::error::Error;
use crate::models::trip::TripState;
use crate::models::Position;
use crate::store::{CoordinateHistory, Store};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct BackfillReport {
    pub trip_id: Uuid,
    /// State of the trip before backfill ran.
    pub state: Option<TripState>,
    pub examined: usize,
    pub completed: Vec<(String, NaiveDateTime)>,
    pub closed: bool,
}

impl<S: Store + CoordinateHistory> Monitor<S> {
    /// Reconstructs stop completion for one trip from its coordinate log,
    /// using the relaxed backfill radius. Each stop is stamped with the time
    /// of the logged sample nearest to it. Only active trips are touched:
    /// planned trips never started and ended trips are already final.
    pub async fn backfill(&self, trip_id: Uuid) -> Result<BackfillReport, Error> {
        let inner = self.inner();
        let timeout = inner.settings.store_timeout;
        let radius_km = inner.settings.backfill_radius_km;

        let trip = bounded("find_trip", timeout, inner.store.find_trip(trip_id))
            .await?
            .ok_or_else(|| Error::Validation(format!("unknown trip {trip_id}")))?;
        let mut report = BackfillReport { trip_id, state: Some(trip.state()), ..Default::default() };
        if trip.state() != TripState::Active {
            info!(trip_id = %trip_id, state = ?trip.state(), "trip is not active, nothing to backfill");
            return Ok(report);
        }

        let stops =
            bounded("list_incomplete", timeout, inner.store.list_incomplete(trip_id)).await?;
        let history = bounded(
            "list_trip_coordinates",
            timeout,
            inner.store.list_trip_coordinates(trip_id),
        )
        .await?;

        report.examined = stops.len();
        let Some(closed_at) = history.last().map(|p| p.loc_time) else {
            info!(trip_id = %trip_id, "no coordinate history, nothing to backfill");
            return Ok(report);
        };

        for stop in &stops {
            let target = Position::new(stop.latitude, stop.longitude);
            let nearest = history
                .iter()
                .map(|p| (distance_km(target, Position::new(p.lat, p.lon)), p))
                .min_by(|a, b| a.0.total_cmp(&b.0));
            let Some((distance, point)) = nearest.filter(|(d, _)| *d <= radius_km) else {
                debug!(trip_id = %trip_id, customer = %stop.customer_code, "no sample within radius");
                continue;
            };

            match bounded(
                "mark_completed",
                timeout,
                inner.store.mark_completed(trip_id, &stop.customer_code, point.loc_time),
            )
            .await
            {
                Ok(true) => {
                    info!(
                        trip_id = %trip_id,
                        customer = %stop.customer_code,
                        distance_km = distance,
                        at = %point.loc_time,
                        "customer stop backfilled"
                    );
                    report.completed.push((stop.customer_code.clone(), point.loc_time));
                }
                Ok(false) => {}
                Err(e) => error!(trip_id = %trip_id, customer = %stop.customer_code, "{}", e),
            }
        }

        report.closed = inner.lifecycle.check_and_maybe_close(trip_id, &trip.vehicle_plate, closed_at).await?;
        Ok(report)
    }
}
