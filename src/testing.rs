//! In-memory store used by the unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use uuid::Uuid;

use crate::models::trip::{CustomerStop, Trip};
use crate::models::trip_points::TripPoint;
use crate::models::Position;
use crate::store::{CoordinateHistory, CoordinateLog, CustomerStopStore, TripStore};

#[derive(Default)]
struct State {
    trips: HashMap<Uuid, Trip>,
    stops: Vec<CustomerStop>,
    points: Vec<TripPoint>,
    starts: Vec<(Uuid, NaiveDateTime)>,
    ends: Vec<(Uuid, NaiveDateTime)>,
    finalized: Vec<Uuid>,
    marks: Vec<(Uuid, String)>,
    fail: HashMap<&'static str, usize>,
    delay: Option<Duration>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_trip(&self, plate: &str, started: Option<NaiveDateTime>) -> Uuid {
        let trip_id = Uuid::new_v4();
        self.state.lock().unwrap().trips.insert(
            trip_id,
            Trip {
                trip_id,
                vehicle_plate: plate.to_string(),
                actual_start_time: started,
                actual_end_time: None,
            },
        );
        trip_id
    }

    pub fn add_stop(&self, trip_id: Uuid, code: &str, at: Position) {
        self.state.lock().unwrap().stops.push(CustomerStop {
            trip_id,
            customer_code: code.to_string(),
            latitude: at.lat,
            longitude: at.lon,
            completed: false,
            completed_at: None,
        });
    }

    pub fn add_point(&self, point: TripPoint) {
        self.state.lock().unwrap().points.push(point);
    }

    /// Makes the next `times` calls of `operation` fail.
    pub fn fail_next(&self, operation: &'static str, times: usize) {
        self.state.lock().unwrap().fail.insert(operation, times);
    }

    /// Delays every call, used to exercise store timeouts.
    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().unwrap().delay = Some(delay);
    }

    pub fn trip(&self, trip_id: Uuid) -> Trip {
        self.state.lock().unwrap().trips[&trip_id].clone()
    }

    pub fn stop(&self, trip_id: Uuid, code: &str) -> CustomerStop {
        let state = self.state.lock().unwrap();
        state
            .stops
            .iter()
            .find(|s| s.trip_id == trip_id && s.customer_code == code)
            .cloned()
            .unwrap()
    }

    pub fn starts(&self) -> Vec<(Uuid, NaiveDateTime)> {
        self.state.lock().unwrap().starts.clone()
    }

    pub fn ends(&self) -> Vec<(Uuid, NaiveDateTime)> {
        self.state.lock().unwrap().ends.clone()
    }

    pub fn finalized(&self) -> Vec<Uuid> {
        self.state.lock().unwrap().finalized.clone()
    }

    pub fn marks(&self) -> Vec<(Uuid, String)> {
        self.state.lock().unwrap().marks.clone()
    }

    pub fn points(&self) -> Vec<TripPoint> {
        self.state.lock().unwrap().points.clone()
    }

    /// Waits for fire-and-forget appends to land.
    pub async fn wait_for_points(&self, count: usize) -> Vec<TripPoint> {
        for _ in 0..200 {
            let points = self.points();
            if points.len() >= count {
                return points;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.points()
    }

    async fn enter(&self, operation: &'static str) -> Result<()> {
        let delay = self.state.lock().unwrap().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock().unwrap();
        if let Some(left) = state.fail.get_mut(operation) {
            if *left > 0 {
                *left -= 1;
                return Err(anyhow!("{operation} failed"));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TripStore for MemoryStore {
    async fn find_open_trips_for_vehicle(&self, plate: &str) -> Result<Vec<Trip>> {
        self.enter("find_open_trips_for_vehicle").await?;
        let state = self.state.lock().unwrap();
        Ok(state
            .trips
            .values()
            .filter(|t| t.vehicle_plate == plate && t.actual_end_time.is_none())
            .cloned()
            .collect())
    }

    async fn list_active_trips(&self) -> Result<Vec<Trip>> {
        self.enter("list_active_trips").await?;
        let state = self.state.lock().unwrap();
        Ok(state.trips.values().filter(|t| t.actual_end_time.is_none()).cloned().collect())
    }

    async fn find_trip(&self, trip_id: Uuid) -> Result<Option<Trip>> {
        self.enter("find_trip").await?;
        Ok(self.state.lock().unwrap().trips.get(&trip_id).cloned())
    }

    async fn set_actual_start(&self, trip_id: Uuid, at: NaiveDateTime) -> Result<()> {
        self.enter("set_actual_start").await?;
        let mut state = self.state.lock().unwrap();
        state.starts.push((trip_id, at));
        if let Some(trip) = state.trips.get_mut(&trip_id) {
            trip.actual_start_time.get_or_insert(at);
        }
        Ok(())
    }

    async fn close_trip(&self, trip_id: Uuid, at: NaiveDateTime) -> Result<bool> {
        self.enter("close_trip").await?;
        let mut state = self.state.lock().unwrap();
        match state.trips.get_mut(&trip_id) {
            Some(trip) if trip.actual_end_time.is_none() => trip.actual_end_time = Some(at),
            _ => return Ok(false),
        }
        state.ends.push((trip_id, at));
        state.finalized.push(trip_id);
        Ok(true)
    }
}

#[async_trait]
impl CustomerStopStore for MemoryStore {
    async fn list_incomplete(&self, trip_id: Uuid) -> Result<Vec<CustomerStop>> {
        self.enter("list_incomplete").await?;
        let state = self.state.lock().unwrap();
        Ok(state.stops.iter().filter(|s| s.trip_id == trip_id && !s.completed).cloned().collect())
    }

    async fn mark_completed(
        &self,
        trip_id: Uuid,
        customer_code: &str,
        at: NaiveDateTime,
    ) -> Result<bool> {
        self.enter("mark_completed").await?;
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        let Some(stop) = state
            .stops
            .iter_mut()
            .find(|s| s.trip_id == trip_id && s.customer_code == customer_code && !s.completed)
        else {
            return Ok(false);
        };
        stop.completed = true;
        stop.completed_at = Some(at);
        state.marks.push((trip_id, customer_code.to_string()));
        Ok(true)
    }

    async fn count_completed(&self, trip_id: Uuid) -> Result<i64> {
        self.enter("count_completed").await?;
        let state = self.state.lock().unwrap();
        Ok(state.stops.iter().filter(|s| s.trip_id == trip_id && s.completed).count() as i64)
    }

    async fn count_total(&self, trip_id: Uuid) -> Result<i64> {
        self.enter("count_total").await?;
        let state = self.state.lock().unwrap();
        Ok(state.stops.iter().filter(|s| s.trip_id == trip_id).count() as i64)
    }
}

#[async_trait]
impl CoordinateLog for MemoryStore {
    async fn append(&self, point: TripPoint) -> Result<()> {
        self.enter("append").await?;
        self.state.lock().unwrap().points.push(point);
        Ok(())
    }
}

#[async_trait]
impl CoordinateHistory for MemoryStore {
    async fn list_trip_coordinates(&self, trip_id: Uuid) -> Result<Vec<TripPoint>> {
        self.enter("list_trip_coordinates").await?;
        let state = self.state.lock().unwrap();
        let mut points: Vec<TripPoint> =
            state.points.iter().filter(|p| p.trip_id == trip_id).cloned().collect();
        points.sort_by_key(|p| p.loc_time);
        Ok(points)
    }
}
