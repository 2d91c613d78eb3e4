//! Persistence contracts the monitoring core depends on.

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use uuid::Uuid;

use crate::models::trip::{CustomerStop, Trip};
use crate::models::trip_points::TripPoint;

#[async_trait]
pub trait TripStore: Send + Sync + 'static {
    /// All trips for `plate` that have not ended. More than one entry
    /// violates the one-trip-per-vehicle assumption; callers resolve it.
    async fn find_open_trips_for_vehicle(&self, plate: &str) -> Result<Vec<Trip>>;
    /// Every trip that has not ended, used for startup reconciliation.
    async fn list_active_trips(&self) -> Result<Vec<Trip>>;
    async fn find_trip(&self, trip_id: Uuid) -> Result<Option<Trip>>;
    async fn set_actual_start(&self, trip_id: Uuid, at: NaiveDateTime) -> Result<()>;
    /// Sets the end time and runs aggregate completion (duration, audit
    /// records) as one unit. Returns `false` without side effects when the
    /// trip had already ended.
    async fn close_trip(&self, trip_id: Uuid, at: NaiveDateTime) -> Result<bool>;
}

#[async_trait]
pub trait CustomerStopStore: Send + Sync + 'static {
    async fn list_incomplete(&self, trip_id: Uuid) -> Result<Vec<CustomerStop>>;
    /// Returns `true` only when the stop flipped from incomplete to complete.
    async fn mark_completed(
        &self,
        trip_id: Uuid,
        customer_code: &str,
        at: NaiveDateTime,
    ) -> Result<bool>;
    async fn count_completed(&self, trip_id: Uuid) -> Result<i64>;
    async fn count_total(&self, trip_id: Uuid) -> Result<i64>;
}

#[async_trait]
pub trait CoordinateLog: Send + Sync + 'static {
    async fn append(&self, point: TripPoint) -> Result<()>;
}

/// Read path over the coordinate log, only needed by backfill.
#[async_trait]
pub trait CoordinateHistory: Send + Sync + 'static {
    async fn list_trip_coordinates(&self, trip_id: Uuid) -> Result<Vec<TripPoint>>;
}

/// Everything the live monitor writes to or reads from.
pub trait Store: TripStore + CustomerStopStore + CoordinateLog {}

impl<T> Store for T where T: TripStore + CustomerStopStore + CoordinateLog {}
