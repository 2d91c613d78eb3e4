use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use uuid::Uuid;

use super::{queries, DbPool};
use crate::models::trip::{CustomerStop, Trip};
use crate::models::trip_points::TripPoint;
use crate::store::{CoordinateHistory, CoordinateLog, CustomerStopStore, TripStore};

/// Postgres-backed implementation of every store contract.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TripStore for PgStore {
    async fn find_open_trips_for_vehicle(&self, plate: &str) -> Result<Vec<Trip>> {
        sqlx::query_as::<_, Trip>(queries::SELECT_OPEN_TRIPS_FOR_VEHICLE)
            .bind(plate)
            .fetch_all(&self.pool)
            .await
            .context("selecting open trips for vehicle")
    }

    async fn list_active_trips(&self) -> Result<Vec<Trip>> {
        sqlx::query_as::<_, Trip>(queries::SELECT_ACTIVE_TRIPS)
            .fetch_all(&self.pool)
            .await
            .context("selecting active trips")
    }

    async fn find_trip(&self, trip_id: Uuid) -> Result<Option<Trip>> {
        sqlx::query_as::<_, Trip>(queries::SELECT_TRIP)
            .bind(trip_id)
            .fetch_optional(&self.pool)
            .await
            .context("selecting trip")
    }

    async fn set_actual_start(&self, trip_id: Uuid, at: NaiveDateTime) -> Result<()> {
        sqlx::query(queries::UPDATE_TRIP_START)
            .bind(trip_id)
            .bind(at)
            .execute(&self.pool)
            .await
            .context("updating trip start")?;
        Ok(())
    }

    async fn close_trip(&self, trip_id: Uuid, at: NaiveDateTime) -> Result<bool> {
        let mut tx = self.pool.begin().await.context("opening close transaction")?;
        let ended = sqlx::query(queries::UPDATE_TRIP_END)
            .bind(trip_id)
            .bind(at)
            .execute(&mut *tx)
            .await
            .context("updating trip end")?;
        if ended.rows_affected() == 0 {
            tx.rollback().await.context("rolling back close transaction")?;
            return Ok(false);
        }

        sqlx::query(queries::FINALIZE_TRIP)
            .bind(trip_id)
            .execute(&mut *tx)
            .await
            .context("finalizing trip")?;
        tx.commit().await.context("committing close transaction")?;
        Ok(true)
    }
}

#[async_trait]
impl CustomerStopStore for PgStore {
    async fn list_incomplete(&self, trip_id: Uuid) -> Result<Vec<CustomerStop>> {
        sqlx::query_as::<_, CustomerStop>(queries::SELECT_INCOMPLETE_STOPS)
            .bind(trip_id)
            .fetch_all(&self.pool)
            .await
            .context("selecting incomplete customer stops")
    }

    async fn mark_completed(
        &self,
        trip_id: Uuid,
        customer_code: &str,
        at: NaiveDateTime,
    ) -> Result<bool> {
        let result = sqlx::query(queries::UPDATE_STOP_COMPLETED)
            .bind(trip_id)
            .bind(customer_code)
            .bind(at)
            .execute(&self.pool)
            .await
            .context("marking customer stop completed")?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_completed(&self, trip_id: Uuid) -> Result<i64> {
        sqlx::query_scalar::<_, i64>(queries::COUNT_COMPLETED_STOPS)
            .bind(trip_id)
            .fetch_one(&self.pool)
            .await
            .context("counting completed stops")
    }

    async fn count_total(&self, trip_id: Uuid) -> Result<i64> {
        sqlx::query_scalar::<_, i64>(queries::COUNT_TOTAL_STOPS)
            .bind(trip_id)
            .fetch_one(&self.pool)
            .await
            .context("counting stops")
    }
}

#[async_trait]
impl CoordinateLog for PgStore {
    async fn append(&self, point: TripPoint) -> Result<()> {
        sqlx::query(queries::INSERT_TRIP_POINT)
            .bind(point.trip_id)
            .bind(&point.plate)
            .bind(point.lat)
            .bind(point.lon)
            .bind(point.speed)
            .bind(point.loc_time)
            .execute(&self.pool)
            .await
            .context("inserting trip point")?;
        Ok(())
    }
}

#[async_trait]
impl CoordinateHistory for PgStore {
    async fn list_trip_coordinates(&self, trip_id: Uuid) -> Result<Vec<TripPoint>> {
        sqlx::query_as::<_, TripPoint>(queries::SELECT_TRIP_POINTS)
            .bind(trip_id)
            .fetch_all(&self.pool)
            .await
            .context("selecting trip points")
    }
}
