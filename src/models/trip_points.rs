use chrono::NaiveDateTime;
use sqlx::FromRow;
use uuid::Uuid;

/// One row of the append-only coordinate log.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct TripPoint {
    pub trip_id: Uuid,
    pub plate: String,
    pub lat: f64,
    pub lon: f64,
    pub speed: f64,
    pub loc_time: NaiveDateTime,
}
