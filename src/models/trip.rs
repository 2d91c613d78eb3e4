use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Trip {
    pub trip_id: Uuid,
    pub vehicle_plate: String,
    pub actual_start_time: Option<NaiveDateTime>, // set once
    pub actual_end_time: Option<NaiveDateTime>,   // set once, terminal
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TripState {
    Planned,
    Active,
    Completed,
}

impl Trip {
    pub fn state(&self) -> TripState {
        match (self.actual_start_time, self.actual_end_time) {
            (_, Some(_)) => TripState::Completed,
            (Some(_), None) => TripState::Active,
            (None, None) => TripState::Planned,
        }
    }
}

#[derive(Debug, Clone, PartialEq, FromRow)]
#[allow(dead_code)]
pub struct CustomerStop {
    pub trip_id: Uuid,
    pub customer_code: String,
    pub latitude: f64,
    pub longitude: f64,
    pub completed: bool,
    pub completed_at: Option<NaiveDateTime>,
}

/// Trip-change notification carried on the Postgres NOTIFY channel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TripChange {
    Created { trip_id: Uuid, plate: String },
    Ended { trip_id: Uuid, plate: String },
}

impl TripChange {
    pub fn trip_id(&self) -> Uuid {
        match self {
            Self::Created { trip_id, .. } | Self::Ended { trip_id, .. } => *trip_id,
        }
    }

    pub fn plate(&self) -> &str {
        match self {
            Self::Created { plate, .. } | Self::Ended { plate, .. } => plate,
        }
    }
}
