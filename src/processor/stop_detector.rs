use chrono::{Duration, NaiveDateTime};

use crate::error::Error;
use crate::models::message::TelemetrySample;
use crate::models::Position;

#[derive(Debug, Clone, PartialEq)]
pub struct LongStopEvent {
    pub plate: String,
    pub location: Position,
    pub stop_start: NaiveDateTime,
    pub detected_at: NaiveDateTime,
}

/// Zero-speed interval currently being timed for one vehicle.
#[derive(Debug, Clone, PartialEq)]
pub struct StopInterval {
    pub stop_start: NaiveDateTime,
    pub location: Position,
    pub last_loc_time: NaiveDateTime,
    /// Set once the long-stop event fired for this interval.
    pub processed: bool,
}

/// Per-vehicle dwell tracker. Samples must arrive in non-decreasing
/// `loc_time` order; the owner filters out anything older.
#[derive(Debug, Clone)]
pub struct StopDetector {
    threshold: Duration,
    interval: Option<StopInterval>,
}

impl StopDetector {
    pub fn new(threshold_minutes: i64) -> Self {
        Self { threshold: Duration::minutes(threshold_minutes), interval: None }
    }

    #[cfg(test)]
    pub fn interval(&self) -> Option<&StopInterval> {
        self.interval.as_ref()
    }

    pub fn observe(&mut self, sample: &TelemetrySample) -> Result<Option<LongStopEvent>, Error> {
        let Some(loc_time) = sample.loc_time else {
            return Err(Error::Validation(format!(
                "unparsable locTime for {}, skipping stop tracking",
                sample.plate
            )));
        };

        if sample.is_moving() {
            self.interval = None;
            return Ok(None);
        }

        let Some(interval) = self.interval.as_mut() else {
            self.interval = Some(StopInterval {
                stop_start: loc_time,
                location: sample.position,
                last_loc_time: loc_time,
                processed: false,
            });
            return Ok(None);
        };

        interval.last_loc_time = loc_time;
        if interval.processed || loc_time - interval.stop_start < self.threshold {
            return Ok(None);
        }

        interval.processed = true;
        Ok(Some(LongStopEvent {
            plate: sample.plate.clone(),
            location: interval.location,
            stop_start: interval.stop_start,
            detected_at: interval.last_loc_time,
        }))
    }
}
