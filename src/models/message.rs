use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Deserializer};

use super::Position;
use crate::error::Error;

/// Raw telemetry record as delivered on the telemetry topic.
#[derive(Debug, Deserialize)]
pub struct TelemetryMessage {
    pub plate: Option<String>,
    #[serde(default, deserialize_with = "parse_f64_option")]
    pub speed: Option<f64>,
    #[serde(default, deserialize_with = "parse_f64_option")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "parse_f64_option")]
    pub longitude: Option<f64>,
    #[serde(rename = "locTime")]
    pub loc_time: Option<String>,
    #[serde(default, deserialize_with = "parse_f64_option")]
    pub mileage: Option<f64>,
    #[serde(default, deserialize_with = "parse_f64_option")]
    pub heading: Option<f64>,
}

/// A telemetry record that passed structural validation.
///
/// `loc_time` is `None` when the device timestamp was missing or unparsable;
/// such a sample may still be logged but takes no part in stop or geofence
/// evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySample {
    pub plate: String,
    pub speed: f64,
    pub position: Position,
    pub loc_time: Option<NaiveDateTime>,
    pub mileage: Option<f64>,
    pub heading: Option<f64>,
}

impl TelemetrySample {
    pub fn is_moving(&self) -> bool {
        self.speed != 0.0
    }
}

impl TelemetryMessage {
    pub fn into_sample(self) -> Result<TelemetrySample, Error> {
        let plate = match self.plate.as_deref().map(str::trim) {
            Some(p) if !p.is_empty() => p.to_string(),
            _ => return Err(Error::Validation("missing plate".to_string())),
        };

        let (lat, lon) = match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => (lat, lon),
            _ => {
                return Err(Error::Validation(format!("missing coordinates for {plate}")));
            }
        };
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(Error::Validation(format!(
                "coordinates out of range for {plate}: ({lat}, {lon})"
            )));
        }

        let speed = self.speed.unwrap_or(0.0);
        if !speed.is_finite() {
            return Err(Error::Validation(format!("invalid speed for {plate}: {speed}")));
        }

        Ok(TelemetrySample {
            plate,
            speed,
            position: Position::new(lat, lon),
            loc_time: self.loc_time.as_deref().and_then(parse_loc_time),
            mileage: self.mileage,
            heading: self.heading,
        })
    }
}

/// Parses a device timestamp. Zone-less forms are taken as UTC.
pub fn parse_loc_time(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|t| t.naive_utc())
        })
}

fn parse_f64_option<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrFloat {
        String(String),
        Float(f64),
    }

    let v: Option<StringOrFloat> = Option::deserialize(deserializer)?;
    match v {
        Some(StringOrFloat::Float(f)) => Ok(Some(f)),
        Some(StringOrFloat::String(s)) => {
            if s.trim().is_empty() {
                Ok(None)
            } else {
                s.trim().parse::<f64>().map(Some).map_err(serde::de::Error::custom)
            }
        }
        None => Ok(None),
    }
}
