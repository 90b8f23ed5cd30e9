use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One composite sample, one row per sampling cycle. Every sensor field is
/// optional: an absent value means the source was unavailable that cycle,
/// which is valid, storable state rather than an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Reading {
    pub timestamp: DateTime<Utc>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub radiation_count: Option<i64>,
}

/// A validated coordinate pair from a single fix report. Latitude never
/// travels without longitude; a `Reading` takes the pair or nothing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

/// One atomic probe readout. The sensor reports temperature and humidity
/// in the same transaction, so they are carried together here.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Climate {
    pub temperature: f64,
    pub humidity: f64,
}

impl Reading {
    pub fn compose(
        timestamp: DateTime<Utc>,
        position: Option<Position>,
        climate: Option<Climate>,
        radiation_count: Option<i64>,
    ) -> Self {
        Self {
            timestamp,
            latitude: position.map(|p| p.latitude),
            longitude: position.map(|p| p.longitude),
            temperature: climate.map(|c| c.temperature),
            humidity: climate.map(|c| c.humidity),
            radiation_count,
        }
    }
}

/// What one sampling cycle hands back: the fresh reading plus the most
/// recent slice of history, newest first.
#[derive(Debug, Serialize)]
pub struct SampleResponse {
    pub reading: Reading,
    pub history: Vec<Reading>,
}

pub fn round_places(value: f64, places: u32) -> f64 {
    let scale = 10f64.powi(places as i32);
    (value * scale).round() / scale
}
