use chrono::{DateTime, Utc};
use serde::Serialize;

/// Wire shape of one positioning report, matching the daemon's JSON
/// stream. Reports without a fix omit the coordinate fields entirely.
#[derive(Debug, Serialize)]
pub struct NavReport {
    pub class: &'static str,
    pub mode: u8,
    pub time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
}

impl NavReport {
    pub fn fix(lat: f64, lon: f64) -> Self {
        Self {
            class: "TPV",
            mode: 3,
            time: Utc::now(),
            lat: Some(lat),
            lon: Some(lon),
        }
    }

    pub fn no_fix() -> Self {
        Self {
            class: "TPV",
            mode: 1,
            time: Utc::now(),
            lat: None,
            lon: None,
        }
    }
}
