use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::time::sleep;
use tracing::debug;

use super::Acquisition;
use crate::model::{round_places, Climate};

/// Temperature/humidity probe exposed through two Industrial-I/O sysfs
/// attributes. The kernel driver reports milli-degrees and milli-percent.
pub struct ClimateProbe {
    temperature_path: PathBuf,
    humidity_path: PathBuf,
}

impl ClimateProbe {
    pub fn new(temperature_path: impl Into<PathBuf>, humidity_path: impl Into<PathBuf>) -> Self {
        Self {
            temperature_path: temperature_path.into(),
            humidity_path: humidity_path.into(),
        }
    }

    /// One atomic readout. Either both values come back or neither does;
    /// the sensor has no way to answer for just one of them.
    async fn read_once(&self) -> io::Result<Climate> {
        let raw_temperature = read_milli(&self.temperature_path).await?;
        let raw_humidity = read_milli(&self.humidity_path).await?;

        Ok(Climate {
            temperature: round_places(raw_temperature / 1000.0, 2),
            humidity: round_places(raw_humidity / 1000.0, 2),
        })
    }
}

async fn read_milli(path: &Path) -> io::Result<f64> {
    let text = tokio::fs::read_to_string(path).await?;
    text.trim()
        .parse::<f64>()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Reads the probe under a bounded retry budget. The sensor refuses reads
/// fired too close together, so attempts are spaced by `retry_delay`. A
/// missing device node is reported as a transport failure straight away;
/// an exhausted budget is a normal "nothing this cycle".
pub async fn acquire(
    probe: &ClimateProbe,
    retry_budget: u32,
    retry_delay: Duration,
) -> Acquisition<Climate> {
    let attempts = retry_budget.max(1);

    for attempt in 1..=attempts {
        match probe.read_once().await {
            Ok(climate) => return Acquisition::Value(climate),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Acquisition::Transport(e);
            }
            Err(e) => {
                debug!("climate read failed (attempt {}/{}): {}", attempt, attempts, e);
                if attempt < attempts {
                    sleep(retry_delay).await;
                }
            }
        }
    }

    Acquisition::Unavailable
}
