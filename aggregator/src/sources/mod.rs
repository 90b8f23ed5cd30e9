pub mod climate;
pub mod geiger;
pub mod position;

use tracing::warn;

use crate::metrics::{SENSOR_UNAVAILABLE_TOTAL, TRANSPORT_FAILURES_TOTAL};

/// Outcome of one sensor acquisition. `Unavailable` means the source read
/// cleanly but had nothing to report this cycle; `Transport` means the
/// device or its connection is broken. Both end up as an absent field in
/// the stored reading, but they are counted and logged separately.
#[derive(Debug)]
pub enum Acquisition<T> {
    Value(T),
    Unavailable,
    Transport(std::io::Error),
}

impl<T> Acquisition<T> {
    /// Collapses to the stored representation at the reading boundary.
    pub fn into_value(self, sensor: &'static str) -> Option<T> {
        match self {
            Acquisition::Value(value) => Some(value),
            Acquisition::Unavailable => {
                SENSOR_UNAVAILABLE_TOTAL.with_label_values(&[sensor]).inc();
                None
            }
            Acquisition::Transport(e) => {
                warn!("{} transport failure: {}", sensor, e);
                TRANSPORT_FAILURES_TOTAL.with_label_values(&[sensor]).inc();
                None
            }
        }
    }
}
