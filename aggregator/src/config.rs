use std::env;
use std::time::Duration;

/// Runtime settings, every one overridable from the environment. The three
/// duration/budget knobs bound each acquisition stage so a stalled sensor
/// cannot hold a request forever.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub http_addr: String,
    pub gpsd_addr: String,
    pub geiger_addr: String,
    pub climate_temperature_path: String,
    pub climate_humidity_path: String,
    pub position_timeout: Duration,
    pub climate_retry_budget: u32,
    pub climate_retry_delay: Duration,
    pub radiation_read_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://readings.db".to_string()),
            http_addr: env::var("HTTP_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            gpsd_addr: env::var("GPSD_ADDR").unwrap_or_else(|_| "127.0.0.1:2947".to_string()),
            geiger_addr: env::var("GEIGER_ADDR").unwrap_or_else(|_| "127.0.0.1:2401".to_string()),
            climate_temperature_path: env::var("CLIMATE_TEMPERATURE_PATH").unwrap_or_else(|_| {
                "/sys/bus/iio/devices/iio:device0/in_temp_input".to_string()
            }),
            climate_humidity_path: env::var("CLIMATE_HUMIDITY_PATH").unwrap_or_else(|_| {
                "/sys/bus/iio/devices/iio:device0/in_humidityrelative_input".to_string()
            }),
            position_timeout: Duration::from_millis(env_u64("POSITION_TIMEOUT_MS", 30_000)),
            climate_retry_budget: env_u64("CLIMATE_RETRY_BUDGET", 3) as u32,
            climate_retry_delay: Duration::from_millis(env_u64("CLIMATE_RETRY_DELAY_MS", 500)),
            radiation_read_timeout: Duration::from_millis(env_u64("RADIATION_TIMEOUT_MS", 2_000)),
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .unwrap_or(default)
}
