use std::time::Instant;

use chrono::{SubsecRound, Utc};
use sqlx::sqlite::SqlitePool;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::Config;
use crate::errors::Result;
use crate::metrics::{CYCLES_TOTAL, CYCLE_LATENCY_SECONDS};
use crate::model::{Reading, SampleResponse};
use crate::sources::climate::{self, ClimateProbe};
use crate::sources::{geiger, position};
use crate::store;

/// How much history one sampling cycle hands back to its caller.
const HISTORY_DEPTH: u32 = 10;

pub struct Aggregator {
    pool: SqlitePool,
    probe: ClimateProbe,
    config: Config,
    cycle_lock: Mutex<()>,
}

impl Aggregator {
    pub fn new(pool: SqlitePool, config: Config) -> Self {
        let probe = ClimateProbe::new(
            &config.climate_temperature_path,
            &config.climate_humidity_path,
        );
        Self {
            pool,
            probe,
            config,
            cycle_lock: Mutex::new(()),
        }
    }

    /// Runs one full acquisition-and-store cycle.
    ///
    /// The three sources run strictly in sequence and each is attempted
    /// exactly once, whatever the earlier ones returned: an all-absent
    /// reading is still a valid cycle and still gets persisted. Cycles
    /// serialize behind one lock, keeping appends single-writer when
    /// several requests land at once.
    pub async fn sample_and_store(&self) -> Result<SampleResponse> {
        let _guard = self.cycle_lock.lock().await;
        let started = Instant::now();

        let position = position::acquire(&self.config.gpsd_addr, self.config.position_timeout)
            .await
            .into_value("position");
        let climate = climate::acquire(
            &self.probe,
            self.config.climate_retry_budget,
            self.config.climate_retry_delay,
        )
        .await
        .into_value("climate");
        let radiation_count = geiger::acquire(
            &self.config.geiger_addr,
            self.config.radiation_read_timeout,
        )
        .await
        .into_value("radiation");

        // The timestamp is assigned here at write time, to the second.
        let reading = Reading::compose(
            Utc::now().trunc_subsecs(0),
            position,
            climate,
            radiation_count,
        );

        store::append(&self.pool, &reading).await?;
        let history = store::recent(&self.pool, HISTORY_DEPTH).await?;

        CYCLES_TOTAL.inc();
        CYCLE_LATENCY_SECONDS.observe(started.elapsed().as_secs_f64());
        debug!(
            "cycle done in {:.3}s, {} rows of history",
            started.elapsed().as_secs_f64(),
            history.len()
        );

        Ok(SampleResponse { reading, history })
    }

    pub async fn recent(&self, n: u32) -> Result<Vec<Reading>> {
        store::recent(&self.pool, n).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves one scripted line set per accepted connection, then signals
    /// end-of-stream. `await_command` is for protocols where the client
    /// speaks first (the watch command).
    async fn spawn_script_server(scripts: Vec<Vec<&'static str>>, await_command: bool) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            for script in scripts {
                let (mut stream, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => return,
                };
                let mut buf = [0u8; 256];
                if await_command {
                    let _ = stream.read(&mut buf).await;
                }
                for line in script {
                    if stream.write_all(line.as_bytes()).await.is_err()
                        || stream.write_all(b"\n").await.is_err()
                    {
                        break;
                    }
                }
                let _ = stream.shutdown().await;
                while matches!(stream.read(&mut buf).await, Ok(n) if n > 0) {}
            }
        });

        addr
    }

    fn probe_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("cycle-test-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn test_config(gpsd_addr: String, geiger_addr: String, dir: &PathBuf) -> Config {
        Config {
            database_url: "sqlite::memory:".to_string(),
            http_addr: "127.0.0.1:0".to_string(),
            gpsd_addr,
            geiger_addr,
            climate_temperature_path: dir.join("temp").to_string_lossy().into_owned(),
            climate_humidity_path: dir.join("humidity").to_string_lossy().into_owned(),
            position_timeout: Duration::from_secs(5),
            climate_retry_budget: 2,
            climate_retry_delay: Duration::from_millis(1),
            radiation_read_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_fix_gap_in_the_middle_of_three_cycles() {
        tokio_test::block_on(async {
            let fix = "{\"class\":\"TPV\",\"mode\":3,\"lat\":52.0905237,\"lon\":5.1214201}";
            let no_fix = "{\"class\":\"TPV\",\"mode\":1}";
            let version = "{\"class\":\"VERSION\",\"release\":\"3.22\"}";

            let gpsd_addr = spawn_script_server(
                vec![
                    vec![version, fix],
                    vec![version, no_fix],
                    vec![version, fix],
                ],
                true,
            )
            .await;
            let geiger_addr = spawn_script_server(
                vec![vec!["$GEO,42"], vec!["$GEO,37"], vec!["$GEO,51"]],
                false,
            )
            .await;

            let dir = probe_dir("fix-gap");
            fs::write(dir.join("temp"), "21457\n").unwrap();
            fs::write(dir.join("humidity"), "48213\n").unwrap();

            let config = test_config(gpsd_addr, geiger_addr, &dir);
            let pool = store::make_pool(&config.database_url).await.unwrap();
            let aggregator = Aggregator::new(pool, config);

            for _ in 0..3 {
                aggregator.sample_and_store().await.unwrap();
            }

            let history = aggregator.recent(3).await.unwrap();
            assert_eq!(history.len(), 3);
            for pair in history.windows(2) {
                assert!(pair[0].timestamp >= pair[1].timestamp);
            }

            // Newest first: the middle cycle is the one that lost the fix.
            assert!(history[0].latitude.is_some() && history[0].longitude.is_some());
            assert!(history[1].latitude.is_none() && history[1].longitude.is_none());
            assert!(history[2].latitude.is_some() && history[2].longitude.is_some());

            // The gap only affected the position; the rest of that row is live.
            assert_eq!(history[1].radiation_count, Some(37));
            assert_eq!(history[1].temperature, Some(21.46));
        });
    }

    #[test]
    fn test_all_sources_down_still_persists_a_reading() {
        tokio_test::block_on(async {
            let dir = probe_dir("all-down");
            // Nothing listens on port 9 on the test host, and the probe
            // files are never written.
            let config = test_config(
                "127.0.0.1:9".to_string(),
                "127.0.0.1:9".to_string(),
                &dir,
            );
            let pool = store::make_pool(&config.database_url).await.unwrap();
            let aggregator = Aggregator::new(pool, config);

            let sample = aggregator.sample_and_store().await.unwrap();

            assert_eq!(sample.reading.latitude, None);
            assert_eq!(sample.reading.longitude, None);
            assert_eq!(sample.reading.temperature, None);
            assert_eq!(sample.reading.humidity, None);
            assert_eq!(sample.reading.radiation_count, None);
            assert_eq!(sample.history, vec![sample.reading.clone()]);
        });
    }

    #[test]
    fn test_sample_returns_fresh_reading_plus_bounded_history() {
        tokio_test::block_on(async {
            let fix = "{\"class\":\"TPV\",\"mode\":3,\"lat\":52.0905237,\"lon\":5.1214201}";
            let scripts = (0..12).map(|_| vec![fix]).collect::<Vec<_>>();
            let gpsd_addr = spawn_script_server(scripts, true).await;
            let geiger_addr =
                spawn_script_server((0..12).map(|_| vec!["$GEO,5"]).collect(), false).await;

            let dir = probe_dir("bounded");
            fs::write(dir.join("temp"), "20000\n").unwrap();
            fs::write(dir.join("humidity"), "50000\n").unwrap();

            let config = test_config(gpsd_addr, geiger_addr, &dir);
            let pool = store::make_pool(&config.database_url).await.unwrap();
            let aggregator = Aggregator::new(pool, config);

            let mut last = None;
            for _ in 0..12 {
                last = Some(aggregator.sample_and_store().await.unwrap());
            }

            let sample = last.unwrap();
            assert_eq!(sample.history.len(), 10);
            assert_eq!(sample.history[0], sample.reading);
        });
    }
}
