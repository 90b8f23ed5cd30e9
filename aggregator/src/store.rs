use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::{error, info, warn};

use crate::errors::Result;
use crate::metrics::STORE_FAILURES_TOTAL;
use crate::model::Reading;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS readings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ts TEXT NOT NULL,
    lat REAL,
    lon REAL,
    temperature REAL,
    humidity REAL,
    radiation_count INTEGER
)";

pub async fn make_pool(database_url: &str) -> Result<SqlitePool> {
    info!("Opening reading store...");
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

    // One connection keeps the store single-writer; cycles queue on it.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(options)
        .await?;

    ensure_schema(&pool).await?;
    info!("Reading store ready");

    Ok(pool)
}

async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(SCHEMA).execute(pool).await?;
    Ok(())
}

/// Durably persists one reading. The write is committed before this
/// returns; there is no buffering across calls. Lock contention retries a
/// few times; anything else surfaces to the caller, so a dropped sample is
/// always a visible failure.
pub async fn append(pool: &SqlitePool, reading: &Reading) -> Result<()> {
    ensure_schema(pool).await?;

    let mut attempts = 0;
    let max_attempts = 5;

    loop {
        attempts += 1;
        match insert_reading(pool, reading).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                if attempts >= max_attempts || !is_transient_error(&e) {
                    error!(
                        "Reading append failed permanently after {} attempts: {}",
                        attempts, e
                    );
                    STORE_FAILURES_TOTAL.inc();
                    return Err(e.into());
                }

                let wait_ms = 50 * 2_u64.pow(attempts - 1);
                warn!(
                    "Reading append failed (attempt {}/{}), retrying in {}ms: {}",
                    attempts, max_attempts, wait_ms, e
                );
                tokio::time::sleep(Duration::from_millis(wait_ms)).await;
            }
        }
    }
}

async fn insert_reading(pool: &SqlitePool, reading: &Reading) -> sqlx::Result<()> {
    sqlx::query(
        "INSERT INTO readings (ts, lat, lon, temperature, humidity, radiation_count)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )
    .bind(reading.timestamp)
    .bind(reading.latitude)
    .bind(reading.longitude)
    .bind(reading.temperature)
    .bind(reading.humidity)
    .bind(reading.radiation_count)
    .execute(pool)
    .await?;

    Ok(())
}

/// Up to `n` most recent readings, newest first. Equal-second timestamps
/// fall back to insertion order via the rowid, so repeated calls against
/// unchanged data always return the same sequence.
pub async fn recent(pool: &SqlitePool, n: u32) -> Result<Vec<Reading>> {
    let readings = sqlx::query_as::<_, Reading>(
        "SELECT ts AS timestamp, lat AS latitude, lon AS longitude,
                temperature, humidity, radiation_count
         FROM readings
         ORDER BY ts DESC, id DESC
         LIMIT ?1",
    )
    .bind(n as i64)
    .fetch_all(pool)
    .await?;

    Ok(readings)
}

fn is_transient_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::PoolClosed => true,
        sqlx::Error::Database(db_err) => {
            // SQLITE_BUSY / SQLITE_LOCKED: another handle holds the file lock
            db_err.code().is_some_and(|code| code == "5" || code == "6")
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Climate, Position, Reading};
    use chrono::{TimeZone, Utc};

    async fn memory_pool() -> SqlitePool {
        make_pool("sqlite::memory:").await.unwrap()
    }

    fn reading_at(second: u32, position: Option<Position>) -> Reading {
        Reading::compose(
            Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, second).unwrap(),
            position,
            Some(Climate {
                temperature: 21.46,
                humidity: 48.21,
            }),
            Some(23),
        )
    }

    #[test]
    fn test_append_then_recent_round_trips_exactly() {
        tokio_test::block_on(async {
            let pool = memory_pool().await;
            let reading = reading_at(
                0,
                Some(Position {
                    latitude: 52.090524,
                    longitude: 5.12142,
                }),
            );

            append(&pool, &reading).await.unwrap();
            let stored = recent(&pool, 1).await.unwrap();

            assert_eq!(stored, vec![reading]);
        });
    }

    #[test]
    fn test_absent_fields_stay_absent_not_zero() {
        tokio_test::block_on(async {
            let pool = memory_pool().await;
            let reading = Reading::compose(
                Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
                None,
                None,
                None,
            );

            append(&pool, &reading).await.unwrap();
            let stored = recent(&pool, 1).await.unwrap();

            assert_eq!(stored.len(), 1);
            assert_eq!(stored[0].latitude, None);
            assert_eq!(stored[0].longitude, None);
            assert_eq!(stored[0].temperature, None);
            assert_eq!(stored[0].humidity, None);
            assert_eq!(stored[0].radiation_count, None);
        });
    }

    #[test]
    fn test_recent_is_bounded_and_descending() {
        tokio_test::block_on(async {
            let pool = memory_pool().await;
            for second in 0..5 {
                append(&pool, &reading_at(second, None)).await.unwrap();
            }

            let stored = recent(&pool, 3).await.unwrap();

            assert_eq!(stored.len(), 3);
            for pair in stored.windows(2) {
                assert!(pair[0].timestamp >= pair[1].timestamp);
            }
            assert_eq!(
                stored[0].timestamp,
                Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 4).unwrap()
            );
        });
    }

    #[test]
    fn test_equal_timestamps_order_deterministically() {
        tokio_test::block_on(async {
            let pool = memory_pool().await;

            // Three appends inside the same second, told apart by count.
            for count in [1, 2, 3] {
                let mut reading = reading_at(30, None);
                reading.radiation_count = Some(count);
                append(&pool, &reading).await.unwrap();
            }

            let first = recent(&pool, 3).await.unwrap();
            let second = recent(&pool, 3).await.unwrap();

            assert_eq!(first, second);
            // Insertion order, reversed: the latest append comes first.
            let counts: Vec<_> = first.iter().map(|r| r.radiation_count).collect();
            assert_eq!(counts, vec![Some(3), Some(2), Some(1)]);
        });
    }
}
