mod report;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use rand::Rng;
use report::NavReport;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};

/// Serves synthetic sensor devices for the telemetry aggregator: a
/// positioning report stream, a counter line stream, and optionally a set
/// of climate probe files.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Listen address for the positioning report stream
    #[arg(long, env = "SIM_NAV_ADDR", default_value = "127.0.0.1:2947")]
    nav_addr: String,

    /// Listen address for the counter line stream
    #[arg(long, env = "SIM_COUNTER_ADDR", default_value = "127.0.0.1:2401")]
    counter_addr: String,

    /// Directory to write synthetic climate probe files into
    #[arg(long, env = "SIM_CLIMATE_DIR")]
    climate_dir: Option<PathBuf>,

    /// Seconds between emitted reports
    #[arg(long, env = "SIM_INTERVAL_SECS", default_value_t = 1)]
    interval_secs: u64,

    /// Probability that a navigation report carries no fix
    #[arg(long, env = "SIM_FIX_LOSS", default_value_t = 0.2)]
    fix_loss: f64,

    /// Probability that a counter line is malformed
    #[arg(long, env = "SIM_MALFORMED", default_value_t = 0.05)]
    malformed: f64,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("Starting device simulator");
    info!(
        "Navigation: {}, counter: {}, interval: {}s",
        args.nav_addr, args.counter_addr, args.interval_secs
    );

    let interval = Duration::from_secs(args.interval_secs.max(1));

    let nav_listener = bind(&args.nav_addr).await;
    let counter_listener = bind(&args.counter_addr).await;

    let fix_loss = args.fix_loss;
    let nav_handle = tokio::spawn(async move {
        loop {
            match nav_listener.accept().await {
                Ok((stream, peer)) => {
                    info!("Navigation client connected: {}", peer);
                    tokio::spawn(handle_navigation(stream, interval, fix_loss));
                }
                Err(e) => {
                    error!("Navigation accept failed: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    });

    let malformed = args.malformed;
    let counter_handle = tokio::spawn(async move {
        loop {
            match counter_listener.accept().await {
                Ok((stream, peer)) => {
                    info!("Counter client connected: {}", peer);
                    tokio::spawn(handle_counter(stream, interval, malformed));
                }
                Err(e) => {
                    error!("Counter accept failed: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    });

    if let Some(dir) = args.climate_dir.clone() {
        info!("Writing climate probe files under {}", dir.display());
        tokio::spawn(write_climate(dir, interval));
    }

    tokio::select! {
        _ = nav_handle => {
            error!("Navigation task terminated");
        }
        _ = counter_handle => {
            error!("Counter task terminated");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    info!("Shutting down");
}

async fn bind(addr: &str) -> TcpListener {
    TcpListener::bind(addr).await.unwrap_or_else(|e| {
        error!("Failed to bind to {}: {}", addr, e);
        std::process::exit(1);
    })
}

/// Speaks just enough of the positioning daemon's dialect: a VERSION
/// banner, one discarded watch command, then periodic TPV reports.
async fn handle_navigation(mut stream: TcpStream, interval: Duration, fix_loss: f64) {
    let banner =
        "{\"class\":\"VERSION\",\"release\":\"simulator\",\"proto_major\":3,\"proto_minor\":14}\n";
    if stream.write_all(banner.as_bytes()).await.is_err() {
        return;
    }

    let mut buf = [0u8; 256];
    let _ = stream.read(&mut buf).await;

    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;

        let report = generate_nav_report(fix_loss);
        let payload = match serde_json::to_string(&report) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to serialize report: {}", e);
                continue;
            }
        };

        if stream.write_all(payload.as_bytes()).await.is_err()
            || stream.write_all(b"\n").await.is_err()
        {
            info!("Navigation client disconnected");
            return;
        }
    }
}

fn generate_nav_report(fix_loss: f64) -> NavReport {
    let mut rng = rand::thread_rng();
    if rng.gen_bool(fix_loss) {
        NavReport::no_fix()
    } else {
        // Wander around a fixed base coordinate.
        NavReport::fix(
            52.0905 + rng.gen_range(-0.001..0.001),
            5.1214 + rng.gen_range(-0.001..0.001),
        )
    }
}

async fn handle_counter(mut stream: TcpStream, interval: Duration, malformed: f64) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;

        let line = generate_counter_line(malformed);
        if stream.write_all(line.as_bytes()).await.is_err() {
            info!("Counter client disconnected");
            return;
        }
    }
}

fn generate_counter_line(malformed: f64) -> String {
    let mut rng = rand::thread_rng();
    if rng.gen_bool(malformed) {
        "$GEO,ERR\r\n".to_string()
    } else {
        format!("$GEO,{}\r\n", rng.gen_range(5..60))
    }
}

/// Refreshes the two probe attribute files with plausible milli-unit
/// values, the same shape the kernel driver exposes.
async fn write_climate(dir: PathBuf, interval: Duration) {
    if let Err(e) = tokio::fs::create_dir_all(&dir).await {
        error!("Failed to create climate dir: {}", e);
        return;
    }

    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;

        let (milli_temp, milli_humidity) = {
            let mut rng = rand::thread_rng();
            (
                (rng.gen_range(18.0..28.0) * 1000.0) as i64,
                (rng.gen_range(35.0..65.0) * 1000.0) as i64,
            )
        };

        if let Err(e) =
            tokio::fs::write(dir.join("in_temp_input"), format!("{}\n", milli_temp)).await
        {
            warn!("Failed to write temperature file: {}", e);
        }
        if let Err(e) = tokio::fs::write(
            dir.join("in_humidityrelative_input"),
            format!("{}\n", milli_humidity),
        )
        .await
        {
            warn!("Failed to write humidity file: {}", e);
        }
    }
}
