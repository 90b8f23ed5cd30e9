mod config;
mod cycle;
mod errors;
mod metrics;
mod model;
mod rest;
mod sources;
mod store;

use std::sync::Arc;

use axum::{routing::get, Router};
use tracing::{error, info};

use crate::config::Config;
use crate::cycle::Aggregator;

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("Starting telemetry aggregator");
    info!("Positioning daemon: {}", config.gpsd_addr);
    info!("Counter bridge: {}", config.geiger_addr);
    info!("HTTP server: {}", config.http_addr);
    info!("Database: {}", config.database_url);

    metrics::init_metrics();

    let pool = match store::make_pool(&config.database_url).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to open reading store: {}", e);
            std::process::exit(1);
        }
    };

    let http_addr = config.http_addr.clone();
    let aggregator = Arc::new(Aggregator::new(pool, config));

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .merge(rest::create_router(aggregator));

    let listener = tokio::net::TcpListener::bind(&http_addr)
        .await
        .unwrap_or_else(|e| {
            error!("Failed to bind to {}: {}", http_addr, e);
            std::process::exit(1);
        });

    info!("HTTP server listening on {}", http_addr);

    tokio::select! {
        result = axum::serve(listener, app) => {
            if let Err(e) = result {
                error!("HTTP server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    info!("Shutting down");
}

async fn metrics_handler() -> String {
    metrics::gather_metrics()
}
