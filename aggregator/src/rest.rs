use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::error;

use crate::cycle::Aggregator;
use crate::model::{Reading, SampleResponse};

#[derive(Clone)]
struct AppState {
    aggregator: Arc<Aggregator>,
}

#[derive(Debug, Deserialize)]
pub struct ReadingsQuery {
    limit: Option<u32>,
}

pub fn create_router(aggregator: Arc<Aggregator>) -> Router {
    let state = AppState { aggregator };

    Router::new()
        .route("/api/v1/sample", get(sample))
        .route("/api/v1/readings", get(get_readings))
        .with_state(state)
}

/// Runs one fresh sampling cycle. This is the call a page load on the
/// presentation side translates to; two requests mean two stored readings.
async fn sample(State(state): State<AppState>) -> Result<Json<SampleResponse>, AppError> {
    let sample = state.aggregator.sample_and_store().await?;
    Ok(Json(sample))
}

async fn get_readings(
    State(state): State<AppState>,
    Query(params): Query<ReadingsQuery>,
) -> Result<Json<Vec<Reading>>, AppError> {
    let limit = params.limit.unwrap_or(10).clamp(1, 1000);
    let readings = state.aggregator.recent(limit).await?;
    Ok(Json(readings))
}

struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("API error: {}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Internal server error: {}", self.0),
        )
            .into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
