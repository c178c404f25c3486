//! Axum route handlers for the HTTP API.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use natcg_core::NatcgError;

use crate::models::{ErrorResponse, HealthResponse, HypersphereResponse, ScoreRequest, ScoreResponse};
use crate::state::AppState;

/// Largest batch accepted by `POST /api/score`.
pub const MAX_SCORE_ROWS: usize = 4096;

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse { error: error.into() }))
}

/// `GET /health`: health check endpoint.
///
/// # Example Response
///
/// ```json
/// {"status": "ok", "version": "0.1.0"}
/// ```
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `GET /api/hypersphere`: the loaded hypersphere.
pub async fn hypersphere(State(state): State<Arc<AppState>>) -> Json<HypersphereResponse> {
    let sphere = state.scorer.hypersphere();
    Json(HypersphereResponse {
        dim: sphere.dim(),
        radius: sphere.radius(),
        weight_stat: sphere.weight_stat(),
    })
}

/// `POST /api/score`: distance to the center for each feature vector.
///
/// # Errors
///
/// - 400 Bad Request: no rows, too many rows, or a row of the wrong length
/// - 422 Unprocessable Entity: invalid JSON (handled by Axum)
/// - 500 Internal Server Error: tensor backend failure
pub async fn score(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ScoreRequest>,
) -> Result<Json<ScoreResponse>, ApiError> {
    if request.features.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "features must not be empty"));
    }
    if request.features.len() > MAX_SCORE_ROWS {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            format!(
                "at most {MAX_SCORE_ROWS} feature vectors per request, got {}",
                request.features.len()
            ),
        ));
    }

    // Flow inference is CPU-bound; keep it off the async workers.
    let worker = Arc::clone(&state);
    let scores = tokio::task::spawn_blocking(move || worker.scorer.score_rows(&request.features))
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("scoring task failed: {e}")))?
        .map_err(|e| match e {
            NatcgError::DimensionMismatch { .. } | NatcgError::InvalidBatch { .. } => {
                api_error(StatusCode::BAD_REQUEST, e.to_string())
            }
            other => {
                tracing::error!("scoring failed: {other}");
                api_error(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
            }
        })?;

    tracing::debug!(rows = scores.len(), "scored batch");
    Ok(Json(ScoreResponse {
        scores,
        radius: state.scorer.radius(),
    }))
}
