//! # natcg-server
//!
//! HTTP scoring service for a trained natcg run.
//!
//! This is the leaf crate: it loads the artifacts written by `train-natcg`
//! and serves distance-to-center scores. No other `natcg-*` crate depends
//! on it.
//!
//! ## Endpoints
//!
//! - `GET /health`: health check
//! - `GET /api/hypersphere`: dimension, radius and weight statistic
//! - `POST /api/score`: anomaly scores for a batch of feature vectors

pub mod models;
pub mod routes;
pub mod state;

pub use natcg_learn;

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

use crate::state::AppState;

/// Build the Axum router around a loaded [`AppState`].
///
/// # Example
///
/// ```no_run
/// use natcg_server::build_app_with_state;
/// use natcg_server::state::AppState;
/// use candle_core::Device;
///
/// #[tokio::main]
/// async fn main() {
///     let state = AppState::load("results/01-01-2026_00:00:00", &Device::Cpu).unwrap();
///     let app = build_app_with_state(state);
///     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await.unwrap();
///     axum::serve(listener, app).await.unwrap();
/// }
/// ```
pub fn build_app_with_state(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/api/hypersphere", get(routes::hypersphere))
        .route("/api/score", post(routes::score))
        .with_state(state)
}
