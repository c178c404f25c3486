//! Integration tests for the HTTP server.
//!
//! Uses Axum's tower integration for in-process testing
//! without starting a real TCP listener.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use candle_core::Device;
use candle_nn::VarMap;
use tower::ServiceExt; // for oneshot()

use natcg_core::TrainConfig;
use natcg_flow::{seed_parameters, FlowConfig, NiceFlow};
use natcg_learn::{AnomalyScorer, DatasetSplit, HypersphereState, Network, ResultsDir, StateBundle};
use natcg_server::build_app_with_state;
use natcg_server::models::{ErrorResponse, HealthResponse, HypersphereResponse, ScoreResponse};
use natcg_server::state::AppState;

const DIM: usize = 4;

fn flow_config() -> FlowConfig {
    FlowConfig {
        input_dim: DIM,
        hidden_dim: 8,
        num_layers: 2,
        coupling_depth: 1,
    }
}

fn test_state() -> Arc<AppState> {
    let vars = VarMap::new();
    let flow = NiceFlow::new_trainable(&vars, &flow_config(), &Device::Cpu).unwrap();
    seed_parameters(&vars, 1).unwrap();
    let state = HypersphereState::from_parts(vec![0.0; DIM], 1.5, 0.02, &Device::Cpu).unwrap();
    AppState::new(AnomalyScorer::new(flow, state).unwrap())
}

fn app() -> Router {
    build_app_with_state(test_state())
}

async fn post_score(app: Router, body: &str) -> (StatusCode, axum::body::Bytes) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/score")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body)
}

#[tokio::test]
async fn health_endpoint_returns_ok() {
    let response = app()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let health: HealthResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(health.status, "ok");
    assert_eq!(health.version, "0.1.0");
}

#[tokio::test]
async fn hypersphere_endpoint_reports_state() {
    let response = app()
        .oneshot(Request::builder().uri("/api/hypersphere").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let sphere: HypersphereResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(sphere.dim, DIM);
    assert_eq!(sphere.radius, 1.5);
    assert!((sphere.weight_stat - 0.02).abs() < 1e-7);
}

#[tokio::test]
async fn score_returns_one_score_per_row() {
    let (status, body) = post_score(app(), r#"{"features": [[0, 0, 0, 0], [1, -2, 3, 0.5], [9, 9, 9, 9]]}"#).await;
    assert_eq!(status, StatusCode::OK);

    let scored: ScoreResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(scored.scores.len(), 3);
    assert_eq!(scored.radius, 1.5);
    // Zero biases map the origin onto the zero center.
    assert!(scored.scores[0] < 1e-5);
    assert!(scored.scores.iter().all(|s| s.is_finite() && *s >= 0.0));
}

#[tokio::test]
async fn score_rejects_wrong_width() {
    let (status, body) = post_score(app(), r#"{"features": [[0, 0, 0]]}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let err: ErrorResponse = serde_json::from_slice(&body).unwrap();
    assert!(err.error.contains("dimension mismatch"));
}

#[tokio::test]
async fn score_rejects_empty_batch() {
    let (status, body) = post_score(app(), r#"{"features": []}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let err: ErrorResponse = serde_json::from_slice(&body).unwrap();
    assert!(err.error.contains("empty"));
}

#[tokio::test]
async fn score_rejects_malformed_json() {
    let (status, _) = post_score(app(), r#"{"rows": 3}"#).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn state_loads_from_results_directory() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = ResultsDir::create(tmp.path().join("run")).unwrap();

    let config = TrainConfig {
        input_dim: DIM,
        hidden_dim: 8,
        num_layers: 2,
        coupling_depth: 1,
        epochs_flow: 3,
        ..TrainConfig::default()
    };
    let vars = VarMap::new();
    let _flow = NiceFlow::new_trainable(&vars, &FlowConfig::from(&config), &Device::Cpu).unwrap();
    seed_parameters(&vars, 4).unwrap();
    dir.save_checkpoint(&vars, Network::Flow, 3).unwrap();

    let split = DatasetSplit {
        train_ni_idx: vec![0, 1],
        test_ni_idx: vec![2],
        train_cg_idx: vec![vec![0]],
        test_cg_idx: vec![vec![1]],
    };
    let sphere = HypersphereState::from_parts(vec![0.1, 0.2, 0.3, 0.4], 0.75, 0.0, &Device::Cpu).unwrap();
    let bundle = StateBundle::new(
        &split,
        natcg_core::Normalization::identity(3),
        natcg_core::Normalization::identity(3),
        &sphere,
        &config,
    );
    dir.save_bundle(&bundle).unwrap();

    let state = AppState::load(dir.path(), &Device::Cpu).unwrap();
    assert_eq!(state.scorer.dim(), DIM);
    assert_eq!(state.scorer.radius(), 0.75);

    let (status, body) = post_score(build_app_with_state(state), r#"{"features": [[1, 1, 1, 1]]}"#).await;
    assert_eq!(status, StatusCode::OK);
    let scored: ScoreResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(scored.scores.len(), 1);
}

#[tokio::test]
async fn missing_results_directory_fails() {
    let tmp = tempfile::tempdir().unwrap();
    assert!(AppState::load(tmp.path().join("absent"), &Device::Cpu).is_err());
}
