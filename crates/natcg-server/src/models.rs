//! JSON request and response models for the HTTP API.

use serde::{Deserialize, Serialize};

/// Request body for `POST /api/score`.
///
/// # Example
///
/// ```
/// use natcg_server::models::ScoreRequest;
///
/// let json = r#"{"features": [[0.0, 1.0], [2.0, 3.0]]}"#;
/// let req: ScoreRequest = serde_json::from_str(json).unwrap();
/// assert_eq!(req.features.len(), 2);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreRequest {
    /// Feature vectors, each of the trained dimension D.
    pub features: Vec<Vec<f32>>,
}

/// Response body for `POST /api/score`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreResponse {
    /// Distance of each latent to the center, in request order.
    pub scores: Vec<f32>,
    /// Learned radius, for callers that compare against it.
    pub radius: f32,
}

/// Response body for `GET /api/hypersphere`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HypersphereResponse {
    pub dim: usize,
    pub radius: f32,
    pub weight_stat: f32,
}

/// Error response body.
///
/// # Example
///
/// ```
/// use natcg_server::models::ErrorResponse;
///
/// let err = ErrorResponse { error: "bad input".into() };
/// let json = serde_json::to_string(&err).unwrap();
/// assert!(json.contains("bad input"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error message.
    pub error: String,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Crate version.
    pub version: String,
}
