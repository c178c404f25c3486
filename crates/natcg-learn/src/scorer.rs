//! Anomaly scores from a trained flow and hypersphere.
//!
//! The score of a feature vector is the Euclidean distance of its latent to
//! the center. No threshold is applied; [`AnomalyScorer::radius`] is exposed
//! for callers that compare against the learned boundary.

use candle_core::{Device, Tensor};
use candle_nn::VarMap;
use natcg_core::NatcgError;
use natcg_flow::{FlowConfig, NiceFlow};

use crate::artifacts::{Network, ResultsDir};
use crate::hypersphere::HypersphereState;

pub struct AnomalyScorer {
    flow: NiceFlow,
    state: HypersphereState,
}

impl std::fmt::Debug for AnomalyScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AnomalyScorer(D={}, R={:.4}, {:?})", self.dim(), self.radius(), self.flow)
    }
}

impl AnomalyScorer {
    /// # Errors
    ///
    /// Returns [`NatcgError::DimensionMismatch`] if the center and the flow
    /// disagree on D.
    pub fn new(flow: NiceFlow, state: HypersphereState) -> Result<Self, NatcgError> {
        if flow.dim() != state.dim() {
            return Err(NatcgError::DimensionMismatch {
                context: "hypersphere center vs flow width".to_string(),
                expected: flow.dim(),
                actual: state.dim(),
            });
        }
        Ok(Self { flow, state })
    }

    /// Rebuilds the flow from `vars.json` and the flow checkpoint of a
    /// results directory.
    ///
    /// # Errors
    ///
    /// Returns [`NatcgError::Io`] or [`NatcgError::Serialization`] for
    /// missing or unreadable artifacts.
    pub fn load(dir: &ResultsDir, device: &Device) -> Result<Self, NatcgError> {
        let bundle = dir.load_bundle()?;
        let mut vars = VarMap::new();
        let flow = NiceFlow::new_trainable(&vars, &FlowConfig::from(&bundle.config), device)?;
        dir.load_checkpoint(&mut vars, Network::Flow, bundle.config.epochs_flow)?;
        let state = bundle.hypersphere(device)?;
        tracing::info!(
            dir = %dir.path().display(),
            dim = state.dim(),
            radius = state.radius(),
            "loaded trained hypersphere"
        );
        Self::new(flow, state)
    }

    pub fn dim(&self) -> usize {
        self.flow.dim()
    }

    pub fn radius(&self) -> f32 {
        self.state.radius()
    }

    pub fn hypersphere(&self) -> &HypersphereState {
        &self.state
    }

    /// Distance to the center for each row of `features: [batch, D]`.
    ///
    /// # Errors
    ///
    /// Returns [`NatcgError::DimensionMismatch`] for the wrong width.
    pub fn score(&self, features: &Tensor) -> Result<Vec<f32>, NatcgError> {
        let latents = self.flow.forward(features)?;
        self.state
            .distances(&latents)?
            .to_vec1::<f32>()
            .map_err(|e| NatcgError::Tensor {
                message: format!("AnomalyScorer score: {e}"),
            })
    }

    /// Scores plain feature vectors.
    ///
    /// # Errors
    ///
    /// Returns [`NatcgError::InvalidBatch`] for no rows and
    /// [`NatcgError::DimensionMismatch`] for a row of the wrong length.
    pub fn score_rows(&self, rows: &[Vec<f32>]) -> Result<Vec<f32>, NatcgError> {
        if rows.is_empty() {
            return Err(NatcgError::InvalidBatch {
                message: "no feature vectors to score".to_string(),
            });
        }
        let dim = self.dim();
        if let Some(bad) = rows.iter().find(|r| r.len() != dim) {
            return Err(NatcgError::DimensionMismatch {
                context: "feature vector".to_string(),
                expected: dim,
                actual: bad.len(),
            });
        }
        let flat: Vec<f32> = rows.iter().flatten().copied().collect();
        let features = Tensor::from_vec(flat, (rows.len(), dim), self.flow.device()).map_err(|e| NatcgError::Tensor {
            message: format!("AnomalyScorer score_rows: {e}"),
        })?;
        self.score(&features)
    }
}
