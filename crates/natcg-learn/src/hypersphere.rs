//! Soft-boundary hypersphere objective for the flow phase.
//!
//! With latents `z`, center `c`, radius `R`, outlier fraction `ν`, exponent
//! `K` and weight statistic `W`:
//!
//! ```text
//! dist_K(z) = ‖z − c‖^K
//! L         = R^K + (1/ν) · mean_batch( max(0, dist_K(z) − R^K) ) + W
//! W         = (λ/2) · Σ‖θ‖²     over all flow parameters
//! R         = quantile_{1−ν}( ‖z − c‖ )   over one epoch of latents
//! ```
//!
//! `c`, `R` and `W` enter the loss as constants; gradients flow only through
//! the latents. A [`HypersphereState`] is a value: every update returns a new
//! state instead of mutating the old one.

use std::sync::Arc;

use candle_core::{Device, Tensor};
use natcg_core::stats::quantile;
use natcg_core::{NatcgError, TrainConfig};
use natcg_flow::{EmbeddingNet, NiceFlow};

use crate::data::DataLoader;
use crate::outputs::OutputsBuffer;

/// Center, radius and weight statistic of the hypersphere.
#[derive(Debug, Clone)]
pub struct HypersphereState {
    center: Arc<[f32]>,
    center_tensor: Tensor,
    radius: f32,
    weight_stat: f32,
}

impl HypersphereState {
    /// State with the given center, radius 0 and weight statistic 0.
    ///
    /// # Errors
    ///
    /// Returns [`NatcgError::DimensionMismatch`] for an empty center.
    pub fn new(center: Vec<f32>, device: &Device) -> Result<Self, NatcgError> {
        Self::from_parts(center, 0.0, 0.0, device)
    }

    /// Rebuilds a state, e.g. from a saved bundle.
    ///
    /// # Errors
    ///
    /// Returns [`NatcgError::DimensionMismatch`] for an empty center and
    /// [`NatcgError::InvalidBatch`] for a negative or non-finite radius.
    pub fn from_parts(
        center: Vec<f32>,
        radius: f32,
        weight_stat: f32,
        device: &Device,
    ) -> Result<Self, NatcgError> {
        if center.is_empty() {
            return Err(NatcgError::DimensionMismatch {
                context: "hypersphere center".to_string(),
                expected: 1,
                actual: 0,
            });
        }
        if !(radius.is_finite() && radius >= 0.0) {
            return Err(NatcgError::InvalidBatch {
                message: format!("hypersphere radius must be finite and >= 0, got {radius}"),
            });
        }
        let dim = center.len();
        let center_tensor = Tensor::from_slice(&center, (1, dim), device).map_err(|e| NatcgError::Tensor {
            message: format!("HypersphereState: {e}"),
        })?;
        Ok(Self {
            center: center.into(),
            center_tensor,
            radius,
            weight_stat,
        })
    }

    pub fn center(&self) -> &[f32] {
        &self.center
    }

    /// Center as a `[1, D]` tensor on the training device.
    pub fn center_tensor(&self) -> &Tensor {
        &self.center_tensor
    }

    pub fn dim(&self) -> usize {
        self.center.len()
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn weight_stat(&self) -> f32 {
        self.weight_stat
    }

    /// Same state with a new radius.
    pub fn with_radius(&self, radius: f32) -> Self {
        Self {
            radius,
            ..self.clone()
        }
    }

    /// Same state with a new weight statistic.
    pub fn with_weight_stat(&self, weight_stat: f32) -> Self {
        Self {
            weight_stat,
            ..self.clone()
        }
    }

    /// Euclidean distance of each latent row to the center, `[batch]`.
    ///
    /// # Errors
    ///
    /// Returns [`NatcgError::DimensionMismatch`] if `latents` is not `[batch, D]`.
    pub fn distances(&self, latents: &Tensor) -> Result<Tensor, NatcgError> {
        self.squared_distances(latents)?
            .sqrt()
            .map_err(|e| NatcgError::Tensor {
                message: format!("HypersphereState distances: {e}"),
            })
    }

    fn squared_distances(&self, latents: &Tensor) -> Result<Tensor, NatcgError> {
        match latents.dims() {
            [_, d] if *d == self.dim() => {}
            other => {
                return Err(NatcgError::DimensionMismatch {
                    context: format!("hypersphere latents {other:?}"),
                    expected: self.dim(),
                    actual: other.last().copied().unwrap_or(0),
                })
            }
        }
        latents
            .broadcast_sub(&self.center_tensor)
            .and_then(|t| t.sqr())
            .and_then(|t| t.sum(1))
            .map_err(|e| NatcgError::Tensor {
                message: format!("HypersphereState squared_distances: {e}"),
            })
    }
}

/// Soft-boundary loss parameters and the hypersphere update rules.
///
/// # Example
///
/// ```
/// use natcg_learn::hypersphere::{HypersphereState, SoftBoundaryLoss};
/// use candle_core::{Device, Tensor};
///
/// let loss = SoftBoundaryLoss::new(0.5, 2.0, 0.0).unwrap();
/// let state = HypersphereState::new(vec![0.0, 0.0], &Device::Cpu).unwrap();
/// let z = Tensor::new(&[[3.0f32, 4.0], [0.0, 0.0]], &Device::Cpu).unwrap();
/// // R = 0: mean(max(0, [25, 0])) / 0.5 = 25
/// let value = loss.loss(&state, &z).unwrap().to_scalar::<f32>().unwrap();
/// assert!((value - 25.0).abs() < 1e-5);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoftBoundaryLoss {
    nu: f64,
    k: f64,
    weight_reg: f64,
}

impl SoftBoundaryLoss {
    /// # Errors
    ///
    /// Returns [`NatcgError::Config`] unless `0 < nu <= 1`, `k > 0` and
    /// `weight_reg >= 0`.
    pub fn new(nu: f64, k: f64, weight_reg: f64) -> Result<Self, NatcgError> {
        if !(nu > 0.0 && nu <= 1.0) {
            return Err(NatcgError::Config {
                message: format!("nu must lie in (0, 1], got {nu}"),
            });
        }
        if !(k.is_finite() && k > 0.0) {
            return Err(NatcgError::Config {
                message: format!("k must be > 0, got {k}"),
            });
        }
        if !(weight_reg.is_finite() && weight_reg >= 0.0) {
            return Err(NatcgError::Config {
                message: format!("weight_reg must be >= 0, got {weight_reg}"),
            });
        }
        Ok(Self { nu, k, weight_reg })
    }

    /// # Errors
    ///
    /// Same as [`Self::new`].
    pub fn from_config(config: &TrainConfig) -> Result<Self, NatcgError> {
        Self::new(config.nu, config.k, config.weight_reg)
    }

    pub fn nu(&self) -> f64 {
        self.nu
    }

    pub fn k(&self) -> f64 {
        self.k
    }

    /// Computes the initial state: the center is the mean latent of one full
    /// pass over `loader`, with radius 0 and `W` 0. The first `update_w`
    /// after an optimizer step sets `W`.
    ///
    /// The pass runs in index order and records no gradients.
    ///
    /// # Errors
    ///
    /// Returns [`NatcgError::DimensionMismatch`] if the embedder and flow
    /// widths differ, [`NatcgError::InvalidBatch`] for an empty loader.
    pub fn init_vars(
        &self,
        embedder: &dyn EmbeddingNet,
        flow: &NiceFlow,
        loader: &DataLoader,
    ) -> Result<HypersphereState, NatcgError> {
        if embedder.embedding_dim() != flow.dim() {
            return Err(NatcgError::DimensionMismatch {
                context: "embedding width vs flow width".to_string(),
                expected: flow.dim(),
                actual: embedder.embedding_dim(),
            });
        }
        let map_err = |e: candle_core::Error| NatcgError::Tensor {
            message: format!("SoftBoundaryLoss init_vars: {e}"),
        };

        let mut sum: Option<Tensor> = None;
        let mut count = 0usize;
        for batch in loader.sequential() {
            let batch = batch?;
            batch.validate(loader.sample_count())?;
            let features = embedder.embed(&batch.images)?.detach();
            let latents = flow.forward(&features)?.detach();
            let batch_sum = latents.sum(0).map_err(map_err)?;
            sum = Some(match sum {
                Some(acc) => (acc + batch_sum).map_err(map_err)?,
                None => batch_sum,
            });
            count += batch.len();
        }

        let sum = sum.ok_or_else(|| NatcgError::InvalidBatch {
            message: "cannot initialize the hypersphere from an empty stream".to_string(),
        })?;
        let center = sum
            .affine(1.0 / count as f64, 0.0)
            .and_then(|t| t.to_vec1::<f32>())
            .map_err(map_err)?;

        let state = HypersphereState::new(center, flow.device())?;
        tracing::info!(samples = count, dim = state.dim(), "initialized hypersphere center");
        Ok(state)
    }

    /// `‖z − c‖^K` per latent row, `[batch]`.
    ///
    /// # Errors
    ///
    /// Returns [`NatcgError::DimensionMismatch`] if `latents` is not `[batch, D]`.
    pub fn distances_k(&self, state: &HypersphereState, latents: &Tensor) -> Result<Tensor, NatcgError> {
        let squared = state.squared_distances(latents)?;
        if self.k == 2.0 {
            return Ok(squared);
        }
        squared.powf(self.k / 2.0).map_err(|e| NatcgError::Tensor {
            message: format!("SoftBoundaryLoss distances_k: {e}"),
        })
    }

    /// Scalar loss for one batch of latents. Differentiable with respect to
    /// `latents`; the state contributes constants only.
    ///
    /// # Errors
    ///
    /// Returns [`NatcgError::DimensionMismatch`] if `latents` is not `[batch, D]`.
    pub fn loss(&self, state: &HypersphereState, latents: &Tensor) -> Result<Tensor, NatcgError> {
        let map_err = |e: candle_core::Error| NatcgError::Tensor {
            message: format!("SoftBoundaryLoss loss: {e}"),
        };
        let r_k = (state.radius() as f64).powf(self.k);
        let penalty = self
            .distances_k(state, latents)?
            .affine(1.0, -r_k)
            .and_then(|t| t.relu())
            .and_then(|t| t.mean_all())
            .map_err(map_err)?;
        penalty
            .affine(1.0 / self.nu, r_k + state.weight_stat() as f64)
            .map_err(map_err)
    }

    /// Recomputes `W = (λ/2)·Σ‖θ‖²` from the current flow parameters.
    ///
    /// # Errors
    ///
    /// Returns [`NatcgError::Tensor`] if a parameter cannot be read.
    pub fn update_w(&self, state: &HypersphereState, flow: &NiceFlow) -> Result<HypersphereState, NatcgError> {
        let weight_stat = 0.5 * self.weight_reg * flow.squared_param_norm()?;
        Ok(state.with_weight_stat(weight_stat as f32))
    }

    /// Sets `R` to the `(1 − ν)` quantile of the epoch's distances to the
    /// center.
    ///
    /// # Errors
    ///
    /// Returns [`NatcgError::InvalidBatch`] if `outputs` does not cover every
    /// sample of the epoch.
    pub fn update_r(
        &self,
        state: &HypersphereState,
        epoch: usize,
        outputs: &OutputsBuffer,
    ) -> Result<HypersphereState, NatcgError> {
        let distances = outputs.distances_to(state.center())?;
        let radius = self.radius_from_distances(&distances);
        tracing::info!(epoch, radius, previous = state.radius(), "updated hypersphere radius");
        Ok(state.with_radius(radius))
    }

    /// `(1 − ν)` quantile of Euclidean distances, clamped at 0.
    pub fn radius_from_distances(&self, distances: &[f32]) -> f32 {
        quantile(distances, 1.0 - self.nu).unwrap_or(0.0).max(0.0)
    }
}
