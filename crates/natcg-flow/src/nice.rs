//! NICE flow: a stack of additive coupling blocks.
//!
//! Maps a `[batch, D]` feature tensor to a `[batch, D]` latent tensor.
//! Block `i` uses [`Orientation::for_layer(i)`](Orientation::for_layer), so
//! with two or more blocks every coordinate is shifted conditioned on the
//! complementary half at least once.
//!
//! There is no scaling layer: every block has unit Jacobian determinant, so
//! the whole map is volume preserving and
//! [`NiceFlow::log_det_jacobian`] is identically zero.

use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use natcg_core::{NatcgError, TrainConfig};

use crate::coupling::{check_rows, rows_tensor, CouplingBlock, Orientation};

/// Shape of a [`NiceFlow`].
///
/// # Example
///
/// ```
/// use natcg_flow::nice::FlowConfig;
/// use natcg_core::TrainConfig;
///
/// let config = FlowConfig::from(&TrainConfig::default());
/// assert_eq!(config.input_dim, 4096);
/// assert_eq!(config.num_layers, 4);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowConfig {
    /// Feature / latent dimension D (must be even).
    pub input_dim: usize,
    /// Hidden width of each coupling MLP.
    pub hidden_dim: usize,
    /// Number of coupling blocks.
    pub num_layers: usize,
    /// Hidden layers per coupling MLP.
    pub coupling_depth: usize,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self::from(&TrainConfig::default())
    }
}

impl From<&TrainConfig> for FlowConfig {
    fn from(config: &TrainConfig) -> Self {
        Self {
            input_dim: config.input_dim,
            hidden_dim: config.hidden_dim,
            num_layers: config.num_layers,
            coupling_depth: config.coupling_depth,
        }
    }
}

impl FlowConfig {
    /// Number of trainable scalars in the flow.
    pub fn param_count(&self) -> usize {
        let half = self.input_dim / 2;
        let first = half * self.hidden_dim + self.hidden_dim;
        let inner = (self.coupling_depth.saturating_sub(1))
            * (self.hidden_dim * self.hidden_dim + self.hidden_dim);
        let out = self.hidden_dim * half + half;
        self.num_layers * (first + inner + out)
    }
}

/// Invertible flow network.
///
/// # Example
///
/// ```
/// use natcg_flow::nice::{FlowConfig, NiceFlow};
/// use candle_core::{Device, Tensor};
/// use candle_nn::VarMap;
///
/// let var_map = VarMap::new();
/// let config = FlowConfig { input_dim: 8, hidden_dim: 16, num_layers: 4, coupling_depth: 1 };
/// let flow = NiceFlow::new_trainable(&var_map, &config, &Device::Cpu).unwrap();
///
/// let x = Tensor::ones((3, 8), candle_core::DType::F32, &Device::Cpu).unwrap();
/// let z = flow.forward(&x).unwrap();
/// let back = flow.inverse(&z).unwrap();
/// assert_eq!(back.dims(), &[3, 8]);
/// ```
pub struct NiceFlow {
    blocks: Vec<CouplingBlock>,
    config: FlowConfig,
    device: Device,
}

impl std::fmt::Debug for NiceFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "NiceFlow({}→[{}×{}]×{}→{}, {:.1}M params, device={:?})",
            self.config.input_dim,
            self.config.hidden_dim,
            self.config.coupling_depth,
            self.config.num_layers,
            self.config.input_dim,
            self.config.param_count() as f64 / 1_000_000.0,
            self.device
        )
    }
}

impl NiceFlow {
    /// Creates a trainable flow whose parameters are registered in `var_map`
    /// under the `flow.` prefix.
    ///
    /// # Errors
    ///
    /// Returns [`NatcgError::Config`] for an odd dimension, zero widths, or
    /// fewer than two blocks.
    pub fn new_trainable(
        var_map: &VarMap,
        config: &FlowConfig,
        device: &Device,
    ) -> Result<Self, NatcgError> {
        if config.num_layers < 2 {
            return Err(NatcgError::Config {
                message: format!(
                    "NiceFlow needs at least two coupling blocks to transform both halves, got {}",
                    config.num_layers
                ),
            });
        }
        let vb = VarBuilder::from_varmap(var_map, DType::F32, device);

        let mut blocks = Vec::with_capacity(config.num_layers);
        for i in 0..config.num_layers {
            blocks.push(CouplingBlock::new(
                vb.pp(format!("flow.block_{i}")),
                config.input_dim,
                config.hidden_dim,
                config.coupling_depth,
                Orientation::for_layer(i),
            )?);
        }

        Ok(Self {
            blocks,
            config: config.clone(),
            device: device.clone(),
        })
    }

    /// Maps features `[batch, D]` to latents `[batch, D]`.
    ///
    /// # Errors
    ///
    /// Returns [`NatcgError::DimensionMismatch`] if the input is not `[batch, D]`.
    pub fn forward(&self, features: &Tensor) -> Result<Tensor, NatcgError> {
        check_rows(features, self.config.input_dim, "NiceFlow forward")?;
        let mut h = features.clone();
        for block in &self.blocks {
            h = block.forward(&h)?;
        }
        Ok(h)
    }

    /// Maps latents `[batch, D]` back to features, undoing the blocks in
    /// reverse order.
    ///
    /// # Errors
    ///
    /// Returns [`NatcgError::DimensionMismatch`] if the input is not `[batch, D]`.
    pub fn inverse(&self, latents: &Tensor) -> Result<Tensor, NatcgError> {
        check_rows(latents, self.config.input_dim, "NiceFlow inverse")?;
        let mut h = latents.clone();
        for block in self.blocks.iter().rev() {
            h = block.inverse(&h)?;
        }
        Ok(h)
    }

    /// Per-sample log |det J|, identically zero for additive coupling.
    ///
    /// # Errors
    ///
    /// Returns [`NatcgError::DimensionMismatch`] if the input is not `[batch, D]`.
    pub fn log_det_jacobian(&self, features: &Tensor) -> Result<Tensor, NatcgError> {
        check_rows(features, self.config.input_dim, "NiceFlow log_det_jacobian")?;
        let batch = features.dims()[0];
        Tensor::zeros(batch, DType::F32, &self.device).map_err(|e| NatcgError::Tensor {
            message: format!("NiceFlow log_det_jacobian: {e}"),
        })
    }

    /// Forward pass for a single feature vector.
    ///
    /// # Errors
    ///
    /// Returns [`NatcgError::DimensionMismatch`] if `features.len() != D`.
    pub fn forward_vec(&self, features: &[f32]) -> Result<Vec<f32>, NatcgError> {
        if features.len() != self.config.input_dim {
            return Err(NatcgError::DimensionMismatch {
                context: "NiceFlow forward_vec".to_string(),
                expected: self.config.input_dim,
                actual: features.len(),
            });
        }
        let input = rows_tensor(features, self.config.input_dim, &self.device)?;
        let output = self.forward(&input)?;
        output
            .flatten_all()
            .and_then(|t| t.to_vec1::<f32>())
            .map_err(|e| NatcgError::Tensor {
                message: format!("NiceFlow forward_vec: {e}"),
            })
    }

    /// `Σ‖θ‖²` over all flow parameters, read without tracking gradients.
    ///
    /// # Errors
    ///
    /// Returns [`NatcgError::Tensor`] if a parameter cannot be read.
    pub fn squared_param_norm(&self) -> Result<f64, NatcgError> {
        self.blocks.iter().map(|b| b.squared_norm()).sum()
    }

    /// Orientation of every block, in application order.
    pub fn orientations(&self) -> Vec<Orientation> {
        self.blocks.iter().map(|b| b.orientation()).collect()
    }

    pub fn dim(&self) -> usize {
        self.config.input_dim
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> FlowConfig {
        FlowConfig {
            input_dim: 8,
            hidden_dim: 16,
            num_layers: 4,
            coupling_depth: 2,
        }
    }

    fn sample(rows: usize, dim: usize) -> Tensor {
        let data: Vec<f32> = (0..rows * dim).map(|i| ((i * 7 % 13) as f32 - 6.0) * 0.3).collect();
        Tensor::from_vec(data, (rows, dim), &Device::Cpu).unwrap()
    }

    #[test]
    fn orientations_alternate() {
        let var_map = VarMap::new();
        let flow = NiceFlow::new_trainable(&var_map, &small_config(), &Device::Cpu).unwrap();
        assert_eq!(
            flow.orientations(),
            vec![
                Orientation::ShiftSecond,
                Orientation::ShiftFirst,
                Orientation::ShiftSecond,
                Orientation::ShiftFirst,
            ]
        );
    }

    #[test]
    fn param_count_matches_var_map() {
        let var_map = VarMap::new();
        let config = small_config();
        let _flow = NiceFlow::new_trainable(&var_map, &config, &Device::Cpu).unwrap();
        let total: usize = var_map.all_vars().iter().map(|v| v.elem_count()).sum();
        assert_eq!(total, config.param_count());
    }

    #[test]
    fn forward_preserves_shape() {
        let var_map = VarMap::new();
        let flow = NiceFlow::new_trainable(&var_map, &small_config(), &Device::Cpu).unwrap();
        let z = flow.forward(&sample(5, 8)).unwrap();
        assert_eq!(z.dims(), &[5, 8]);
    }

    #[test]
    fn dimension_mismatch_is_fatal() {
        let var_map = VarMap::new();
        let flow = NiceFlow::new_trainable(&var_map, &small_config(), &Device::Cpu).unwrap();
        let err = flow.forward(&sample(2, 6)).unwrap_err();
        assert!(err.is_fatal_config());
        let err = flow.forward_vec(&[0.0; 3]).unwrap_err();
        assert!(err.is_fatal_config());
    }

    #[test]
    fn rank_one_input_rejected() {
        let var_map = VarMap::new();
        let flow = NiceFlow::new_trainable(&var_map, &small_config(), &Device::Cpu).unwrap();
        let x = Tensor::zeros(8, DType::F32, &Device::Cpu).unwrap();
        assert!(matches!(flow.forward(&x), Err(NatcgError::DimensionMismatch { .. })));
    }

    #[test]
    fn log_det_is_zero() {
        let var_map = VarMap::new();
        let flow = NiceFlow::new_trainable(&var_map, &small_config(), &Device::Cpu).unwrap();
        let ld = flow.log_det_jacobian(&sample(3, 8)).unwrap();
        assert_eq!(ld.to_vec1::<f32>().unwrap(), vec![0.0; 3]);
    }

    #[test]
    fn forward_vec_matches_batch() {
        let var_map = VarMap::new();
        let flow = NiceFlow::new_trainable(&var_map, &small_config(), &Device::Cpu).unwrap();
        let x = sample(1, 8);
        let row = x.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        let single = flow.forward_vec(&row).unwrap();
        let batch = flow.forward(&x).unwrap().flatten_all().unwrap().to_vec1::<f32>().unwrap();
        assert_eq!(single, batch);
    }

    #[test]
    fn debug_format_readable() {
        let var_map = VarMap::new();
        let flow = NiceFlow::new_trainable(&var_map, &small_config(), &Device::Cpu).unwrap();
        let debug = format!("{flow:?}");
        assert!(debug.contains("NiceFlow(8→[16×2]×4→8"));
    }

    #[test]
    fn squared_norm_matches_var_map() {
        let var_map = VarMap::new();
        let flow = NiceFlow::new_trainable(&var_map, &small_config(), &Device::Cpu).unwrap();
        let expected: f64 = var_map
            .all_vars()
            .iter()
            .map(|v| {
                v.flatten_all()
                    .unwrap()
                    .to_vec1::<f32>()
                    .unwrap()
                    .iter()
                    .map(|x| (*x as f64) * (*x as f64))
                    .sum::<f64>()
            })
            .sum();
        let got = flow.squared_param_norm().unwrap();
        assert!((got - expected).abs() < 1e-3 * (1.0 + expected), "{got} vs {expected}");
    }

    #[test]
    fn fewer_than_two_layers_rejected() {
        for num_layers in [0, 1] {
            let var_map = VarMap::new();
            let config = FlowConfig {
                num_layers,
                ..small_config()
            };
            assert!(matches!(
                NiceFlow::new_trainable(&var_map, &config, &Device::Cpu),
                Err(NatcgError::Config { .. })
            ));
        }
    }
}
