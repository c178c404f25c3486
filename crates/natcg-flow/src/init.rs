//! Seeded parameter initialization.
//!
//! candle's CPU initializers draw from an unseeded thread RNG, so two runs
//! with the same configuration start from different weights. This module
//! overwrites every variable of a [`VarMap`] from a ChaCha8 stream, visiting
//! variables in name order, which makes the initial networks (and therefore
//! the initial hypersphere center) a pure function of the seed.

use candle_core::Tensor;
use candle_nn::VarMap;
use natcg_core::NatcgError;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Re-initializes every variable in `var_map` from `seed`.
///
/// Tensors of rank ≥ 2 are weights and draw from `U(-1/√fan_in, 1/√fan_in)`
/// where `fan_in` is the product of all but the leading dimension. Rank-0 and
/// rank-1 tensors (biases) are zeroed.
///
/// Returns the number of variables initialized.
///
/// # Errors
///
/// Returns [`NatcgError::Tensor`] if the var map lock is poisoned or a
/// variable cannot be overwritten.
///
/// # Example
///
/// ```
/// use natcg_flow::init::seed_parameters;
/// use natcg_flow::nice::{FlowConfig, NiceFlow};
/// use candle_core::Device;
/// use candle_nn::VarMap;
///
/// let var_map = VarMap::new();
/// let config = FlowConfig { input_dim: 4, hidden_dim: 8, num_layers: 2, coupling_depth: 1 };
/// let _flow = NiceFlow::new_trainable(&var_map, &config, &Device::Cpu).unwrap();
/// assert_eq!(seed_parameters(&var_map, 7).unwrap(), 8);
/// ```
pub fn seed_parameters(var_map: &VarMap, seed: u64) -> Result<usize, NatcgError> {
    let map_err = |e: candle_core::Error| NatcgError::Tensor {
        message: format!("seed_parameters: {e}"),
    };

    let data = var_map.data().lock().map_err(|e| NatcgError::Tensor {
        message: format!("seed_parameters: var map lock poisoned: {e}"),
    })?;
    let mut names: Vec<&String> = data.keys().collect();
    names.sort();

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    for name in &names {
        let var = &data[*name];
        let dims = var.dims().to_vec();
        let count = var.elem_count();

        let values: Vec<f32> = if dims.len() >= 2 {
            let fan_in: usize = dims[1..].iter().product();
            let bound = 1.0 / (fan_in.max(1) as f32).sqrt();
            (0..count).map(|_| rng.gen_range(-bound..bound)).collect()
        } else {
            vec![0.0; count]
        };

        let init = Tensor::from_vec(values, dims.as_slice(), var.device()).map_err(map_err)?;
        var.set(&init).map_err(map_err)?;
    }

    tracing::debug!(seed, vars = names.len(), "seeded parameters");
    Ok(names.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nice::{FlowConfig, NiceFlow};
    use candle_core::Device;

    fn snapshot(var_map: &VarMap) -> Vec<(String, Vec<f32>)> {
        let data = var_map.data().lock().unwrap();
        let mut out: Vec<(String, Vec<f32>)> = data
            .iter()
            .map(|(k, v)| (k.clone(), v.flatten_all().unwrap().to_vec1::<f32>().unwrap()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    fn build(seed: u64) -> VarMap {
        let var_map = VarMap::new();
        let config = FlowConfig {
            input_dim: 6,
            hidden_dim: 5,
            num_layers: 2,
            coupling_depth: 2,
        };
        NiceFlow::new_trainable(&var_map, &config, &Device::Cpu).unwrap();
        seed_parameters(&var_map, seed).unwrap();
        var_map
    }

    #[test]
    fn same_seed_same_weights() {
        assert_eq!(snapshot(&build(3)), snapshot(&build(3)));
    }

    #[test]
    fn different_seed_different_weights() {
        assert_ne!(snapshot(&build(3)), snapshot(&build(4)));
    }

    #[test]
    fn biases_zeroed_weights_bounded() {
        for (name, values) in snapshot(&build(9)) {
            if name.ends_with(".bias") {
                assert!(values.iter().all(|v| *v == 0.0), "{name} not zeroed");
            } else {
                assert!(values.iter().all(|v| v.abs() <= 1.0), "{name} out of bounds");
                assert!(values.iter().any(|v| *v != 0.0), "{name} all zero");
            }
        }
    }
}
