//! Structural properties of the NICE flow: exact invertibility and unit
//! Jacobian determinant.

use candle_core::{DType, Device, Tensor};
use candle_nn::VarMap;
use natcg_flow::{seed_parameters, FlowConfig, NiceFlow};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn flow(dim: usize, layers: usize, seed: u64) -> (VarMap, NiceFlow) {
    let var_map = VarMap::new();
    let config = FlowConfig {
        input_dim: dim,
        hidden_dim: 32,
        num_layers: layers,
        coupling_depth: 2,
    };
    let flow = NiceFlow::new_trainable(&var_map, &config, &Device::Cpu).unwrap();
    seed_parameters(&var_map, seed).unwrap();
    (var_map, flow)
}

/// Seeded rows drawn uniformly from [-scale, scale].
fn rows(n: usize, dim: usize, seed: u64, scale: f32) -> Vec<f32> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n * dim).map(|_| rng.gen_range(-scale..=scale)).collect()
}

#[test]
fn inverse_of_forward_is_identity() {
    let (_vm, flow) = flow(16, 4, 1);
    for (seed, scale) in [(1, 1.0), (2, 10.0), (3, 100.0)] {
        let data = rows(8, 16, seed, scale);
        let x = Tensor::from_vec(data.clone(), (8, 16), &Device::Cpu).unwrap();
        let back = flow
            .inverse(&flow.forward(&x).unwrap())
            .unwrap()
            .flatten_all()
            .unwrap()
            .to_vec1::<f32>()
            .unwrap();
        for (a, b) in data.iter().zip(&back) {
            let tol = 1e-4 * (1.0 + a.abs());
            assert!((a - b).abs() <= tol, "scale {scale}: {a} vs {b}");
        }
    }
}

#[test]
fn forward_of_inverse_is_identity() {
    let (_vm, flow) = flow(8, 3, 5);
    let data = rows(4, 8, 9, 2.0);
    let z = Tensor::from_vec(data.clone(), (4, 8), &Device::Cpu).unwrap();
    let again = flow
        .forward(&flow.inverse(&z).unwrap())
        .unwrap()
        .flatten_all()
        .unwrap()
        .to_vec1::<f32>()
        .unwrap();
    for (a, b) in data.iter().zip(&again) {
        assert!((a - b).abs() < 1e-4, "{a} vs {b}");
    }
}

#[test]
fn every_coordinate_is_transformed() {
    let (_vm, flow) = flow(8, 2, 11);
    let x = Tensor::ones((1, 8), DType::F32, &Device::Cpu).unwrap();
    let z = flow.forward(&x).unwrap().flatten_all().unwrap().to_vec1::<f32>().unwrap();
    // Both halves moved after a ShiftSecond + ShiftFirst pair.
    assert!(z[..4].iter().any(|v| (v - 1.0).abs() > 1e-6));
    assert!(z[4..].iter().any(|v| (v - 1.0).abs() > 1e-6));
}

/// Determinant of a small dense matrix by Gaussian elimination with
/// partial pivoting (f64).
fn determinant(mut m: Vec<Vec<f64>>) -> f64 {
    let n = m.len();
    let mut det = 1.0;
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&a, &b| m[a][col].abs().total_cmp(&m[b][col].abs()))
            .unwrap();
        if m[pivot][col].abs() < 1e-12 {
            return 0.0;
        }
        if pivot != col {
            m.swap(pivot, col);
            det = -det;
        }
        det *= m[col][col];
        for row in col + 1..n {
            let factor = m[row][col] / m[col][col];
            for k in col..n {
                m[row][k] -= factor * m[col][k];
            }
        }
    }
    det
}

#[test]
fn jacobian_determinant_is_one() {
    let dim = 6;
    let (_vm, flow) = flow(dim, 4, 21);
    let eps = 1e-3f32;

    for seed in [4, 8] {
        let x0 = rows(1, dim, seed, 1.0);
        // Central differences, one column per input coordinate.
        let mut jac = vec![vec![0.0f64; dim]; dim];
        for j in 0..dim {
            let mut plus = x0.clone();
            let mut minus = x0.clone();
            plus[j] += eps;
            minus[j] -= eps;
            let zp = flow.forward_vec(&plus).unwrap();
            let zm = flow.forward_vec(&minus).unwrap();
            for i in 0..dim {
                jac[i][j] = ((zp[i] - zm[i]) / (2.0 * eps)) as f64;
            }
        }
        let det = determinant(jac);
        assert!((det - 1.0).abs() < 0.02, "det = {det}");
    }

    let x = Tensor::from_vec(rows(3, dim, 1, 1.0), (3, dim), &Device::Cpu).unwrap();
    let ld = flow.log_det_jacobian(&x).unwrap().to_vec1::<f32>().unwrap();
    assert_eq!(ld, vec![0.0; 3]);
}
