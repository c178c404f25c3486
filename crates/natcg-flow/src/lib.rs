//! # natcg-flow
//!
//! The neural half of natcg, on candle tensors.
//!
//! ## Key Components
//!
//! - [`nice::NiceFlow`]: invertible flow, a stack of additive coupling blocks
//!   (unit Jacobian determinant, exact inverse)
//! - [`coupling::CouplingBlock`] with its explicit [`coupling::Orientation`]
//! - [`embedding::EmbeddingNet`]: the `classify` / `embed` contract of the
//!   image map, and [`embedding::ConvEmbedder`], the reference image map
//! - [`init::seed_parameters`]: deterministic re-initialization of a `VarMap`
//!
//! ## Device Support
//!
//! Runs on `Device::Cpu` by default. Build with `--features cuda` to let
//! callers pick `Device::cuda_if_available(0)`.

pub use natcg_core;

pub mod coupling;
pub mod embedding;
pub mod init;
pub mod nice;

pub use coupling::{CouplingBlock, Orientation};
pub use embedding::{ConvEmbedder, ConvEmbedderConfig, EmbeddingNet};
pub use init::seed_parameters;
pub use nice::{FlowConfig, NiceFlow};

use candle_core::Device;

/// Picks the compute device once at startup.
///
/// Returns CUDA device 0 when available (and `prefer_cpu` is false), the
/// CPU otherwise. Never fails: an unavailable accelerator degrades to the
/// CPU path.
///
/// # Example
///
/// ```
/// let device = natcg_flow::select_device(true);
/// assert!(device.is_cpu());
/// ```
pub fn select_device(prefer_cpu: bool) -> Device {
    if prefer_cpu {
        return Device::Cpu;
    }
    match Device::cuda_if_available(0) {
        Ok(device) => device,
        Err(e) => {
            tracing::warn!("accelerator unavailable, falling back to CPU: {e}");
            Device::Cpu
        }
    }
}
