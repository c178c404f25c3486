//! Results directory: checkpoints, state bundle and loss plot.
//!
//! ```text
//! results/<dd-mm-YYYY_HH:MM:SS>/
//!     img_map_checkpoint_{N1}.safetensors
//!     flow_checkpoint_{N2}.safetensors
//!     vars.json
//!     loss_training.png
//! ```

use std::path::{Path, PathBuf};

use candle_core::Device;
use candle_nn::VarMap;
use natcg_core::{NatcgError, Normalization, TrainConfig};
use plotters::prelude::*;
use serde::{Deserialize, Serialize};

use crate::data::DatasetSplit;
use crate::hypersphere::HypersphereState;

pub const BUNDLE_FILE: &str = "vars.json";
pub const LOSS_PLOT_FILE: &str = "loss_training.png";

/// Which network a checkpoint holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    ImgMap,
    Flow,
}

impl Network {
    fn stem(&self) -> &'static str {
        match self {
            Self::ImgMap => "img_map",
            Self::Flow => "flow",
        }
    }

    /// `img_map_checkpoint_300.safetensors`, `flow_checkpoint_100.safetensors`.
    pub fn checkpoint_file(&self, epochs: usize) -> String {
        format!("{}_checkpoint_{epochs}.safetensors", self.stem())
    }
}

/// Everything needed to reuse a trained model besides its weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateBundle {
    pub train_ni_idx: Vec<usize>,
    pub train_cg_idx: Vec<Vec<usize>>,
    pub test_ni_idx: Vec<usize>,
    pub test_cg_idx: Vec<Vec<usize>>,
    pub normalize_img_map: Normalization,
    pub normalize_flow: Normalization,
    #[serde(rename = "C")]
    pub center: Vec<f32>,
    #[serde(rename = "R")]
    pub radius: f32,
    #[serde(rename = "W")]
    pub weight_stat: f32,
    pub config: TrainConfig,
}

impl StateBundle {
    pub fn new(
        split: &DatasetSplit,
        normalize_img_map: Normalization,
        normalize_flow: Normalization,
        hypersphere: &HypersphereState,
        config: &TrainConfig,
    ) -> Self {
        Self {
            train_ni_idx: split.train_ni_idx.clone(),
            train_cg_idx: split.train_cg_idx.clone(),
            test_ni_idx: split.test_ni_idx.clone(),
            test_cg_idx: split.test_cg_idx.clone(),
            normalize_img_map,
            normalize_flow,
            center: hypersphere.center().to_vec(),
            radius: hypersphere.radius(),
            weight_stat: hypersphere.weight_stat(),
            config: config.clone(),
        }
    }

    /// Rebuilds the hypersphere on `device`.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored center is empty or the radius invalid.
    pub fn hypersphere(&self, device: &Device) -> Result<HypersphereState, NatcgError> {
        HypersphereState::from_parts(self.center.clone(), self.radius, self.weight_stat, device)
    }
}

/// A run's output directory.
#[derive(Debug, Clone)]
pub struct ResultsDir {
    path: PathBuf,
}

impl ResultsDir {
    /// Creates `root/<dd-mm-YYYY_HH:MM:SS>` from the current local time.
    ///
    /// # Errors
    ///
    /// Returns [`NatcgError::Io`] if the directory cannot be created.
    pub fn create_timestamped(root: impl AsRef<Path>) -> Result<Self, NatcgError> {
        let stamp = chrono::Local::now().format("%d-%m-%Y_%H:%M:%S").to_string();
        Self::create(root.as_ref().join(stamp))
    }

    /// Creates (or reuses) `path`.
    ///
    /// # Errors
    ///
    /// Returns [`NatcgError::Io`] if the directory cannot be created.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, NatcgError> {
        let path = path.into();
        std::fs::create_dir_all(&path).map_err(|e| NatcgError::Io {
            message: format!("{}: {e}", path.display()),
        })?;
        Ok(Self { path })
    }

    /// Opens an existing results directory.
    ///
    /// # Errors
    ///
    /// Returns [`NatcgError::Io`] if `path` is not a directory.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, NatcgError> {
        let path = path.into();
        if !path.is_dir() {
            return Err(NatcgError::Io {
                message: format!("{} is not a results directory", path.display()),
            });
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn checkpoint_path(&self, network: Network, epochs: usize) -> PathBuf {
        self.path.join(network.checkpoint_file(epochs))
    }

    /// Writes `var_map` as safetensors.
    ///
    /// # Errors
    ///
    /// Returns [`NatcgError::Io`] on write failure.
    pub fn save_checkpoint(&self, var_map: &VarMap, network: Network, epochs: usize) -> Result<PathBuf, NatcgError> {
        let path = self.checkpoint_path(network, epochs);
        var_map.save(&path).map_err(|e| NatcgError::Io {
            message: format!("{}: {e}", path.display()),
        })?;
        tracing::info!(path = %path.display(), "saved checkpoint");
        Ok(path)
    }

    /// Loads a checkpoint into the variables already registered in `var_map`.
    ///
    /// # Errors
    ///
    /// Returns [`NatcgError::Io`] if the file is missing or does not match.
    pub fn load_checkpoint(&self, var_map: &mut VarMap, network: Network, epochs: usize) -> Result<(), NatcgError> {
        let path = self.checkpoint_path(network, epochs);
        var_map.load(&path).map_err(|e| NatcgError::Io {
            message: format!("{}: {e}", path.display()),
        })
    }

    /// # Errors
    ///
    /// Returns [`NatcgError::Serialization`] or [`NatcgError::Io`].
    pub fn save_bundle(&self, bundle: &StateBundle) -> Result<PathBuf, NatcgError> {
        let path = self.path.join(BUNDLE_FILE);
        let json = serde_json::to_string_pretty(bundle).map_err(|e| NatcgError::Serialization {
            message: format!("state bundle: {e}"),
        })?;
        std::fs::write(&path, json)?;
        Ok(path)
    }

    /// # Errors
    ///
    /// Returns [`NatcgError::Io`] if `vars.json` is missing and
    /// [`NatcgError::Serialization`] if it does not parse.
    pub fn load_bundle(&self) -> Result<StateBundle, NatcgError> {
        let path = self.path.join(BUNDLE_FILE);
        let text = std::fs::read_to_string(&path).map_err(|e| NatcgError::Io {
            message: format!("{}: {e}", path.display()),
        })?;
        serde_json::from_str(&text).map_err(|e| NatcgError::Serialization {
            message: format!("{}: {e}", path.display()),
        })
    }

    /// Draws both loss curves side by side into `loss_training.png`.
    ///
    /// # Errors
    ///
    /// Returns [`NatcgError::Plot`] if rendering fails (e.g. no usable font).
    pub fn save_loss_plot(&self, losses_img_map: &[f32], losses_flow: &[f32]) -> Result<PathBuf, NatcgError> {
        let path = self.path.join(LOSS_PLOT_FILE);
        Self::draw_losses(&path, losses_img_map, losses_flow)?;
        Ok(path)
    }

    fn draw_losses(path: &Path, losses_img_map: &[f32], losses_flow: &[f32]) -> Result<(), NatcgError> {
        let plot_err = |e: String| NatcgError::Plot { message: e };

        let root = BitMapBackend::new(path, (1400, 600)).into_drawing_area();
        root.fill(&WHITE).map_err(|e| plot_err(format!("backend error: {e}")))?;
        let panels = root.split_evenly((1, 2));

        for (area, (title, losses, color)) in panels.iter().zip([
            ("Image map (cross-entropy)", losses_img_map, &BLUE),
            ("Flow (soft-boundary)", losses_flow, &RED),
        ]) {
            let (lo, hi) = loss_range(losses);
            let mut chart = ChartBuilder::on(area)
                .margin(10)
                .caption(title, ("sans-serif", 22))
                .x_label_area_size(40)
                .y_label_area_size(60)
                .build_cartesian_2d(1usize..losses.len().max(2), lo..hi)
                .map_err(|e| plot_err(format!("chart build error: {e}")))?;
            chart
                .configure_mesh()
                .x_desc("epoch")
                .y_desc("loss")
                .draw()
                .map_err(|e| plot_err(format!("mesh error: {e}")))?;
            chart
                .draw_series(LineSeries::new(
                    losses.iter().enumerate().map(|(i, l)| (i + 1, *l)),
                    color,
                ))
                .map_err(|e| plot_err(format!("draw error: {e}")))?;
        }

        root.present().map_err(|e| plot_err(format!("render error: {e}")))
    }
}

/// Y range covering `losses` with a small margin; non-finite values ignored.
pub fn loss_range(losses: &[f32]) -> (f32, f32) {
    let finite = losses.iter().copied().filter(|l| l.is_finite());
    let (lo, hi) = finite.fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), l| (lo.min(l), hi.max(l)));
    if lo > hi {
        return (0.0, 1.0);
    }
    let pad = ((hi - lo) * 0.05).max(1e-3);
    (lo - pad, hi + pad)
}
