//! Training configuration.
//!
//! [`TrainConfig::default`] is the reference configuration: 630 natural and
//! 630-per-algorithm CG training images, 4 CG algorithms, a 4-block NICE
//! flow over 4096-dim embeddings, 300 supervised and 100 flow epochs.
//!
//! Configurations are usually loaded from TOML with every field optional:
//!
//! ```toml
//! seed = 7
//! epochs_flow = 20
//! nu = 0.1
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::NatcgError;

/// Every externally supplied knob of a training run.
///
/// # Example
///
/// ```
/// use natcg_core::TrainConfig;
///
/// let config = TrainConfig::from_toml_str("seed = 3\nnu = 0.1").unwrap();
/// assert_eq!(config.seed, 3);
/// assert_eq!(config.nu, 0.1);
/// assert_eq!(config.num_layers, 4);
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Seed for the dataset split, batch shuffling and parameter init.
    pub seed: u64,

    /// Natural images drawn into the training split.
    pub nb_train_natural: usize,
    /// CG images drawn into the training split, per CG algorithm.
    pub nb_train_cg: usize,
    /// Images held out for testing, per class.
    pub nb_test_per_class: usize,
    /// Natural class plus one class per CG algorithm.
    pub num_classes: usize,
    /// Mini-batch size for both phases.
    pub batch_size: usize,

    /// Embedding dimension D. Fixed by the embedding network.
    pub input_dim: usize,
    /// Hidden width of each coupling MLP.
    pub hidden_dim: usize,
    /// Number of additive coupling blocks.
    pub num_layers: usize,
    /// Hidden layers inside each coupling MLP.
    pub coupling_depth: usize,

    /// Supervised embedding epochs (phase 1).
    pub epochs_embedding: usize,
    /// Flow epochs (phase 2).
    pub epochs_flow: usize,
    /// Phase 1 learning rate.
    pub lr_embedding: f64,
    /// Phase 2 learning rate.
    pub lr_flow: f64,
    /// First-moment decay for both optimizers.
    pub beta1: f64,
    /// Second-moment decay for both optimizers.
    pub beta2: f64,
    /// Decoupled weight decay for the embedding optimizer.
    pub weight_decay_embedding: f64,

    /// Expected fraction of training samples outside the hypersphere.
    pub nu: f64,
    /// Order of the distance used by the soft-boundary loss.
    pub k: f64,
    /// Coefficient of the weight statistic `(λ/2)·Σ‖θ‖²`.
    pub weight_reg: f64,

    /// Progress is refreshed every `log_interval` batches.
    pub log_interval: usize,
    /// Render per-epoch progress bars.
    pub show_progress: bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            nb_train_natural: 630,
            nb_train_cg: 630,
            nb_test_per_class: 360,
            num_classes: 5,
            batch_size: 16,
            input_dim: crate::REFERENCE_EMBEDDING_DIM,
            hidden_dim: 1000,
            num_layers: 4,
            coupling_depth: 2,
            epochs_embedding: 300,
            epochs_flow: 100,
            lr_embedding: 1e-3,
            lr_flow: 1e-3,
            beta1: 0.9,
            beta2: 0.999,
            weight_decay_embedding: 0.0,
            nu: 0.05,
            k: 2.0,
            weight_reg: 1e-6,
            log_interval: 1,
            show_progress: true,
        }
    }
}

impl TrainConfig {
    /// Parses a TOML document; missing fields take their default value.
    ///
    /// # Errors
    ///
    /// Returns [`NatcgError::Serialization`] on malformed TOML or unknown
    /// value types.
    pub fn from_toml_str(text: &str) -> Result<Self, NatcgError> {
        toml::from_str(text).map_err(|e| NatcgError::Serialization {
            message: format!("config: {e}"),
        })
    }

    /// Reads and parses a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`NatcgError::Io`] if the file cannot be read and
    /// [`NatcgError::Serialization`] if it does not parse.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, NatcgError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| NatcgError::Io {
            message: format!("{}: {e}", path.display()),
        })?;
        Self::from_toml_str(&text)
    }

    /// Number of CG generation algorithms (every class but the natural one).
    pub fn num_cg_algorithms(&self) -> usize {
        self.num_classes.saturating_sub(1)
    }

    /// Size of the supervised (phase 1) training stream.
    pub fn phase1_sample_count(&self) -> usize {
        self.nb_train_natural + self.nb_train_cg * self.num_cg_algorithms()
    }

    /// Size of the flow (phase 2) training stream and of the outputs buffer.
    pub fn phase2_sample_count(&self) -> usize {
        self.nb_train_natural
    }

    /// Checks every value before any training starts.
    ///
    /// # Errors
    ///
    /// Returns [`NatcgError::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<(), NatcgError> {
        let fail = |message: String| Err(NatcgError::Config { message });

        if !(self.nu > 0.0 && self.nu <= 1.0) {
            return fail(format!("nu must lie in (0, 1], got {}", self.nu));
        }
        if !(self.k.is_finite() && self.k > 0.0) {
            return fail(format!("k must be a positive finite number, got {}", self.k));
        }
        if !(self.weight_reg.is_finite() && self.weight_reg >= 0.0) {
            return fail(format!("weight_reg must be >= 0, got {}", self.weight_reg));
        }
        if self.input_dim < 2 || self.input_dim % 2 != 0 {
            return fail(format!(
                "input_dim must be even and >= 2 for half-split coupling, got {}",
                self.input_dim
            ));
        }
        if self.hidden_dim == 0 || self.coupling_depth == 0 {
            return fail("hidden_dim and coupling_depth must be > 0".to_string());
        }
        if self.num_layers < 2 {
            return fail(format!(
                "num_layers must be >= 2 so both halves get transformed, got {}",
                self.num_layers
            ));
        }
        if self.num_classes < 2 {
            return fail(format!(
                "num_classes must count the natural class plus at least one CG algorithm, got {}",
                self.num_classes
            ));
        }
        if self.batch_size == 0 {
            return fail("batch_size must be > 0".to_string());
        }
        if self.nb_train_natural == 0 {
            return fail("nb_train_natural must be > 0".to_string());
        }
        if self.epochs_embedding == 0 || self.epochs_flow == 0 {
            return fail("both epoch budgets must be > 0".to_string());
        }
        for (name, lr) in [("lr_embedding", self.lr_embedding), ("lr_flow", self.lr_flow)] {
            if !(lr.is_finite() && lr > 0.0) {
                return fail(format!("{name} must be > 0, got {lr}"));
            }
        }
        for (name, beta) in [("beta1", self.beta1), ("beta2", self.beta2)] {
            if !(0.0..1.0).contains(&beta) {
                return fail(format!("{name} must lie in [0, 1), got {beta}"));
            }
        }
        if self.log_interval == 0 {
            return fail("log_interval must be > 0".to_string());
        }
        Ok(())
    }
}

/// Per-channel input normalization, computed on a training stream.
///
/// `x' = (x - mean[c]) / std[c]` for every pixel of channel `c`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Normalization {
    pub mean: Vec<f32>,
    pub std: Vec<f32>,
}

impl Normalization {
    /// Identity normalization over `channels` channels.
    pub fn identity(channels: usize) -> Self {
        Self {
            mean: vec![0.0; channels],
            std: vec![1.0; channels],
        }
    }

    pub fn channels(&self) -> usize {
        self.mean.len()
    }
}
