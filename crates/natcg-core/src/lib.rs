//! # natcg-core
//!
//! Shared vocabulary for the natcg workspace: the error type, the training
//! configuration, the two-phase training model and a few numeric helpers.
//!
//! ## Key Types
//!
//! - [`NatcgError`]: the single error enum used by every crate
//! - [`TrainConfig`]: the full configuration surface (seed, dataset sizes,
//!   flow shape, epoch budgets, optimizer terms, NU and K)
//! - [`TrainingPhase`]: `EmbeddingSupervised` → `FlowUnsupervised`, one way
//! - [`stats::quantile`]: order-statistic helper used by the radius update
//!
//! ## Architecture Rules
//!
//! - No tensor code here: this crate must build without candle.
//! - Every other `natcg-*` crate depends on this one.

pub mod config;
pub mod error;
pub mod phase;
pub mod stats;

pub use config::{Normalization, TrainConfig};
pub use error::NatcgError;
pub use phase::TrainingPhase;

/// Embedding dimension produced by the reference image-map network.
///
/// Fixed by the embedding architecture, not a tunable parameter.
pub const REFERENCE_EMBEDDING_DIM: usize = 4096;

/// Class id of natural photographs in the supervised stream.
///
/// CG algorithm `i` (1-based) uses class id `i`.
pub const NATURAL_CLASS: u32 = 0;
