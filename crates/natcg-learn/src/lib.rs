//! # natcg-learn
//!
//! Two-phase training of the natural-vs-CG anomaly detector.
//!
//! ## Key Components
//!
//! - [`data`]: dataset split, per-channel normalization, seeded batching
//! - [`hypersphere`]: soft-boundary loss and the center / radius / `W` updates
//! - [`outputs::OutputsBuffer`]: one epoch of flow latents, each index written once
//! - [`trainer::Trainer`]: the `EmbeddingSupervised → FlowUnsupervised` state machine
//! - [`artifacts`]: checkpoints, `vars.json`, loss plot
//! - [`scorer::AnomalyScorer`]: distance-to-center scores from a trained run
//! - [`pipeline`]: the whole run, as used by the `train-natcg` binary

pub use natcg_core;
pub use natcg_flow;

pub mod artifacts;
pub mod data;
pub mod hypersphere;
pub mod outputs;
pub mod pipeline;
pub mod progress;
pub mod scorer;
pub mod trainer;

pub use artifacts::{Network, ResultsDir, StateBundle};
pub use data::{Batch, DataLoader, DatasetSplit, ImageDataset, TrainStream};
pub use hypersphere::{HypersphereState, SoftBoundaryLoss};
pub use outputs::OutputsBuffer;
pub use scorer::AnomalyScorer;
pub use trainer::{EpochMetrics, Trainer, TrainingReport};
