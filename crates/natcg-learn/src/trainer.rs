//! Two-phase training orchestrator.
//!
//! ## Training Algorithm
//!
//! Phase 1 (`EmbeddingSupervised`), per batch of natural + CG images:
//! 1. Logits = `embedder.classify(images)`
//! 2. Cross-entropy against the class labels
//! 3. AdamW step on the embedder parameters
//!
//! After the phase-1 budget, the hypersphere center is the mean latent of the
//! natural training stream (radius 0), and the trainer enters
//! `FlowUnsupervised`. Per batch of natural images:
//! 1. Features = `embedder.embed(images)`, detached (the embedder is frozen)
//! 2. Latents = `flow.forward(features)`
//! 3. Soft-boundary loss with the current center, radius and `W`
//! 4. AdamW step on the flow parameters, then `W` is recomputed
//! 5. The pre-step latents are stored in the epoch's outputs buffer
//!
//! At the end of every flow epoch the radius is recomputed from the buffer.
//!
//! The state machine only moves forward; any out-of-order call fails with
//! [`NatcgError::PhaseOrder`] and leaves the trainer unchanged.

use candle_core::Tensor;
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarMap};
use natcg_core::{NatcgError, TrainConfig, TrainingPhase};
use natcg_flow::{EmbeddingNet, NiceFlow};

use crate::data::{Batch, DataLoader};
use crate::hypersphere::{HypersphereState, SoftBoundaryLoss};
use crate::outputs::OutputsBuffer;
use crate::progress::EpochProgress;

/// Summary of one completed epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochMetrics {
    pub phase: TrainingPhase,
    /// 1-based epoch number within the phase.
    pub epoch: usize,
    pub mean_loss: f32,
    pub learning_rate: f64,
    /// Radius after the epoch (flow phase only).
    pub radius: Option<f32>,
}

/// Loss histories and final hypersphere of a finished run.
#[derive(Debug, Clone)]
pub struct TrainingReport {
    /// Mean cross-entropy per phase-1 epoch.
    pub losses_img_map: Vec<f32>,
    /// Mean soft-boundary loss per phase-2 epoch.
    pub losses_flow: Vec<f32>,
    pub hypersphere: HypersphereState,
}

/// Fails with [`NatcgError::Divergence`] if `loss` is NaN or infinite.
///
/// # Example
///
/// ```
/// use natcg_learn::trainer::ensure_finite;
/// use natcg_core::TrainingPhase;
///
/// assert!(ensure_finite(0.5, TrainingPhase::FlowUnsupervised, 1, 0).is_ok());
/// assert!(ensure_finite(f32::NAN, TrainingPhase::FlowUnsupervised, 1, 0).is_err());
/// ```
pub fn ensure_finite(loss: f32, phase: TrainingPhase, epoch: usize, batch: usize) -> Result<(), NatcgError> {
    if loss.is_finite() {
        Ok(())
    } else {
        Err(NatcgError::Divergence {
            phase,
            epoch,
            batch,
            loss,
        })
    }
}

/// Drives the embedder and the flow through both phases.
pub struct Trainer<E: EmbeddingNet> {
    config: TrainConfig,
    embedder: E,
    embed_vars: VarMap,
    flow: NiceFlow,
    flow_vars: VarMap,
    objective: SoftBoundaryLoss,
    embed_optimizer: AdamW,
    flow_optimizer: AdamW,
    phase: TrainingPhase,
    embedding_epochs_done: usize,
    flow_epochs_done: usize,
    hypersphere: Option<HypersphereState>,
    losses_img_map: Vec<f32>,
    losses_flow: Vec<f32>,
}

impl<E: EmbeddingNet> std::fmt::Debug for Trainer<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Trainer({}, embedding {}/{}, flow {}/{}, {:?})",
            self.phase,
            self.embedding_epochs_done,
            self.config.epochs_embedding,
            self.flow_epochs_done,
            self.config.epochs_flow,
            self.flow
        )
    }
}

impl<E: EmbeddingNet> Trainer<E> {
    /// Builds a trainer in `EmbeddingSupervised` with fresh optimizers.
    ///
    /// `embed_vars` and `flow_vars` must hold exactly the parameters of
    /// `embedder` and `flow`.
    ///
    /// # Errors
    ///
    /// Returns [`NatcgError::Config`] for an invalid configuration and
    /// [`NatcgError::DimensionMismatch`] if the embedder, flow and
    /// configuration disagree on D or on the class count.
    pub fn new(
        config: TrainConfig,
        embedder: E,
        embed_vars: VarMap,
        flow: NiceFlow,
        flow_vars: VarMap,
    ) -> Result<Self, NatcgError> {
        config.validate()?;
        if embedder.embedding_dim() != flow.dim() {
            return Err(NatcgError::DimensionMismatch {
                context: "embedding output vs flow input".to_string(),
                expected: flow.dim(),
                actual: embedder.embedding_dim(),
            });
        }
        if flow.dim() != config.input_dim {
            return Err(NatcgError::DimensionMismatch {
                context: "flow input vs configured input_dim".to_string(),
                expected: config.input_dim,
                actual: flow.dim(),
            });
        }
        if embedder.num_classes() != config.num_classes {
            return Err(NatcgError::DimensionMismatch {
                context: "classifier head vs configured num_classes".to_string(),
                expected: config.num_classes,
                actual: embedder.num_classes(),
            });
        }

        let map_err = |e: candle_core::Error| NatcgError::Tensor {
            message: format!("Trainer new: {e}"),
        };
        let embed_optimizer = AdamW::new(
            embed_vars.all_vars(),
            ParamsAdamW {
                lr: config.lr_embedding,
                beta1: config.beta1,
                beta2: config.beta2,
                weight_decay: config.weight_decay_embedding,
                ..Default::default()
            },
        )
        .map_err(map_err)?;
        let flow_optimizer = AdamW::new(
            flow_vars.all_vars(),
            ParamsAdamW {
                lr: config.lr_flow,
                beta1: config.beta1,
                beta2: config.beta2,
                weight_decay: 0.0,
                ..Default::default()
            },
        )
        .map_err(map_err)?;

        let objective = SoftBoundaryLoss::from_config(&config)?;
        Ok(Self {
            embed_optimizer,
            flow_optimizer,
            objective,
            phase: TrainingPhase::EmbeddingSupervised,
            embedding_epochs_done: 0,
            flow_epochs_done: 0,
            hypersphere: None,
            losses_img_map: Vec::with_capacity(config.epochs_embedding),
            losses_flow: Vec::with_capacity(config.epochs_flow),
            config,
            embedder,
            embed_vars,
            flow,
            flow_vars,
        })
    }

    pub fn phase(&self) -> TrainingPhase {
        self.phase
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    pub fn embedding_epochs_done(&self) -> usize {
        self.embedding_epochs_done
    }

    pub fn flow_epochs_done(&self) -> usize {
        self.flow_epochs_done
    }

    /// Current hypersphere, `None` before initialization.
    pub fn hypersphere(&self) -> Option<&HypersphereState> {
        self.hypersphere.as_ref()
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    pub fn flow(&self) -> &NiceFlow {
        &self.flow
    }

    pub fn embed_vars(&self) -> &VarMap {
        &self.embed_vars
    }

    pub fn flow_vars(&self) -> &VarMap {
        &self.flow_vars
    }

    pub fn losses_img_map(&self) -> &[f32] {
        &self.losses_img_map
    }

    pub fn losses_flow(&self) -> &[f32] {
        &self.losses_flow
    }

    /// True once both epoch budgets are spent.
    pub fn is_finished(&self) -> bool {
        self.phase == TrainingPhase::FlowUnsupervised && self.flow_epochs_done >= self.config.epochs_flow
    }

    /// Runs one supervised epoch over `loader` (natural + CG stream).
    ///
    /// # Errors
    ///
    /// Returns [`NatcgError::PhaseOrder`] outside `EmbeddingSupervised` or
    /// once the phase-1 budget is spent, [`NatcgError::Divergence`] on a
    /// non-finite loss, and [`NatcgError::InvalidBatch`] for malformed batches.
    pub fn train_embedding_epoch(&mut self, loader: &mut DataLoader) -> Result<EpochMetrics, NatcgError> {
        if self.phase != TrainingPhase::EmbeddingSupervised {
            return Err(NatcgError::PhaseOrder {
                message: format!("embedding epoch requested in {} phase", self.phase),
            });
        }
        if self.embedding_epochs_done >= self.config.epochs_embedding {
            return Err(NatcgError::PhaseOrder {
                message: format!(
                    "embedding budget of {} epochs already spent",
                    self.config.epochs_embedding
                ),
            });
        }
        let map_err = |e: candle_core::Error| NatcgError::Tensor {
            message: format!("train_embedding_epoch: {e}"),
        };

        let epoch = self.embedding_epochs_done + 1;
        let lr = self.embed_optimizer.learning_rate();
        let sample_count = loader.sample_count();
        let mut progress = EpochProgress::new(
            self.config.show_progress,
            epoch,
            self.config.epochs_embedding,
            sample_count,
            loader.num_batches(),
            self.config.log_interval,
        );

        for (batch_idx, batch) in loader.epoch().enumerate() {
            let batch = batch?;
            batch.validate(sample_count)?;

            let logits = self.embedder.classify(&batch.images)?;
            let loss = candle_nn::loss::cross_entropy(&logits, &batch.labels).map_err(map_err)?;
            let loss_val = loss.to_scalar::<f32>().map_err(map_err)?;
            ensure_finite(loss_val, self.phase, epoch, batch_idx)?;

            self.embed_optimizer.backward_step(&loss).map_err(map_err)?;
            progress.record(batch.len(), loss_val, lr);
        }

        let mean_loss = progress.finish();
        self.losses_img_map.push(mean_loss);
        self.embedding_epochs_done = epoch;
        tracing::info!(
            phase = %self.phase,
            epoch,
            epochs = self.config.epochs_embedding,
            mean_loss,
            "embedding epoch complete"
        );

        Ok(EpochMetrics {
            phase: self.phase,
            epoch,
            mean_loss,
            learning_rate: lr,
            radius: None,
        })
    }

    /// Freezes the embedder, computes the initial center from `loader`
    /// (natural stream) and switches to `FlowUnsupervised`.
    ///
    /// # Errors
    ///
    /// Returns [`NatcgError::PhaseOrder`] unless the phase-1 budget is spent
    /// and the hypersphere has not been initialized yet.
    pub fn init_hypersphere(&mut self, loader: &DataLoader) -> Result<&HypersphereState, NatcgError> {
        if self.phase != TrainingPhase::EmbeddingSupervised {
            return Err(NatcgError::PhaseOrder {
                message: "hypersphere already initialized".to_string(),
            });
        }
        if self.embedding_epochs_done < self.config.epochs_embedding {
            return Err(NatcgError::PhaseOrder {
                message: format!(
                    "hypersphere init after {} of {} embedding epochs",
                    self.embedding_epochs_done, self.config.epochs_embedding
                ),
            });
        }

        let state = self.objective.init_vars(&self.embedder, &self.flow, loader)?;
        self.phase = TrainingPhase::FlowUnsupervised;
        tracing::info!(phase = %self.phase, "embedding network frozen, flow phase started");
        Ok(&*self.hypersphere.insert(state))
    }

    /// Runs one flow epoch over `loader` (natural stream) and updates the
    /// radius from the epoch's latents.
    ///
    /// # Errors
    ///
    /// Returns [`NatcgError::PhaseOrder`] before initialization or once the
    /// phase-2 budget is spent, [`NatcgError::Divergence`] on a non-finite
    /// loss, and [`NatcgError::InvalidBatch`] if the epoch does not cover
    /// every sample exactly once.
    pub fn train_flow_epoch(&mut self, loader: &mut DataLoader) -> Result<EpochMetrics, NatcgError> {
        if self.phase != TrainingPhase::FlowUnsupervised {
            return Err(NatcgError::PhaseOrder {
                message: "flow epoch requested before hypersphere initialization".to_string(),
            });
        }
        if self.flow_epochs_done >= self.config.epochs_flow {
            return Err(NatcgError::PhaseOrder {
                message: format!("flow budget of {} epochs already spent", self.config.epochs_flow),
            });
        }
        let mut state = self.hypersphere.clone().ok_or_else(|| NatcgError::PhaseOrder {
            message: "flow phase without hypersphere state".to_string(),
        })?;

        let epoch = self.flow_epochs_done + 1;
        let lr = self.flow_optimizer.learning_rate();
        let sample_count = loader.sample_count();
        let mut outputs = OutputsBuffer::new(sample_count, self.flow.dim());
        let mut progress = EpochProgress::new(
            self.config.show_progress,
            epoch,
            self.config.epochs_flow,
            sample_count,
            loader.num_batches(),
            self.config.log_interval,
        );

        for (batch_idx, batch) in loader.epoch().enumerate() {
            let batch = batch?;
            batch.validate(sample_count)?;

            let latents = self.flow_latents(&batch)?;
            let loss = self.objective.loss(&state, &latents)?;
            let loss_val = loss.to_scalar::<f32>().map_err(|e| NatcgError::Tensor {
                message: format!("train_flow_epoch: {e}"),
            })?;
            ensure_finite(loss_val, self.phase, epoch, batch_idx)?;

            self.flow_optimizer
                .backward_step(&loss)
                .map_err(|e| NatcgError::Tensor {
                    message: format!("train_flow_epoch: {e}"),
                })?;
            state = self.objective.update_w(&state, &self.flow)?;
            outputs.write_batch(&batch.indices, &latents.detach())?;
            progress.record(batch.len(), loss_val, lr);
        }

        let state = self.objective.update_r(&state, epoch, &outputs)?;
        let radius = state.radius();
        let mean_loss = progress.finish();

        self.hypersphere = Some(state);
        self.losses_flow.push(mean_loss);
        self.flow_epochs_done = epoch;
        tracing::info!(
            phase = %self.phase,
            epoch,
            epochs = self.config.epochs_flow,
            mean_loss,
            radius,
            "flow epoch complete"
        );

        Ok(EpochMetrics {
            phase: self.phase,
            epoch,
            mean_loss,
            learning_rate: lr,
            radius: Some(radius),
        })
    }

    fn flow_latents(&self, batch: &Batch) -> Result<Tensor, NatcgError> {
        let features = self.embedder.embed(&batch.images)?.detach();
        self.flow.forward(&features)
    }

    /// Runs whatever remains of both phases.
    ///
    /// `img_map_loader` streams natural + CG images, `flow_loader` streams
    /// natural images only.
    ///
    /// # Errors
    ///
    /// Propagates the first error of any epoch; the run stops there.
    pub fn run(
        &mut self,
        img_map_loader: &mut DataLoader,
        flow_loader: &mut DataLoader,
    ) -> Result<TrainingReport, NatcgError> {
        while self.phase == TrainingPhase::EmbeddingSupervised
            && self.embedding_epochs_done < self.config.epochs_embedding
        {
            self.train_embedding_epoch(img_map_loader)?;
        }
        if self.phase == TrainingPhase::EmbeddingSupervised {
            self.init_hypersphere(flow_loader)?;
        }
        while !self.is_finished() {
            self.train_flow_epoch(flow_loader)?;
        }
        self.report()
    }

    /// Loss histories and the current hypersphere.
    ///
    /// # Errors
    ///
    /// Returns [`NatcgError::PhaseOrder`] before the hypersphere exists.
    pub fn report(&self) -> Result<TrainingReport, NatcgError> {
        let hypersphere = self.hypersphere.clone().ok_or_else(|| NatcgError::PhaseOrder {
            message: "no hypersphere before the flow phase".to_string(),
        })?;
        Ok(TrainingReport {
            losses_img_map: self.losses_img_map.clone(),
            losses_flow: self.losses_flow.clone(),
            hypersphere,
        })
    }
}
