//! Error type shared by every natcg crate.

use thiserror::Error;

use crate::phase::TrainingPhase;

/// All failures surfaced by natcg.
///
/// Configuration, dimension and phase-order errors are fatal: they are
/// raised before (or instead of) any optimizer step and are never retried.
///
/// # Example
///
/// ```
/// use natcg_core::NatcgError;
///
/// let err = NatcgError::DimensionMismatch {
///     context: "flow input".into(),
///     expected: 4096,
///     actual: 2048,
/// };
/// assert!(err.to_string().contains("4096"));
/// assert!(err.is_fatal_config());
/// ```
#[derive(Debug, Clone, Error)]
pub enum NatcgError {
    /// Invalid configuration value.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// A vector or tensor had the wrong trailing dimension.
    #[error("dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        context: String,
        expected: usize,
        actual: usize,
    },

    /// A batch was malformed (shape, labels, or sample indices).
    #[error("invalid batch: {message}")]
    InvalidBatch { message: String },

    /// The training state machine was driven out of order.
    #[error("phase order violation: {message}")]
    PhaseOrder { message: String },

    /// The loss became NaN or infinite.
    #[error("training diverged in {phase} phase (epoch {epoch}, batch {batch}): loss = {loss}")]
    Divergence {
        phase: TrainingPhase,
        epoch: usize,
        batch: usize,
        loss: f32,
    },

    /// Error bubbled up from the tensor backend.
    #[error("tensor error: {message}")]
    Tensor { message: String },

    /// Filesystem failure while reading data or writing artifacts.
    #[error("i/o error: {message}")]
    Io { message: String },

    /// Failure encoding or decoding a config file or state bundle.
    #[error("serialization error: {message}")]
    Serialization { message: String },

    /// Failure rendering the loss-curve plot.
    #[error("plot error: {message}")]
    Plot { message: String },
}

impl NatcgError {
    /// Returns `true` for errors that must abort a run before training starts.
    pub fn is_fatal_config(&self) -> bool {
        matches!(self, Self::Config { .. } | Self::DimensionMismatch { .. })
    }
}

impl From<std::io::Error> for NatcgError {
    fn from(e: std::io::Error) -> Self {
        Self::Io {
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn divergence_message_names_phase_and_position() {
        let err = NatcgError::Divergence {
            phase: TrainingPhase::FlowUnsupervised,
            epoch: 3,
            batch: 7,
            loss: f32::NAN,
        };
        let msg = err.to_string();
        assert!(msg.contains("flow_unsupervised"));
        assert!(msg.contains("epoch 3"));
        assert!(msg.contains("batch 7"));
        assert!(!err.is_fatal_config());
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.safetensors");
        let err: NatcgError = io.into();
        assert!(matches!(err, NatcgError::Io { .. }));
        assert!(err.to_string().contains("missing.safetensors"));
    }

    #[test]
    fn config_errors_are_fatal() {
        let err = NatcgError::Config {
            message: "nu must lie in (0, 1]".into(),
        };
        assert!(err.is_fatal_config());
    }
}
