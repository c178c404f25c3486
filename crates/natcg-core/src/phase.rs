//! The two training phases.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Active phase of the training state machine.
///
/// The only transition is `EmbeddingSupervised` → `FlowUnsupervised`,
/// taken once when the embedding epoch budget is exhausted.
///
/// # Example
///
/// ```
/// use natcg_core::TrainingPhase;
///
/// let phase = TrainingPhase::EmbeddingSupervised;
/// assert_eq!(phase.next(), Some(TrainingPhase::FlowUnsupervised));
/// assert_eq!(TrainingPhase::FlowUnsupervised.next(), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingPhase {
    /// Stage 1: the embedding network learns the multi-class label.
    EmbeddingSupervised,
    /// Stage 2: the flow learns to pull natural embeddings into the hypersphere.
    FlowUnsupervised,
}

impl TrainingPhase {
    /// Returns a short label used in logs and artifact names.
    pub fn label(&self) -> &'static str {
        match self {
            Self::EmbeddingSupervised => "embedding_supervised",
            Self::FlowUnsupervised => "flow_unsupervised",
        }
    }

    /// Returns the phase that follows this one, if any.
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::EmbeddingSupervised => Some(Self::FlowUnsupervised),
            Self::FlowUnsupervised => None,
        }
    }
}

impl fmt::Display for TrainingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
