//! Shared application state for the Axum server.

use std::path::Path;
use std::sync::Arc;

use candle_core::Device;
use natcg_core::NatcgError;
use natcg_learn::{AnomalyScorer, ResultsDir};

/// Shared application state, passed to all route handlers via Axum `State`.
///
/// The scorer is read-only after loading, so handlers share it without
/// locking.
pub struct AppState {
    pub scorer: AnomalyScorer,
}

impl AppState {
    /// Wraps an already-built scorer.
    pub fn new(scorer: AnomalyScorer) -> Arc<Self> {
        Arc::new(Self { scorer })
    }

    /// Loads `vars.json` and the flow checkpoint from a results directory.
    ///
    /// # Errors
    ///
    /// Returns [`NatcgError::Io`] or [`NatcgError::Serialization`] if the
    /// directory does not hold a complete run.
    pub fn load(results: impl AsRef<Path>, device: &Device) -> Result<Arc<Self>, NatcgError> {
        let dir = ResultsDir::open(results.as_ref())?;
        Ok(Self::new(AnomalyScorer::load(&dir, device)?))
    }
}
