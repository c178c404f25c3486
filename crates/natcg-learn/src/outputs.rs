//! Per-epoch latent buffer for the flow phase.
//!
//! Every phase-2 sample index must be written exactly once per epoch before
//! the radius is recomputed from the buffer.

use candle_core::Tensor;
use natcg_core::NatcgError;

/// Latent vectors of one epoch, indexed by sample.
#[derive(Debug, Clone)]
pub struct OutputsBuffer {
    dim: usize,
    rows: Vec<f32>,
    written: Vec<bool>,
    written_count: usize,
}

impl OutputsBuffer {
    /// Empty buffer for `sample_count` latents of width `dim`.
    pub fn new(sample_count: usize, dim: usize) -> Self {
        Self {
            dim,
            rows: vec![0.0; sample_count * dim],
            written: vec![false; sample_count],
            written_count: 0,
        }
    }

    pub fn sample_count(&self) -> usize {
        self.written.len()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn written_count(&self) -> usize {
        self.written_count
    }

    /// True once every sample index has been written.
    pub fn is_complete(&self) -> bool {
        self.written_count == self.written.len()
    }

    /// Records the latent rows of one batch (`latents: [indices.len(), dim]`).
    ///
    /// # Errors
    ///
    /// Returns [`NatcgError::InvalidBatch`] for an index out of range or one
    /// already written this epoch, and [`NatcgError::DimensionMismatch`] if
    /// the latent width is wrong.
    pub fn write_batch(&mut self, indices: &[usize], latents: &Tensor) -> Result<(), NatcgError> {
        let rows = latents.to_vec2::<f32>().map_err(|e| NatcgError::Tensor {
            message: format!("OutputsBuffer write_batch: {e}"),
        })?;
        if rows.len() != indices.len() {
            return Err(NatcgError::InvalidBatch {
                message: format!("{} latent rows for {} sample indices", rows.len(), indices.len()),
            });
        }
        for (&idx, row) in indices.iter().zip(&rows) {
            self.write_row(idx, row)?;
        }
        Ok(())
    }

    /// Records one latent row.
    ///
    /// # Errors
    ///
    /// Same as [`Self::write_batch`].
    pub fn write_row(&mut self, idx: usize, row: &[f32]) -> Result<(), NatcgError> {
        if row.len() != self.dim {
            return Err(NatcgError::DimensionMismatch {
                context: "OutputsBuffer row".to_string(),
                expected: self.dim,
                actual: row.len(),
            });
        }
        match self.written.get(idx) {
            None => Err(NatcgError::InvalidBatch {
                message: format!("sample index {idx} out of range 0..{}", self.written.len()),
            }),
            Some(true) => Err(NatcgError::InvalidBatch {
                message: format!("sample index {idx} written twice in one epoch"),
            }),
            Some(false) => {
                self.rows[idx * self.dim..(idx + 1) * self.dim].copy_from_slice(row);
                self.written[idx] = true;
                self.written_count += 1;
                Ok(())
            }
        }
    }

    pub fn row(&self, idx: usize) -> Option<&[f32]> {
        match self.written.get(idx) {
            Some(true) => Some(&self.rows[idx * self.dim..(idx + 1) * self.dim]),
            _ => None,
        }
    }

    /// Euclidean distance of every row to `center`.
    ///
    /// # Errors
    ///
    /// Returns [`NatcgError::InvalidBatch`] if the buffer is incomplete and
    /// [`NatcgError::DimensionMismatch`] if `center` has the wrong width.
    pub fn distances_to(&self, center: &[f32]) -> Result<Vec<f32>, NatcgError> {
        if !self.is_complete() {
            return Err(NatcgError::InvalidBatch {
                message: format!(
                    "epoch covered {} of {} samples",
                    self.written_count,
                    self.written.len()
                ),
            });
        }
        if center.len() != self.dim {
            return Err(NatcgError::DimensionMismatch {
                context: "OutputsBuffer center".to_string(),
                expected: self.dim,
                actual: center.len(),
            });
        }
        Ok(self
            .rows
            .chunks_exact(self.dim.max(1))
            .map(|row| {
                row.iter()
                    .zip(center)
                    .map(|(z, c)| (z - c) * (z - c))
                    .sum::<f32>()
                    .sqrt()
            })
            .collect())
    }
}
