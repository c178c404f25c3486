//! Batch-level progress reporting for one epoch.
//!
//! Renders an indicatif bar whose message reads
//! `Train Epoch: 3/100 (lr: 1.00e-3) [48/630 (7%)]. Loss: 0.412` and keeps
//! the running mean loss of the epoch. With progress disabled the bar is
//! hidden but the mean is still tracked.

use indicatif::{ProgressBar, ProgressStyle};

/// Progress line for one batch.
///
/// # Example
///
/// ```
/// use natcg_learn::progress::format_progress;
///
/// let line = format_progress(3, 100, 1e-3, 48, 630, 0.4123);
/// assert_eq!(line, "Train Epoch: 3/100 (lr: 1.00e-3) [48/630 (7%)]. Loss: 0.412");
/// ```
pub fn format_progress(epoch: usize, epochs: usize, lr: f64, seen: usize, total: usize, loss: f32) -> String {
    let pct = if total == 0 { 100 } else { 100 * seen / total };
    format!(
        "Train Epoch: {epoch}/{epochs} (lr: {}) [{seen}/{total} ({pct}%)]. Loss: {loss:.3}",
        format_lr(lr)
    )
}

/// `1e-3` → `1.00e-3`.
fn format_lr(lr: f64) -> String {
    format!("{lr:.2e}")
}

/// Tracks one epoch: progress bar plus running mean loss.
pub struct EpochProgress {
    bar: ProgressBar,
    epoch: usize,
    epochs: usize,
    total_samples: usize,
    log_interval: usize,
    seen: usize,
    loss_sum: f64,
    batches: usize,
}

impl EpochProgress {
    pub fn new(
        show: bool,
        epoch: usize,
        epochs: usize,
        total_samples: usize,
        num_batches: usize,
        log_interval: usize,
    ) -> Self {
        let bar = if show {
            let bar = ProgressBar::new(num_batches as u64);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{bar:30.cyan/blue} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            bar
        } else {
            ProgressBar::hidden()
        };
        Self {
            bar,
            epoch,
            epochs,
            total_samples,
            log_interval: log_interval.max(1),
            seen: 0,
            loss_sum: 0.0,
            batches: 0,
        }
    }

    /// Records the loss of one batch of `batch_len` samples.
    pub fn record(&mut self, batch_len: usize, loss: f32, lr: f64) {
        self.seen += batch_len;
        self.loss_sum += loss as f64;
        self.batches += 1;
        // Batch indices count from 0, so the first batch always refreshes.
        if (self.batches - 1) % self.log_interval == 0 || self.seen >= self.total_samples {
            self.bar.set_message(format_progress(
                self.epoch,
                self.epochs,
                lr,
                self.seen,
                self.total_samples,
                self.mean_loss(),
            ));
        }
        self.bar.inc(1);
    }

    /// Running mean over the batches recorded so far (0 before any batch).
    pub fn mean_loss(&self) -> f32 {
        if self.batches == 0 {
            0.0
        } else {
            (self.loss_sum / self.batches as f64) as f32
        }
    }

    /// Closes the bar and returns the epoch's mean batch loss.
    pub fn finish(self) -> f32 {
        self.bar.finish();
        self.mean_loss()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn final_line_reads_full() {
        assert_eq!(
            format_progress(1, 2, 0.01, 630, 630, 1.0),
            "Train Epoch: 1/2 (lr: 1.00e-2) [630/630 (100%)]. Loss: 1.000"
        );
    }

    #[test]
    fn empty_total_reads_complete() {
        assert!(format_progress(1, 1, 1e-3, 0, 0, 0.0).contains("(100%)"));
    }

    #[test]
    fn first_batch_refreshes_message() {
        let mut p = EpochProgress::new(false, 2, 5, 40, 10, 4);
        p.record(4, 0.5, 1e-3);
        assert_eq!(p.bar.message(), format_progress(2, 5, 1e-3, 4, 40, 0.5));

        // Batches 2..4 fall between refreshes.
        p.record(4, 1.5, 1e-3);
        assert_eq!(p.bar.message(), format_progress(2, 5, 1e-3, 4, 40, 0.5));
        p.record(4, 1.0, 1e-3);
        p.record(4, 1.0, 1e-3);
        assert_eq!(p.bar.message(), format_progress(2, 5, 1e-3, 4, 40, 0.5));

        // The fifth batch has index 4.
        p.record(4, 1.0, 1e-3);
        assert_eq!(p.bar.message(), format_progress(2, 5, 1e-3, 20, 40, 1.0));
    }

    #[test]
    fn hidden_progress_tracks_mean() {
        let mut p = EpochProgress::new(false, 1, 1, 6, 3, 1);
        p.record(2, 1.0, 1e-3);
        p.record(2, 2.0, 1e-3);
        p.record(2, 6.0, 1e-3);
        assert!((p.finish() - 3.0).abs() < 1e-6);
    }
}
