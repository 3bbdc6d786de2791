//! Append-only quality time series with convergence and oscillation detectors.
//!
//! Scores are scoped to the whole run. Detectors only look at the most recent
//! `convergence_window` scores of the current epoch; an epoch starts when the
//! run goes back to design, so stale execution scores cannot end the next
//! execution pass on its first round.

use serde::{Deserialize, Serialize};

use super::config::QualityConfig;

/// Per-round quality scores, split into detection epochs so convergence and
/// oscillation restart after a redesign.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityHistory {
    scores: Vec<f64>,
    #[serde(default)]
    epoch_start: usize,
}

impl QualityHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_scores(scores: Vec<f64>) -> Self {
        Self {
            scores,
            epoch_start: 0,
        }
    }

    pub fn append(&mut self, score: f64) {
        self.scores.push(score);
    }

    pub fn scores(&self) -> &[f64] {
        &self.scores
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn latest(&self) -> Option<f64> {
        self.scores.last().copied()
    }

    pub const fn epoch_start(&self) -> usize {
        self.epoch_start
    }

    /// Start a new detection epoch at the current length.
    pub fn begin_epoch(&mut self) {
        self.epoch_start = self.scores.len();
    }

    fn epoch(&self) -> &[f64] {
        &self.scores[self.epoch_start.min(self.scores.len())..]
    }

    /// The most recent `size` scores of the current epoch.
    pub fn window(&self, size: usize) -> &[f64] {
        let epoch = self.epoch();
        &epoch[epoch.len().saturating_sub(size)..]
    }

    /// Whether the most recent score reached `target`.
    ///
    /// Independent of window size; callers evaluate it before convergence.
    pub fn target_met(&self, target: f64) -> bool {
        self.latest().is_some_and(|s| s >= target)
    }

    /// Converged once a full window spreads less than `min_improvement`.
    pub fn should_stop_for_convergence(&self, config: &QualityConfig) -> (bool, String) {
        let size = config.convergence_window;
        let window = self.window(size);
        if window.len() < size {
            return (
                false,
                format!("{} of {size} scores recorded", window.len()),
            );
        }
        let max = window.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = window.iter().copied().fold(f64::INFINITY, f64::min);
        let spread = max - min;
        if spread < config.min_improvement {
            (
                true,
                format!(
                    "converged: quality spread {spread:.3} over last {size} rounds is below {:.3}",
                    config.min_improvement
                ),
            )
        } else {
            (false, format!("quality spread {spread:.3} over last {size} rounds"))
        }
    }

    /// Number of sign changes between successive deltas in the window.
    /// Flat deltas carry no sign and are skipped.
    pub fn sign_flips(&self, size: usize) -> usize {
        let window = self.window(size);
        let mut flips = 0;
        let mut last_sign = 0.0_f64;
        for pair in window.windows(2) {
            let delta = pair[1] - pair[0];
            if delta == 0.0 {
                continue;
            }
            let sign = delta.signum();
            if last_sign != 0.0 && sign != last_sign {
                flips += 1;
            }
            last_sign = sign;
        }
        flips
    }

    pub fn is_oscillating(&self, config: &QualityConfig) -> bool {
        self.sign_flips(config.convergence_window) >= config.oscillation_flips
    }
}
