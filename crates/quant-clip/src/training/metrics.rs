use burn::prelude::*;

use crate::model::Clip;

/// Clip-fitting metrics for one batch, with health checks.
#[derive(Debug, Clone)]
pub struct ClipMetrics {
    /// Total objective: reconstruction + weighted bound penalty.
    pub loss: f64,
    pub reconstruction: f64,
    /// Fraction of input elements pinned to the lower bound.
    pub clipped_low: f64,
    /// Fraction of input elements pinned to the upper bound.
    pub clipped_high: f64,
    pub lower_mean: f64,
    pub upper_mean: f64,
}

impl ClipMetrics {
    /// Measure how `clip` treats `input`. Loss values are computed by the caller.
    ///
    /// Uses the same pinning rule as the forward pass, so an element counted as
    /// clipped is exactly one whose gradient goes to a bound.
    pub fn compute<B: Backend, const D: usize>(
        input: &Tensor<B, D>,
        clip: &Clip<B, D>,
        loss: f64,
        reconstruction: f64,
    ) -> Self {
        let dims = input.dims();
        let n = input.shape().num_elements().max(1) as f64;

        let x = input.clone().detach();
        let lower = clip.lower_value().detach();
        let upper = clip.upper_value().detach();
        let lower_full = lower.clone().expand(dims);
        let upper_full = upper.clone().expand(dims);

        let above = x.clone().max_pair(lower_full.clone()).greater_equal(upper_full);
        let below = x.lower_equal(lower_full);

        let high: f64 = above.clone().int().sum().into_scalar().elem();
        let low: f64 = below.int().mask_fill(above, 0).sum().into_scalar().elem();

        Self {
            loss,
            reconstruction,
            clipped_low: low / n,
            clipped_high: high / n,
            lower_mean: lower.mean().into_scalar().elem(),
            upper_mean: upper.mean().into_scalar().elem(),
        }
    }

    /// Fraction of elements pinned to either bound.
    pub fn clipped_fraction(&self) -> f64 {
        self.clipped_low + self.clipped_high
    }

    /// Warnings for a fit that is going wrong. Empty when healthy.
    pub fn health_check(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if !self.loss.is_finite() {
            warnings.push(format!("loss is not finite ({})", self.loss));
        }
        if self.upper_mean <= self.lower_mean {
            warnings.push(format!(
                "clip range collapsed or inverted: lower={:.4} upper={:.4}",
                self.lower_mean, self.upper_mean
            ));
        }
        if self.clipped_fraction() > 0.5 {
            warnings.push(format!(
                "{:.0}% of inputs clipped, range likely too narrow",
                self.clipped_fraction() * 100.0
            ));
        }
        warnings
    }
}

/// Metrics recorded at each logging interval.
#[derive(Debug, Default)]
pub struct MetricsHistory {
    entries: Vec<(usize, ClipMetrics)>,
}

impl MetricsHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: usize, metrics: ClipMetrics) {
        self.entries.push((step, metrics));
    }

    pub fn last(&self) -> Option<&(usize, ClipMetrics)> {
        self.entries.last()
    }

    pub fn entries(&self) -> &[(usize, ClipMetrics)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
