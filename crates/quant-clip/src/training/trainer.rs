//! Clip range fitting loop with a single AdamW optimizer on the trainable bounds.
//!
//! Each step draws a batch from the caller's sampler, minimises
//! `reconstruction + bound_decay * penalty`, and lets the optimizer move the
//! bounds. Constant bounds are left untouched by construction.

use std::path::{Path, PathBuf};
use std::time::Instant;

use burn::grad_clipping::GradientClippingConfig;
use burn::optim::{AdamWConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

use crate::model::Clip;
use crate::training::checkpoint::{save_checkpoint, CheckpointMeta};
use crate::training::loss::{bound_penalty, reconstruction_loss};
use crate::training::metrics::{ClipMetrics, MetricsHistory};

/// One batch of range-fitting data.
#[derive(Debug, Clone)]
pub struct ClipBatch<B: Backend, const D: usize> {
    pub input: Tensor<B, D>,
    /// What the clipped input should reproduce.
    pub target: Tensor<B, D>,
}

impl<B: Backend, const D: usize> ClipBatch<B, D> {
    /// Batch whose target is the unclipped input (activation range calibration).
    pub fn reconstruct(input: Tensor<B, D>) -> Self {
        Self {
            target: input.clone(),
            input,
        }
    }
}

/// Configuration for clip range fitting.
#[derive(Config, Debug)]
pub struct ClipTrainingConfig {
    /// Peak learning rate for AdamW.
    #[config(default = 1e-2)]
    pub lr: f64,
    /// AdamW decoupled weight decay. The PACT penalty is `bound_decay`.
    #[config(default = 0.0)]
    pub weight_decay: f64,
    /// Maximum gradient norm for clipping.
    #[config(default = 1.0)]
    pub max_grad_norm: f64,
    /// Total number of training steps.
    #[config(default = 500)]
    pub total_steps: usize,
    /// Number of linear warmup steps.
    #[config(default = 0)]
    pub warmup_steps: usize,
    /// Weight of the L2 penalty on trainable bounds.
    #[config(default = 1e-3)]
    pub bound_decay: f64,
    /// Steps between metric logging. 0 disables logging and history.
    #[config(default = 50)]
    pub log_interval: usize,
    /// Steps between checkpoint saves. 0 saves only the final checkpoint.
    #[config(default = 0)]
    pub checkpoint_interval: usize,
    /// Checkpoint directory. No checkpoints are written when unset.
    #[config(default = "None")]
    pub checkpoint_dir: Option<String>,
}

/// Result of [`train`].
#[derive(Debug)]
pub struct ClipTrainingOutput<B: Backend, const D: usize> {
    pub clip: Clip<B, D>,
    pub history: MetricsHistory,
    pub trained_steps: u64,
    pub skipped_steps: u64,
}

/// Learning rate at `step`: linear warmup to `base_lr`, then cosine decay to 0.
pub fn lr_schedule(base_lr: f64, warmup_steps: usize, total_steps: usize, step: usize) -> f64 {
    if step < warmup_steps {
        return base_lr * (step + 1) as f64 / warmup_steps as f64;
    }
    let span = total_steps.saturating_sub(warmup_steps).max(1) as f64;
    let progress = ((step - warmup_steps) as f64 / span).min(1.0);
    0.5 * base_lr * (1.0 + (std::f64::consts::PI * progress).cos())
}

/// Per-interval accumulator for metrics.
struct RunningAvg {
    sum: ClipMetrics,
    count: usize,
}

impl RunningAvg {
    fn new() -> Self {
        Self {
            sum: ClipMetrics {
                loss: 0.0,
                reconstruction: 0.0,
                clipped_low: 0.0,
                clipped_high: 0.0,
                lower_mean: 0.0,
                upper_mean: 0.0,
            },
            count: 0,
        }
    }

    fn update(&mut self, m: &ClipMetrics) {
        self.sum.loss += m.loss;
        self.sum.reconstruction += m.reconstruction;
        self.sum.clipped_low += m.clipped_low;
        self.sum.clipped_high += m.clipped_high;
        self.sum.lower_mean += m.lower_mean;
        self.sum.upper_mean += m.upper_mean;
        self.count += 1;
    }

    fn average(&self) -> Option<ClipMetrics> {
        if self.count == 0 {
            return None;
        }
        let n = self.count as f64;
        Some(ClipMetrics {
            loss: self.sum.loss / n,
            reconstruction: self.sum.reconstruction / n,
            clipped_low: self.sum.clipped_low / n,
            clipped_high: self.sum.clipped_high / n,
            lower_mean: self.sum.lower_mean / n,
            upper_mean: self.sum.upper_mean / n,
        })
    }
}

fn bound_means<B: Backend, const D: usize>(clip: &Clip<B, D>) -> (f64, f64) {
    (
        clip.lower_value().mean().into_scalar().elem(),
        clip.upper_value().mean().into_scalar().elem(),
    )
}

/// Fit the trainable bounds of `clip`.
///
/// `sample_fn(step)` supplies each batch; a sampler error skips that step. The
/// module must have at least one trainable bound.
///
/// # Returns
/// The fitted module with its metrics history and step counters.
pub fn train<B: AutodiffBackend, const D: usize>(
    config: &ClipTrainingConfig,
    mut clip: Clip<B, D>,
    sample_fn: &mut dyn FnMut(usize) -> anyhow::Result<ClipBatch<B, D>>,
) -> anyhow::Result<ClipTrainingOutput<B, D>> {
    if clip.num_params() == 0 {
        anyhow::bail!("clip module has no trainable bounds (set learn_min or learn_max)");
    }

    let mut optimizer = AdamWConfig::new()
        .with_weight_decay(config.weight_decay as f32)
        .with_grad_clipping(Some(GradientClippingConfig::Norm(
            config.max_grad_norm as f32,
        )))
        .init();

    let checkpoint_dir = config.checkpoint_dir.as_ref().map(PathBuf::from);
    let mut history = MetricsHistory::new();
    let mut running = RunningAvg::new();
    let train_start = Instant::now();
    let mut trained_steps: u64 = 0;
    let mut skipped_steps: u64 = 0;

    tracing::info!(
        total_steps = config.total_steps,
        learn_min = clip.lower().is_trainable(),
        learn_max = clip.upper().is_trainable(),
        bound_decay = config.bound_decay,
        "Starting clip range fitting"
    );

    for step in 0..config.total_steps {
        let lr = lr_schedule(config.lr, config.warmup_steps, config.total_steps, step);

        let batch = match sample_fn(step) {
            Ok(batch) => batch,
            Err(e) => {
                skipped_steps += 1;
                tracing::warn!(step, skipped_steps, "Step skipped (sampling failed): {e}");
                continue;
            }
        };
        trained_steps += 1;

        let output = clip.forward(batch.input.clone());
        let reconstruction = reconstruction_loss(output, batch.target);
        let penalty = bound_penalty(&clip);

        let reconstruction_val: f64 = reconstruction.clone().into_scalar().elem();
        let loss = reconstruction + penalty * config.bound_decay;
        let loss_val: f64 = loss.clone().into_scalar().elem();

        running.update(&ClipMetrics::compute(
            &batch.input,
            &clip,
            loss_val,
            reconstruction_val,
        ));

        let grads = GradientsParams::from_grads(loss.backward(), &clip);
        clip = optimizer.step(lr, clip, grads);

        let done = step + 1;
        if config.log_interval > 0 && done % config.log_interval == 0 {
            if let Some(avg) = running.average() {
                let warnings = avg.health_check();
                if !warnings.is_empty() {
                    tracing::warn!(step = done, "Health check warnings: {:?}", warnings);
                }
                tracing::info!(
                    step = done,
                    lr = %format!("{lr:.2e}"),
                    loss = %format!("{:.5}", avg.loss),
                    clipped = %format!("{:.1}%", avg.clipped_fraction() * 100.0),
                    lower = %format!("{:.4}", avg.lower_mean),
                    upper = %format!("{:.4}", avg.upper_mean),
                    "avg({})",
                    running.count
                );
                history.push(done, avg);
            }
            running = RunningAvg::new();
        }

        if let Some(dir) = &checkpoint_dir {
            if config.checkpoint_interval > 0 && done % config.checkpoint_interval == 0 {
                let (lower_mean, upper_mean) = bound_means(&clip);
                let meta = CheckpointMeta {
                    step: done,
                    trained_steps,
                    skipped_steps,
                    lower_mean,
                    upper_mean,
                    learn_min: clip.lower().is_trainable(),
                    learn_max: clip.upper().is_trainable(),
                };
                save_checkpoint(&dir.join(format!("step_{done}")), &clip, &meta)?;
            }
        }
    }

    let (lower_mean, upper_mean) = bound_means(&clip);
    tracing::info!(
        trained_steps,
        skipped_steps,
        lower = lower_mean,
        upper = upper_mean,
        elapsed_secs = %format!("{:.1}", train_start.elapsed().as_secs_f64()),
        "Clip range fitting finished"
    );
    if trained_steps == 0 && config.total_steps > 0 {
        tracing::warn!("Every step was skipped; bounds are unchanged");
    }

    if let Some(dir) = &checkpoint_dir {
        let meta = CheckpointMeta {
            step: config.total_steps,
            trained_steps,
            skipped_steps,
            lower_mean,
            upper_mean,
            learn_min: clip.lower().is_trainable(),
            learn_max: clip.upper().is_trainable(),
        };
        save_checkpoint(&final_dir(dir), &clip, &meta)?;
    }

    Ok(ClipTrainingOutput {
        clip,
        history,
        trained_steps,
        skipped_steps,
    })
}

/// Directory of the checkpoint written at the end of [`train`].
pub fn final_dir(checkpoint_dir: &Path) -> PathBuf {
    checkpoint_dir.join("final")
}
