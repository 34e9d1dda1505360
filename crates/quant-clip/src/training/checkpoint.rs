//! Clip module checkpoints: a burn named-MessagePack record plus `meta.json`.
//!
//! Only trainable bounds are written to the record. Constant bounds come back
//! from whatever module the record is loaded into.

use std::path::Path;

use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};

use crate::model::{Clip, ClipConfig};

/// Metadata saved alongside each checkpoint.
#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, PartialEq)]
pub struct CheckpointMeta {
    pub step: usize,
    pub trained_steps: u64,
    pub skipped_steps: u64,
    pub lower_mean: f64,
    pub upper_mean: f64,
    /// Trainability of each bound. The record only holds trainable bounds, so a
    /// module can only load it if these match.
    pub learn_min: bool,
    pub learn_max: bool,
}

impl CheckpointMeta {
    fn check_layout<B: Backend, const D: usize>(&self, clip: &Clip<B, D>) -> anyhow::Result<()> {
        let (learn_min, learn_max) = (clip.lower().is_trainable(), clip.upper().is_trainable());
        if (self.learn_min, self.learn_max) != (learn_min, learn_max) {
            anyhow::bail!(
                "checkpoint layout (learn_min={}, learn_max={}) does not match module \
                 (learn_min={learn_min}, learn_max={learn_max})",
                self.learn_min,
                self.learn_max
            );
        }
        Ok(())
    }
}

/// Write `{dir}/model.mpk` and `{dir}/meta.json`, creating `dir` if needed.
pub fn save_checkpoint<B: Backend, const D: usize>(
    dir: &Path,
    clip: &Clip<B, D>,
    meta: &CheckpointMeta,
) -> anyhow::Result<()> {
    meta.check_layout(clip)?;
    std::fs::create_dir_all(dir)?;
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();

    clip.clone()
        .save_file(dir.join("model"), &recorder)
        .map_err(|e| anyhow::anyhow!("Failed to save clip module to {}: {e}", dir.display()))?;

    let meta_path = dir.join("meta.json");
    serde_json::to_writer_pretty(std::fs::File::create(&meta_path)?, meta)?;

    tracing::info!(dir = %dir.display(), step = meta.step, "Checkpoint saved (model + meta)");
    Ok(())
}

/// Read `{dir}/meta.json`.
pub fn load_meta(dir: &Path) -> anyhow::Result<CheckpointMeta> {
    let meta_path = dir.join("meta.json");
    let file = std::fs::File::open(&meta_path)
        .map_err(|e| anyhow::anyhow!("Failed to open {}: {e}", meta_path.display()))?;
    serde_json::from_reader(file)
        .map_err(|e| anyhow::anyhow!("Failed to parse {}: {e}", meta_path.display()))
}

/// Load saved bound values into an existing module of the same layout.
///
/// Fails if the module's trainable bounds differ from the saved ones.
pub fn load_checkpoint<B: Backend, const D: usize>(
    clip: Clip<B, D>,
    dir: &Path,
    device: &B::Device,
) -> anyhow::Result<Clip<B, D>> {
    load_meta(dir)?
        .check_layout(&clip)
        .map_err(|e| anyhow::anyhow!("Cannot load checkpoint from {}: {e}", dir.display()))?;
    clip.load_file(
        dir.join("model"),
        &NamedMpkFileRecorder::<FullPrecisionSettings>::new(),
        device,
    )
    .map_err(|e| anyhow::anyhow!("Failed to load checkpoint from {}: {e}", dir.display()))
}

/// Create a fresh module from config, then load saved weights on top.
pub fn load_clip<B: Backend, const D: usize>(
    dir: &Path,
    config: &ClipConfig,
    device: &B::Device,
) -> anyhow::Result<Clip<B, D>> {
    load_checkpoint(config.init::<B, D>(device), dir, device)
}
