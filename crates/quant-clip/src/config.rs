//! TOML config loading.
//!
//! Deserializes a file with a `[clip]` section and an optional `[training]`
//! section:
//!
//! ```toml
//! [clip]
//! clip_value_min = 0.0
//! clip_value_max = 6.0
//! learn_min = false
//! learn_max = true
//!
//! [training]
//! lr = 0.01
//! total_steps = 500
//! # ...
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::model::ClipConfig;
use crate::training::trainer::ClipTrainingConfig;

/// Top-level structure of a clip config file.
#[derive(Debug, Deserialize)]
pub struct ClipToml {
    /// Bound values and trainability.
    pub clip: ClipConfig,
    /// Range-fitting hyperparameters, when the bounds are to be trained.
    #[serde(default)]
    pub training: Option<ClipTrainingConfig>,
}

/// Load and deserialize a `ClipToml` from a TOML file.
pub fn load_clip_toml(path: &Path) -> anyhow::Result<ClipToml> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", path.display()))?;
    let config: ClipToml = toml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("Failed to parse {}: {e}", path.display()))?;
    tracing::info!(
        path = %path.display(),
        learn_min = config.clip.learn_min,
        learn_max = config.clip.learn_max,
        training = config.training.is_some(),
        "Loaded clip config"
    );
    Ok(config)
}
