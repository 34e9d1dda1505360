//! Clip range fitting: reconstruction + bound penalty losses, metrics with
//! health checks, checkpoints, and the AdamW training loop.

pub mod checkpoint;
pub mod loss;
pub mod metrics;
pub mod trainer;
