//! Learnable clip (clamp) module for quantization-aware training.
//!
//! [`Clip`] bounds a tensor elementwise to `[lower, upper]`, where each bound is a
//! fixed scalar/tensor or a trainable burn `Param`. Trainable bounds are fitted
//! PACT-style by the [`training`] loop, or by any burn optimizer that walks the
//! enclosing model.

pub mod config;
pub mod error;
pub mod functional;
pub mod model;
pub mod training;

pub use error::ClipError;
pub use model::{Clip, ClipBound, ClipConfig};
