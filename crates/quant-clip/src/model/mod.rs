//! Clip module and its bound representation.

pub mod bound;
pub mod clip;

pub use bound::ClipBound;
pub use clip::{Clip, ClipConfig};
