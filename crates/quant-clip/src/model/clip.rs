use burn::prelude::*;

use crate::error::ClipError;
use crate::functional::{broadcast_dims, broadcasts_to, clip};
use crate::model::bound::ClipBound;

/// Configuration for a [`Clip`] module with scalar bounds.
///
/// ```text
/// ClipConfig::new(0.0, 6.0)           // ReLU6-style fixed range
/// ClipConfig::new(-1.0, 1.0)
///     .with_learn_min(true)           // lower bound trained, upper fixed
/// ```
#[derive(Config, Debug)]
pub struct ClipConfig {
    /// Lower bound. Initial value of the parameter when `learn_min` is set.
    pub clip_value_min: f64,
    /// Upper bound. Initial value of the parameter when `learn_max` is set.
    pub clip_value_max: f64,
    /// Register the lower bound as a trainable parameter.
    #[config(default = false)]
    pub learn_min: bool,
    /// Register the upper bound as a trainable parameter.
    #[config(default = false)]
    pub learn_max: bool,
}

impl ClipConfig {
    /// Initialize a clip module for inputs of rank `D`.
    ///
    /// No check that `clip_value_min <= clip_value_max`; see [`Clip::check_range`].
    pub fn init<B: Backend, const D: usize>(&self, device: &B::Device) -> Clip<B, D> {
        tracing::debug!(
            min = self.clip_value_min,
            max = self.clip_value_max,
            learn_min = self.learn_min,
            learn_max = self.learn_max,
            "Initialized clip module"
        );
        Clip {
            lower: ClipBound::scalar(self.clip_value_min, self.learn_min, device),
            upper: ClipBound::scalar(self.clip_value_max, self.learn_max, device),
        }
    }
}

/// Elementwise clip with optionally learnable bounds.
///
/// `output = min(max(input, lower), upper)`, bounds broadcast to the input. A
/// trainable bound is a `Param` and joins the enclosing model's parameter set;
/// gradients reach it through the elements pinned to it (see
/// [`functional::clip`](crate::functional::clip)).
#[derive(Module, Debug)]
pub struct Clip<B: Backend, const D: usize> {
    /// Lower bound, shape broadcastable to the input.
    lower: ClipBound<B, D>,
    /// Upper bound, shape broadcastable to the input.
    upper: ClipBound<B, D>,
}

impl<B: Backend, const D: usize> Clip<B, D> {
    /// Build from tensor-valued bounds, e.g. per-channel ranges of shape `[1, C]`.
    pub fn from_tensors(
        clip_value_min: Tensor<B, D>,
        clip_value_max: Tensor<B, D>,
        learn_min: bool,
        learn_max: bool,
    ) -> Self {
        tracing::debug!(
            min_shape = ?clip_value_min.dims(),
            max_shape = ?clip_value_max.dims(),
            learn_min,
            learn_max,
            "Initialized clip module"
        );
        Self {
            lower: ClipBound::new(clip_value_min, learn_min),
            upper: ClipBound::new(clip_value_max, learn_max),
        }
    }

    /// Clip `input` to `[lower, upper]`. Output has the input's shape.
    ///
    /// # Panics
    /// Panics if a bound does not broadcast to the input shape.
    pub fn forward(&self, input: Tensor<B, D>) -> Tensor<B, D> {
        clip(input, self.lower.value(), self.upper.value())
    }

    /// Like [`forward`](Self::forward), but reports incompatible bound shapes as
    /// [`ClipError::IncompatibleShape`] instead of panicking.
    pub fn try_forward(&self, input: Tensor<B, D>) -> crate::error::Result<Tensor<B, D>> {
        let input_dims = input.dims();
        for (name, bound) in [("lower", &self.lower), ("upper", &self.upper)] {
            let bound_dims = bound.dims();
            if !broadcasts_to(bound_dims, input_dims) {
                return Err(ClipError::IncompatibleShape {
                    bound: name,
                    bound_shape: bound_dims.to_vec(),
                    input_shape: input_dims.to_vec(),
                });
            }
        }
        Ok(self.forward(input))
    }

    /// Opt-in check that `lower <= upper` everywhere.
    ///
    /// `forward` accepts inverted ranges (everything maps to `upper`); call this
    /// where a stricter contract is wanted.
    pub fn check_range(&self) -> crate::error::Result<()> {
        let lower_dims = self.lower.dims();
        let upper_dims = self.upper.dims();
        let dims = broadcast_dims(lower_dims, upper_dims).ok_or_else(|| {
            ClipError::BoundShapeMismatch {
                lower_shape: lower_dims.to_vec(),
                upper_shape: upper_dims.to_vec(),
            }
        })?;

        let inverted = self
            .lower
            .value()
            .expand(dims)
            .greater(self.upper.value().expand(dims));
        let count: i64 = inverted.int().sum().into_scalar().elem();
        if count > 0 {
            return Err(ClipError::InvertedRange {
                count: count as usize,
            });
        }
        Ok(())
    }

    pub fn lower(&self) -> &ClipBound<B, D> {
        &self.lower
    }

    pub fn upper(&self) -> &ClipBound<B, D> {
        &self.upper
    }

    pub fn lower_value(&self) -> Tensor<B, D> {
        self.lower.value()
    }

    pub fn upper_value(&self) -> Tensor<B, D> {
        self.upper.value()
    }
}
