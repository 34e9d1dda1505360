//! Losses for fitting a clip range.
//!
//! Reconstruction error pulls the bounds outward (less clipping), the L2 bound
//! penalty pulls them toward zero (finer quantization grid). Their balance is the
//! PACT objective.

use burn::nn::loss::{MseLoss, Reduction};
use burn::prelude::*;

use crate::model::Clip;

/// Mean squared error between the clipped output and its target.
///
/// # Returns
/// Scalar loss tensor of shape `(1,)`.
pub fn reconstruction_loss<B: Backend, const D: usize>(
    output: Tensor<B, D>,
    target: Tensor<B, D>,
) -> Tensor<B, 1> {
    MseLoss::new().forward(output, target, Reduction::Mean)
}

/// L2 penalty on the trainable bounds: sum of squares over every element.
///
/// Constant bounds do not contribute. Returns a zero tensor of shape `(1,)` when
/// neither bound is trainable.
pub fn bound_penalty<B: Backend, const D: usize>(clip: &Clip<B, D>) -> Tensor<B, 1> {
    let device = clip.lower_value().device();
    [clip.lower(), clip.upper()]
        .into_iter()
        .filter(|bound| bound.is_trainable())
        .map(|bound| bound.value().powf_scalar(2.0).sum())
        .fold(Tensor::zeros([1], &device), |acc, term| acc + term)
}
