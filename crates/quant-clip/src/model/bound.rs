use burn::module::Param;
use burn::prelude::*;

/// One side of a clip range: a fixed tensor or a trainable parameter.
///
/// Both variants hold a tensor with the input's rank whose shape broadcasts onto
/// the input (`[1; D]` for a scalar bound). Only `Trainable` is visited by
/// optimizers, counted by `num_params` and written to records; a `Constant` is
/// carried along but never updated.
///
/// The variant is chosen at construction and no method switches it.
#[derive(Module, Debug)]
pub enum ClipBound<B: Backend, const D: usize> {
    /// Fixed value.
    Constant(Tensor<B, D>),
    /// Value owned by the optimizer of the enclosing training loop.
    Trainable(Param<Tensor<B, D>>),
}

impl<B: Backend, const D: usize> ClipBound<B, D> {
    /// Wrap `value` as a parameter if `trainable`, otherwise keep it constant.
    pub fn new(value: Tensor<B, D>, trainable: bool) -> Self {
        if trainable {
            Self::Trainable(Param::from_tensor(value))
        } else {
            Self::Constant(value)
        }
    }

    /// Scalar bound, stored with shape `[1; D]` so it broadcasts to any input.
    pub fn scalar(value: f64, trainable: bool, device: &B::Device) -> Self {
        Self::new(Tensor::full([1usize; D], value, device), trainable)
    }

    pub fn is_trainable(&self) -> bool {
        matches!(self, Self::Trainable(_))
    }

    /// Current value. For a trainable bound this is on the autodiff graph.
    pub fn value(&self) -> Tensor<B, D> {
        match self {
            Self::Constant(tensor) => tensor.clone(),
            Self::Trainable(param) => param.val(),
        }
    }

    pub fn dims(&self) -> [usize; D] {
        self.value().dims()
    }
}
