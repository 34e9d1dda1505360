/// Errors from checked clip operations.
///
/// Unchecked paths (`Clip::forward`, `functional::clip`) leave shape failures to
/// burn, which panics.
#[derive(Debug, thiserror::Error)]
pub enum ClipError {
    /// A bound cannot be broadcast onto the tensor it is applied to.
    #[error("{bound} bound of shape {bound_shape:?} does not broadcast to shape {input_shape:?}")]
    IncompatibleShape {
        /// `"lower"` or `"upper"`.
        bound: &'static str,
        bound_shape: Vec<usize>,
        input_shape: Vec<usize>,
    },

    /// The lower and upper bounds cannot be broadcast against each other.
    #[error("lower bound of shape {lower_shape:?} and upper bound of shape {upper_shape:?} do not broadcast together")]
    BoundShapeMismatch {
        lower_shape: Vec<usize>,
        upper_shape: Vec<usize>,
    },

    /// Some element of the lower bound exceeds the matching upper bound.
    #[error("lower bound exceeds upper bound ({count} element(s))")]
    InvertedRange { count: usize },
}

pub type Result<T> = std::result::Result<T, ClipError>;
