//! Differentiable clip primitive with tensor bounds.
//!
//! burn's `clamp` takes scalar bounds and passes the boundary gradient to the
//! input. [`clip`] takes broadcastable tensor bounds and follows the PACT
//! convention instead: an element sitting on (or past) a bound sends its gradient
//! to that bound, and the input only receives gradient strictly inside the range.

use burn::prelude::*;

/// Broadcast two shapes of equal rank. Each axis must match or be 1 on one side.
///
/// Returns `None` if the shapes are incompatible.
pub fn broadcast_dims<const D: usize>(a: [usize; D], b: [usize; D]) -> Option<[usize; D]> {
    let mut out = [0; D];
    for (axis, (&x, &y)) in a.iter().zip(b.iter()).enumerate() {
        out[axis] = match (x, y) {
            (x, y) if x == y => x,
            (1, y) => y,
            (x, 1) => x,
            _ => return None,
        };
    }
    Some(out)
}

/// True if a bound of shape `bound` broadcasts onto `input` without growing it.
pub fn broadcasts_to<const D: usize>(bound: [usize; D], input: [usize; D]) -> bool {
    bound.iter().zip(input.iter()).all(|(&b, &i)| b == 1 || b == i)
}

/// Clip `input` elementwise: `min(max(input, min), max)`.
///
/// `min` and `max` are broadcast to the input shape, so scalars (`[1; D]`),
/// per-channel bounds and full tensors all work. Gradients:
/// - input: 1 where `min < x` and `max(x, min) < max`, 0 elsewhere
/// - `min`: 1 where `x <= min` and the element is not upper-clipped
/// - `max`: 1 where `max(x, min) >= max`
///
/// Bound gradients are summed over broadcast axes. With `min > max` every element
/// maps to `max`.
///
/// # Panics
/// Panics if a bound does not broadcast to the input shape. See
/// [`broadcasts_to`] for a non-panicking check.
pub fn clip<B: Backend, const D: usize>(
    input: Tensor<B, D>,
    min: Tensor<B, D>,
    max: Tensor<B, D>,
) -> Tensor<B, D> {
    let dims = input.dims();
    let min = min.expand(dims);
    let max = max.expand(dims);

    // Masks come from detached values; only the selects below carry gradient.
    let x = input.clone().detach();
    let below = x.clone().lower_equal(min.clone().detach());
    let above = x.max_pair(min.clone().detach()).greater_equal(max.clone().detach());

    input.mask_where(below, min).mask_where(above, max)
}
