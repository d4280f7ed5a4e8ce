use burn::prelude::*;

/// Replace NaN entries with zero, leaving every other value untouched.
///
/// Masked entries receive a zero gradient.
pub fn nan_to_zero<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Tensor<B, D> {
    let mask = tensor.clone().is_nan();
    tensor.mask_fill(mask, 0.0)
}
