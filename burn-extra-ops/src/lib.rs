//! Additional operations for the Burn deep learning framework
//!
//! This crate provides tensor operations used by the DFDN model that are not
//! available in the core Burn framework: sinusoidal position encodings, L2
//! normalisation, NaN masking and row-wise min-max rescaling.

use burn::prelude::*;

mod nan;
mod normalize;
mod position;

pub use nan::nan_to_zero;
pub use normalize::{l2_normalize, min_max_normalize, L2_NORM_EPSILON};
pub use position::sinusoidal_position_encoding;

/// Additional operations for Burn tensors
pub trait TensorExtraOps<B: Backend, const D: usize> {
    /// Divide by the L2 norm along `dim`.
    fn l2_normalize(self, dim: usize) -> Self;

    /// Replace every NaN entry with zero.
    fn nan_to_zero(self) -> Self;

    /// Rescale the last dimension to `[0, 1]`; constant slices become zeros.
    fn min_max_normalize(self) -> Self;
}

impl<B: Backend, const D: usize> TensorExtraOps<B, D> for Tensor<B, D> {
    fn l2_normalize(self, dim: usize) -> Self {
        l2_normalize(self, dim)
    }

    fn nan_to_zero(self) -> Self {
        nan_to_zero(self)
    }

    fn min_max_normalize(self) -> Self {
        min_max_normalize(self)
    }
}
