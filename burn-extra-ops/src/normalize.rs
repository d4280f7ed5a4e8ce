//! Normalisation helpers.

use burn::prelude::*;

/// Lower bound applied to the squared norm before the square root.
pub const L2_NORM_EPSILON: f64 = 1e-12;

/// L2-normalise `tensor` along `dim`.
///
/// Computes `x / sqrt(max(sum(x²), 1e-12))`, so an all-zero slice stays zero
/// instead of producing NaN.
pub fn l2_normalize<B: Backend, const D: usize>(tensor: Tensor<B, D>, dim: usize) -> Tensor<B, D> {
    let norm = tensor
        .clone()
        .powf_scalar(2.0)
        .sum_dim(dim)
        .clamp_min(L2_NORM_EPSILON)
        .sqrt();

    tensor / norm
}

/// Min-max rescale every slice along the last dimension to `[0, 1]`.
///
/// The extreme entries of a non-constant slice map exactly to `0` and `1`.
/// Constant slices map to all zeros.
pub fn min_max_normalize<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Tensor<B, D> {
    let last = D - 1;
    let min = tensor.clone().min_dim(last);
    let max = tensor.clone().max_dim(last);

    let range = max - min.clone();
    let flat = range.clone().lower_equal_elem(0.0);
    let range = range.mask_fill(flat, 1.0);

    (tensor - min) / range
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{
        backend::NdArray,
        tensor::{Distribution, Tolerance},
    };

    type TestBackend = NdArray<f32>;

    #[test]
    fn l2_normalize_rows_have_unit_norm() {
        let device = Default::default();
        let input =
            Tensor::<TestBackend, 2>::random([4, 16], Distribution::Normal(0.0, 3.0), &device);

        let norms = l2_normalize(input, 1).powf_scalar(2.0).sum_dim(1).sqrt();

        norms
            .into_data()
            .assert_approx_eq::<f32>(&TensorData::from([[1.0], [1.0], [1.0], [1.0]]), Tolerance::default());
    }

    #[test]
    fn l2_normalize_zero_row_stays_zero() {
        let device = Default::default();
        let input = Tensor::<TestBackend, 2>::zeros([1, 8], &device);

        let output = l2_normalize(input, 1);

        output
            .into_data()
            .assert_eq(&TensorData::from([[0.0f32; 8]]), false);
    }

    #[test]
    fn min_max_normalize_maps_extremes_to_unit_interval() {
        let device = Default::default();
        let input = Tensor::<TestBackend, 2>::from_data(
            TensorData::from([[2.0, 4.0, 3.0, 6.0], [-1.0, -1.0, -1.0, -1.0]]),
            &device,
        );

        let output = min_max_normalize(input);

        output.into_data().assert_approx_eq::<f32>(
            &TensorData::from([[0.0, 0.5, 0.25, 1.0], [0.0, 0.0, 0.0, 0.0]]),
            Tolerance::default(),
        );
    }

    #[test]
    fn min_max_normalize_hits_exact_bounds() {
        let device = Default::default();
        let input =
            Tensor::<TestBackend, 2>::random([3, 50], Distribution::Normal(5.0, 2.0), &device);

        let output = min_max_normalize(input);

        assert_eq!(output.clone().min().into_scalar(), 0.0);
        assert_eq!(output.max().into_scalar(), 1.0);
    }
}
