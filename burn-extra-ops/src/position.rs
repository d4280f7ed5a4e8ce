//! Fixed sinusoidal position encodings.

use burn::prelude::*;

/// Base of the geometric wavelength progression.
const WAVELENGTH_BASE: f64 = 10_000.0;

/// Sinusoidal position encoding of shape `[1, seq_len, dim]`.
///
/// Position `p` at channel `d` is encoded as `sin(p / 10000^(2⌊d/2⌋/dim))` for
/// even `d` and the matching cosine for odd `d`. The table is rebuilt on every
/// call so the sequence length may vary with the input resolution, and it is
/// converted to the backend float type so it can be added to activations of
/// any precision.
pub fn sinusoidal_position_encoding<B: Backend>(
    seq_len: usize,
    dim: usize,
    device: &B::Device,
) -> Tensor<B, 3> {
    let mut values = Vec::with_capacity(seq_len * dim);

    for position in 0..seq_len {
        for channel in 0..dim {
            let exponent = (2 * (channel / 2)) as f64 / dim as f64;
            let angle = position as f64 / WAVELENGTH_BASE.powf(exponent);
            let value = if channel % 2 == 0 {
                angle.sin()
            } else {
                angle.cos()
            };
            values.push(value as f32);
        }
    }

    let data = TensorData::new(values, [1, seq_len, dim]).convert::<B::FloatElem>();
    Tensor::from_data(data, device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{backend::NdArray, tensor::Tolerance};

    type TestBackend = NdArray<f32>;

    #[test]
    fn position_encoding_has_batch_axis_of_one() {
        let device = Default::default();
        let encoding = sinusoidal_position_encoding::<TestBackend>(64, 256, &device);

        assert_eq!(encoding.dims(), [1, 64, 256]);
    }

    #[test]
    fn position_encoding_first_row_alternates_zero_and_one() {
        let device = Default::default();
        let encoding = sinusoidal_position_encoding::<TestBackend>(1, 6, &device);

        encoding.into_data().assert_approx_eq::<f32>(
            &TensorData::from([[[0.0, 1.0, 0.0, 1.0, 0.0, 1.0]]]),
            Tolerance::default(),
        );
    }

    #[test]
    fn position_encoding_pairs_share_frequency() {
        let device = Default::default();
        let encoding = sinusoidal_position_encoding::<TestBackend>(3, 4, &device);

        // Channels 2 and 3 use wavelength 10000^(2/4) = 100.
        let expected = [
            [0.0, 1.0, 0.0, 1.0],
            [
                1.0f32.sin(),
                1.0f32.cos(),
                (1.0f32 / 100.0).sin(),
                (1.0f32 / 100.0).cos(),
            ],
            [
                2.0f32.sin(),
                2.0f32.cos(),
                (2.0f32 / 100.0).sin(),
                (2.0f32 / 100.0).cos(),
            ],
        ];

        encoding
            .into_data()
            .assert_approx_eq::<f32>(&TensorData::from([expected]), Tolerance::default());
    }

    #[test]
    fn position_encoding_is_bounded() {
        let device = Default::default();
        let encoding = sinusoidal_position_encoding::<TestBackend>(49, 32, &device);

        let max = encoding.clone().max().into_scalar();
        let min = encoding.min().into_scalar();
        assert!(max <= 1.0);
        assert!(min >= -1.0);
    }
}
