//! Pathology heat-maps.
//!
//! The pathology embedding is folded into a `rows × cols` grid and summed
//! over columns, giving one intensity per row. The resulting `1 × rows` strip
//! is resized bilinearly to the original image size and rescaled to `[0, 1]`.

use burn::{
    prelude::*,
    tensor::{
        module::interpolate,
        ops::{InterpolateMode, InterpolateOptions},
    },
};
use burn_extra_ops::min_max_normalize;

use crate::error::{DfdnError, DfdnResult};

/// Configuration of [pathology_heatmap].
#[derive(Config, Debug)]
pub struct HeatmapConfig {
    /// `[rows, cols]`; the product must equal the embedding length.
    #[config(default = "[16, 8]")]
    pub grid: [usize; 2],
}

/// Heat-maps `[batch_size, height, width]` with values in `[0, 1]`.
///
/// # Shapes
///
/// - pathology: `[batch_size, feature_dim]`
/// - output_size: `[height, width]` of the original image
///
/// # Errors
///
/// - `Err(DfdnError::InvalidConfiguration)` if the grid does not cover `feature_dim`
/// - `Err(DfdnError::Analysis)` for an empty output size
pub fn pathology_heatmap<B: Backend>(
    pathology: Tensor<B, 2>,
    output_size: [usize; 2],
    config: &HeatmapConfig,
) -> DfdnResult<Tensor<B, 3>> {
    let [batch_size, features] = pathology.dims();
    let [rows, cols] = config.grid;
    let [height, width] = output_size;

    if rows * cols != features {
        return Err(DfdnError::InvalidConfiguration {
            reason: format!(
                "heat-map grid {rows}x{cols} does not match feature_dim {features}"
            ),
        });
    }
    if height == 0 || width == 0 {
        return Err(DfdnError::Analysis {
            reason: format!("heat-map size {output_size:?} is empty"),
        });
    }

    let strip = pathology
        .reshape([batch_size, rows, cols])
        .sum_dim(2)
        .reshape([batch_size, 1, 1, rows]);
    let resized = interpolate(
        strip,
        [height, width],
        InterpolateOptions::new(InterpolateMode::Bilinear),
    );

    Ok(min_max_normalize(resized.reshape([batch_size, height * width]))
        .reshape([batch_size, height, width]))
}

#[cfg(test)]
mod tests {
    use burn::tensor::{Distribution, Tolerance};

    use super::*;
    use crate::tests::TestBackend;

    #[test]
    fn heatmap_matches_original_size_and_range() {
        let device = Default::default();
        let pathology =
            Tensor::<TestBackend, 2>::random([2, 128], Distribution::Normal(0.0, 1.0), &device);

        let heatmap = pathology_heatmap(pathology, [37, 53], &HeatmapConfig::new()).unwrap();

        assert_eq!(heatmap.dims(), [2, 37, 53]);
        let flat = heatmap.reshape([2, 37 * 53]);
        flat.clone().min_dim(1).into_data().assert_approx_eq::<f32>(
            &TensorData::zeros::<f32, _>([2, 1]),
            Tolerance::absolute(1e-6),
        );
        flat.max_dim(1).into_data().assert_approx_eq::<f32>(
            &TensorData::ones::<f32, _>([2, 1]),
            Tolerance::absolute(1e-6),
        );
    }

    #[test]
    fn heatmap_varies_along_width_only() {
        let device = Default::default();
        let pathology =
            Tensor::<TestBackend, 2>::random([1, 128], Distribution::Normal(0.0, 1.0), &device);

        let heatmap = pathology_heatmap(pathology, [10, 32], &HeatmapConfig::new()).unwrap();

        let first_row = heatmap.clone().slice([0..1, 0..1, 0..32]);
        let last_row = heatmap.slice([0..1, 9..10, 0..32]);
        first_row
            .into_data()
            .assert_approx_eq::<f32>(&last_row.into_data(), Tolerance::default());
    }

    #[test]
    fn constant_features_give_all_zero_heatmap() {
        let device = Default::default();
        let pathology = Tensor::<TestBackend, 2>::ones([1, 128], &device);

        let heatmap = pathology_heatmap(pathology, [8, 8], &HeatmapConfig::new()).unwrap();

        heatmap.into_data().assert_approx_eq::<f32>(
            &TensorData::zeros::<f32, _>([1, 8, 8]),
            Tolerance::default(),
        );
    }

    #[test]
    fn grid_must_cover_feature_dim() {
        let device = Default::default();
        let pathology = Tensor::<TestBackend, 2>::zeros([1, 64], &device);

        assert!(matches!(
            pathology_heatmap(pathology.clone(), [8, 8], &HeatmapConfig::new()),
            Err(DfdnError::InvalidConfiguration { .. })
        ));
        assert!(pathology_heatmap(pathology, [8, 8], &HeatmapConfig::new().with_grid([8, 8])).is_ok());
    }

    #[test]
    fn empty_output_size_is_rejected() {
        let device = Default::default();
        let pathology = Tensor::<TestBackend, 2>::zeros([1, 128], &device);

        assert!(matches!(
            pathology_heatmap(pathology, [0, 16], &HeatmapConfig::new()),
            Err(DfdnError::Analysis { .. })
        ));
    }
}
