//! Image decoding and preprocessing.
//!
//! Slices are converted to grayscale, resized with a bilinear (triangle)
//! filter to the model input size and min-max rescaled to `[0, 1]` per image.

use std::path::Path;

use burn::prelude::*;
use image::{imageops, DynamicImage};
use walkdir::WalkDir;

use super::{StrokeDataset, StrokeItem};
use crate::{
    config::{DfdnConfig, StrokeClass},
    error::{DfdnError, DfdnResult},
};

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Grayscale, resize to `[height, width]` and rescale to `[0, 1]`.
///
/// A constant image becomes all zeros.
pub fn preprocess_image(image: &DynamicImage, [height, width]: [usize; 2]) -> Vec<f32> {
    let gray = image.to_luma32f();
    let resized = imageops::resize(
        &gray,
        width as u32,
        height as u32,
        imageops::FilterType::Triangle,
    );
    let mut pixels = resized.into_raw();

    let (min, max) = pixels
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = max - min;
    for value in &mut pixels {
        *value = if range > 0.0 {
            (*value - min) / range
        } else {
            0.0
        };
    }
    pixels
}

/// Read and preprocess one image for `config`, replicating the gray channel
/// when the model takes three channels.
///
/// # Errors
///
/// Returns `Err(DfdnError::Dataset)` if the file cannot be decoded.
pub fn load_image(path: impl AsRef<Path>, config: &DfdnConfig) -> DfdnResult<Vec<f32>> {
    let path = path.as_ref();
    let image = image::open(path).map_err(|e| DfdnError::Dataset {
        message: format!("failed to open image at {}: {e}", path.display()),
    })?;

    let gray = preprocess_image(&image, config.input_size);
    Ok(gray.repeat(config.in_channels))
}

/// `[1, C, H, W]` tensor from preprocessed pixels.
pub fn image_tensor<B: Backend>(pixels: Vec<f32>, shape: [usize; 3], device: &B::Device) -> Tensor<B, 4> {
    let [channels, height, width] = shape;
    Tensor::from_data(
        TensorData::new(pixels, [1, channels, height, width]).convert::<B::FloatElem>(),
        device,
    )
}

/// Load a labelled image folder.
///
/// `root` holds one sub-directory per class (`normal`, `ischemic`,
/// `hemorrhagic`) with PNG or JPEG slices. Files are visited in name order.
///
/// # Errors
///
/// Returns `Err(DfdnError::Dataset)` if an image cannot be decoded or no
/// image is found at all.
pub fn load_image_folder(root: impl AsRef<Path>, config: &DfdnConfig) -> DfdnResult<StrokeDataset> {
    let root = root.as_ref();
    let shape = [config.in_channels, config.input_size[0], config.input_size[1]];
    let mut items = Vec::new();

    for class in StrokeClass::ALL.into_iter().take(config.num_classes) {
        let dir = root.join(class.folder());
        if !dir.is_dir() {
            tracing::warn!(path = %dir.display(), "class directory missing");
            continue;
        }

        let before = items.len();
        for entry in WalkDir::new(&dir).sort_by_file_name() {
            let entry = entry.map_err(|e| DfdnError::Dataset {
                message: format!("failed to read {}: {e}", dir.display()),
            })?;
            if !entry.file_type().is_file() || !has_image_extension(entry.path()) {
                continue;
            }
            let pixels = load_image(entry.path(), config)?;
            items.push(StrokeItem::new(pixels, shape, class.index()));
        }

        tracing::debug!(
            class = class.label(),
            images = items.len() - before,
            "loaded class directory"
        );
    }

    if items.is_empty() {
        return Err(DfdnError::Dataset {
            message: format!("no images found under {}", root.display()),
        });
    }
    tracing::info!(path = %root.display(), images = items.len(), "dataset loaded");

    StrokeDataset::new(items)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}
