//! In-memory stroke dataset and batcher.

use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    prelude::*,
};

use super::DfdnBatch;
use crate::{
    config::DfdnConfig,
    error::{DfdnError, DfdnResult},
};

/// One preprocessed image with its class index.
#[derive(Debug, Clone)]
pub struct StrokeItem {
    /// Pixels in `[C, H, W]` order.
    pub image: Vec<f32>,
    /// `[C, H, W]`
    pub shape: [usize; 3],
    /// Class index, see [StrokeClass](crate::config::StrokeClass).
    pub label: usize,
    /// Loss weight attached by [StrokeDataset::with_class_weights].
    pub weight: Option<f32>,
}

impl StrokeItem {
    pub fn new(image: Vec<f32>, shape: [usize; 3], label: usize) -> Self {
        Self {
            image,
            shape,
            label,
            weight: None,
        }
    }
}

/// Class-balanced loss weights.
pub struct ClassWeights;

impl ClassWeights {
    /// `w_c = N / (K · count(c))` for every class `c < num_classes`.
    ///
    /// Classes that never occur get weight zero.
    pub fn balanced(labels: &[usize], num_classes: usize) -> Vec<f32> {
        let mut counts = vec![0usize; num_classes];
        for &label in labels {
            if let Some(count) = counts.get_mut(label) {
                *count += 1;
            }
        }

        let total = labels.len() as f32;
        counts
            .into_iter()
            .map(|count| {
                if count == 0 {
                    0.0
                } else {
                    total / (num_classes as f32 * count as f32)
                }
            })
            .collect()
    }
}

/// Images kept in memory, all with the same shape.
#[derive(Debug, Clone)]
pub struct StrokeDataset {
    items: Vec<StrokeItem>,
}

impl StrokeDataset {
    /// # Errors
    ///
    /// Returns `Err(DfdnError::Dataset)` for an empty item list, items with
    /// differing shapes, or pixel buffers that do not match their shape.
    pub fn new(items: Vec<StrokeItem>) -> DfdnResult<Self> {
        let Some(first) = items.first() else {
            return Err(DfdnError::Dataset {
                message: "dataset contains no images".to_owned(),
            });
        };
        let shape = first.shape;

        for (index, item) in items.iter().enumerate() {
            if item.shape != shape {
                return Err(DfdnError::Dataset {
                    message: format!(
                        "item {index} has shape {:?}, expected {shape:?}",
                        item.shape
                    ),
                });
            }
            if item.image.len() != shape.iter().product::<usize>() {
                return Err(DfdnError::Dataset {
                    message: format!(
                        "item {index} holds {} values, shape {shape:?} needs {}",
                        item.image.len(),
                        shape.iter().product::<usize>()
                    ),
                });
            }
        }

        Ok(Self { items })
    }

    /// Shape `[C, H, W]` shared by every item.
    pub fn shape(&self) -> [usize; 3] {
        self.items.first().map_or([0; 3], |item| item.shape)
    }

    pub fn labels(&self) -> Vec<usize> {
        self.items.iter().map(|item| item.label).collect()
    }

    /// Check the dataset against the input shape and class count of a model.
    ///
    /// # Errors
    ///
    /// Returns `Err(DfdnError::Dataset)` describing the first mismatch.
    pub fn check_config(&self, config: &DfdnConfig) -> DfdnResult<()> {
        let expected = [
            config.in_channels,
            config.input_size[0],
            config.input_size[1],
        ];
        if self.shape() != expected {
            return Err(DfdnError::Dataset {
                message: format!(
                    "images have shape {:?}, the model expects {expected:?}",
                    self.shape()
                ),
            });
        }
        if let Some(item) = self.items.iter().find(|item| item.label >= config.num_classes) {
            return Err(DfdnError::Dataset {
                message: format!(
                    "label {} is out of range for {} classes",
                    item.label, config.num_classes
                ),
            });
        }
        Ok(())
    }

    /// Attach class-balanced weights to every item.
    #[must_use]
    pub fn with_class_weights(mut self, num_classes: usize) -> Self {
        let weights = ClassWeights::balanced(&self.labels(), num_classes);
        for item in &mut self.items {
            item.weight = weights.get(item.label).copied();
        }
        self
    }

    /// Remove any attached weights.
    #[must_use]
    pub fn without_weights(mut self) -> Self {
        for item in &mut self.items {
            item.weight = None;
        }
        self
    }
}

impl Dataset<StrokeItem> for StrokeDataset {
    fn get(&self, index: usize) -> Option<StrokeItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// Stacks [StrokeItem]s into a [DfdnBatch].
///
/// Weights are batched only when every item carries one.
#[derive(Clone, Debug)]
pub struct StrokeBatcher {
    num_classes: usize,
}

impl StrokeBatcher {
    pub const fn new(num_classes: usize) -> Self {
        Self { num_classes }
    }
}

impl<B: Backend> Batcher<B, StrokeItem, DfdnBatch<B>> for StrokeBatcher {
    fn batch(&self, items: Vec<StrokeItem>, device: &B::Device) -> DfdnBatch<B> {
        let batch_size = items.len();

        let mut images = Vec::with_capacity(batch_size);
        let mut one_hot = vec![0.0f32; batch_size * self.num_classes];
        let mut targets = Vec::with_capacity(batch_size);
        let mut weights = Vec::with_capacity(batch_size);

        for (index, item) in items.into_iter().enumerate() {
            one_hot[index * self.num_classes + item.label] = 1.0;
            targets.push(item.label as i64);
            weights.push(item.weight);
            images.push(Tensor::<B, 3>::from_data(
                TensorData::new(item.image, item.shape).convert::<B::FloatElem>(),
                device,
            ));
        }

        let weights: Option<Vec<f32>> = weights.into_iter().collect();

        DfdnBatch {
            images: Tensor::stack(images, 0),
            labels: Tensor::from_data(
                TensorData::new(one_hot, [batch_size, self.num_classes])
                    .convert::<B::FloatElem>(),
                device,
            ),
            targets: Tensor::from_data(
                TensorData::new(targets, [batch_size]).convert::<B::IntElem>(),
                device,
            ),
            weights: weights.map(|weights| {
                Tensor::from_data(
                    TensorData::new(weights, [batch_size]).convert::<B::FloatElem>(),
                    device,
                )
            }),
        }
    }
}
