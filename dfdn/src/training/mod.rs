//! Training support for DFDN.
//!
//! - `batch`: batch and step output types used by Burn's `TrainStep`/`ValidStep`
//! - `dataset`: in-memory dataset, class weights and the batcher
//! - `images`: image decoding, preprocessing and labelled folder loading
//! - `trainer`: the epoch loop with early stopping and checkpointing

mod batch;
mod dataset;
mod images;
mod trainer;

pub use batch::{DfdnBatch, DfdnStepOutput};
pub use dataset::{ClassWeights, StrokeBatcher, StrokeDataset, StrokeItem};
pub use images::{image_tensor, load_image, load_image_folder, preprocess_image};
pub use trainer::{EpochMetrics, Trainer, TrainingConfig, TrainingHistory};
