//! # DFDN
//!
//! A Burn implementation of the Dynamic Feature Decoupling Network for stroke
//! triage on CT and MRI slices.
//!
//! The network encodes an image with a ResNet backbone followed by a
//! Transformer stack, then decodes the shared representation twice: a
//! pathology embedding feeds the three-way classifier (normal, ischemic,
//! hemorrhagic) and a physiology embedding is kept decorrelated from it by
//! contrastive and orthogonality losses.
//!
//! ## Usage
//!
//! ```no_run
//! use burn::backend::NdArray;
//! use burn::tensor::Tensor;
//! use dfdn_burn::{DfdnConfig, Modality};
//!
//! let device = Default::default();
//! let model = DfdnConfig::new()
//!     .with_modality(Modality::Mri)
//!     .init::<NdArray>(&device)?;
//!
//! let images = Tensor::<NdArray, 4>::zeros([2, 1, 256, 256], &device);
//! let probabilities = model.predict(images)?;
//! # Ok::<(), dfdn_burn::DfdnError>(())
//! ```
//!
//! ## Features
//!
//! - `train` (default): Burn training traits, datasets, image loading and the training loop
//! - `pretrained`: import torchvision ResNet weights into the backbone

pub mod analysis;
mod checkpoint;
pub mod config;
pub mod error;
pub mod losses;
pub mod models;
#[cfg(feature = "train")]
pub mod training;

pub use analysis::{
    ConfidenceLevel, Diagnosis, DiagnosticReport, FeatureAnalysis, HeatmapConfig, TsneConfig,
    TsneProjection,
};
pub use config::{
    BackboneConfig, DfdnConfig, DfdnLossConfig, ExecutionConfig, Modality, Precision,
    ResNetVariant, StrokeClass,
};
pub use checkpoint::checkpoint_path;
pub use error::{DfdnError, DfdnResult};
pub use models::{Dfdn, DfdnOutput, DfdnRecord};
