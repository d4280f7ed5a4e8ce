//! Core configuration structures for DFDN.
//!
//! Every hyper-parameter is fixed when the model is built; changing one means
//! building a new model from a new configuration.

use std::path::PathBuf;

use burn::prelude::*;
use resnet::{NUM_FREEZABLE_STAGES, OUTPUT_STRIDE};

use super::enums::{Modality, Precision, ResNetVariant};
use crate::error::{DfdnError, DfdnResult};

/// Main configuration for the DFDN model.
#[derive(Config, Debug)]
pub struct DfdnConfig {
    /// Imaging modality the parameters are trained for.
    #[config(default = "Modality::Ct")]
    pub modality: Modality,
    /// Input height and width.
    #[config(default = "[256, 256]")]
    pub input_size: [usize; 2],
    /// Input channels, 1 (grayscale) or 3.
    #[config(default = 1)]
    pub in_channels: usize,
    /// Width shared by the projection, the positional encoding and all Transformer blocks.
    #[config(default = 256)]
    pub embedding_dim: usize,
    /// Transformer blocks in the backbone encoder.
    #[config(default = 6)]
    pub num_transformer_blocks: usize,
    /// Transformer blocks in each decoder.
    #[config(default = 3)]
    pub num_decoder_blocks: usize,
    /// Attention heads per block.
    #[config(default = 8)]
    pub num_heads: usize,
    /// Hidden width of the feed-forward sub-layer.
    #[config(default = 512)]
    pub mlp_units: usize,
    #[config(default = 0.1)]
    pub dropout_rate: f64,
    /// Length of the pathology and physiology embeddings.
    #[config(default = 128)]
    pub feature_dim: usize,
    #[config(default = 3)]
    pub num_classes: usize,
    /// Convolutional feature extractor.
    #[config(default = "BackboneConfig::new()")]
    pub backbone: BackboneConfig,
    /// Loss weighting.
    #[config(default = "DfdnLossConfig::new()")]
    pub loss: DfdnLossConfig,
    /// Precision and execution mode.
    #[config(default = "ExecutionConfig::new()")]
    pub execution: ExecutionConfig,
}

/// Backbone network configuration.
#[derive(Config, Debug)]
pub struct BackboneConfig {
    #[config(default = "ResNetVariant::ResNet50")]
    pub variant: ResNetVariant,
    /// Leading parts excluded from training: the stem, then stages one to four.
    #[config(default = 3)]
    pub frozen_stages: usize,
    /// Torchvision state dict to initialise from. Requires the `pretrained` feature.
    #[config(default = "None")]
    pub weights: Option<PathBuf>,
}

/// Weights and numerical guards of the combined loss.
#[derive(Config, Debug)]
pub struct DfdnLossConfig {
    /// Divides the pathology/physiology similarity matrix.
    #[config(default = 0.07)]
    pub temperature: f64,
    #[config(default = 0.01)]
    pub contrastive_weight: f64,
    #[config(default = 0.01)]
    pub ortho_weight: f64,
    /// Label smoothing of the classification term.
    #[config(default = 0.1)]
    pub label_smoothing: f64,
    /// Auxiliary terms are clipped to `[-clip_bound, clip_bound]` before weighting.
    #[config(default = 1e6)]
    pub clip_bound: f64,
}

/// Execution mode of a model instance.
#[derive(Config, Debug)]
pub struct ExecutionConfig {
    /// Precision used when writing checkpoints.
    #[config(default = "Precision::F32")]
    pub precision: Precision,
    /// Expect a kernel-fusing backend. Fusion itself is selected by the backend type.
    #[config(default = false)]
    pub fused_compile: bool,
}

impl DfdnConfig {
    /// Sequence length produced by the encoder for the configured input size.
    #[must_use]
    pub const fn sequence_len(&self) -> usize {
        self.input_size[0].div_ceil(OUTPUT_STRIDE) * self.input_size[1].div_ceil(OUTPUT_STRIDE)
    }

    /// Check that the configuration describes a buildable network.
    ///
    /// # Errors
    ///
    /// Returns `Err(DfdnError::InvalidConfiguration)` naming the first violated rule.
    pub fn validate(&self) -> DfdnResult<()> {
        let invalid = |reason: String| Err(DfdnError::InvalidConfiguration { reason });

        if self.num_heads == 0 || self.embedding_dim == 0 {
            return invalid(format!(
                "embedding_dim ({}) and num_heads ({}) must be positive",
                self.embedding_dim, self.num_heads
            ));
        }
        if self.embedding_dim % self.num_heads != 0 {
            return invalid(format!(
                "embedding_dim ({}) must be divisible by num_heads ({})",
                self.embedding_dim, self.num_heads
            ));
        }
        if self.input_size.iter().any(|&side| side < OUTPUT_STRIDE) {
            return invalid(format!(
                "input_size {:?} must be at least {OUTPUT_STRIDE} pixels per side",
                self.input_size
            ));
        }
        if self.in_channels != 1 && self.in_channels != 3 {
            return invalid(format!(
                "in_channels must be 1 or 3, got {}",
                self.in_channels
            ));
        }
        if self.num_transformer_blocks == 0 || self.num_decoder_blocks == 0 {
            return invalid("encoder and decoders need at least one Transformer block".to_owned());
        }
        if self.num_decoder_blocks > self.num_transformer_blocks {
            return invalid(format!(
                "decoders ({}) must not be deeper than the encoder ({})",
                self.num_decoder_blocks, self.num_transformer_blocks
            ));
        }
        if self.mlp_units == 0 || self.feature_dim == 0 {
            return invalid("mlp_units and feature_dim must be positive".to_owned());
        }
        if self.num_classes < 2 {
            return invalid(format!(
                "num_classes must be at least 2, got {}",
                self.num_classes
            ));
        }
        if !(0.0..1.0).contains(&self.dropout_rate) {
            return invalid(format!(
                "dropout_rate must lie in [0, 1), got {}",
                self.dropout_rate
            ));
        }
        if self.backbone.frozen_stages > NUM_FREEZABLE_STAGES {
            return invalid(format!(
                "frozen_stages must be at most {NUM_FREEZABLE_STAGES}, got {}",
                self.backbone.frozen_stages
            ));
        }

        self.loss.validate()
    }

    /// Whether two configurations produce interchangeable parameter records.
    #[must_use]
    pub fn same_architecture(&self, other: &Self) -> bool {
        self.in_channels == other.in_channels
            && self.embedding_dim == other.embedding_dim
            && self.num_transformer_blocks == other.num_transformer_blocks
            && self.num_decoder_blocks == other.num_decoder_blocks
            && self.num_heads == other.num_heads
            && self.mlp_units == other.mlp_units
            && self.feature_dim == other.feature_dim
            && self.num_classes == other.num_classes
            && self.backbone.variant == other.backbone.variant
    }
}

impl DfdnLossConfig {
    /// # Errors
    ///
    /// Returns `Err(DfdnError::InvalidConfiguration)` for a non-positive temperature or
    /// clip bound, negative weights or a smoothing factor outside `[0, 1)`.
    pub fn validate(&self) -> DfdnResult<()> {
        if self.temperature <= 0.0 {
            return Err(DfdnError::InvalidConfiguration {
                reason: format!("temperature must be positive, got {}", self.temperature),
            });
        }
        if self.contrastive_weight < 0.0 || self.ortho_weight < 0.0 {
            return Err(DfdnError::InvalidConfiguration {
                reason: "loss weights must not be negative".to_owned(),
            });
        }
        if !(0.0..1.0).contains(&self.label_smoothing) {
            return Err(DfdnError::InvalidConfiguration {
                reason: format!(
                    "label_smoothing must lie in [0, 1), got {}",
                    self.label_smoothing
                ),
            });
        }
        if self.clip_bound <= 0.0 {
            return Err(DfdnError::InvalidConfiguration {
                reason: format!("clip_bound must be positive, got {}", self.clip_bound),
            });
        }
        Ok(())
    }
}
