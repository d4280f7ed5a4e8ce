//! Backbone encoder: ResNet features, sequence projection, position encoding
//! and a Transformer stack.

use burn::{
    nn::{Linear, LinearConfig},
    prelude::*,
};
use burn_extra_ops::sinusoidal_position_encoding;
use resnet::{ResNet, ResNetConfig};

use super::transformer::{forward_stack, TransformerBlock, TransformerBlockConfig};
use crate::{config::DfdnConfig, error::DfdnResult};

/// Configuration for a [BackboneEncoder].
#[derive(Config, Debug)]
pub struct BackboneEncoderConfig {
    pub backbone: ResNetConfig,
    pub block: TransformerBlockConfig,
    pub num_blocks: usize,
}

impl BackboneEncoderConfig {
    /// Encoder part of a full model configuration.
    pub fn from_model(config: &DfdnConfig) -> Self {
        Self::new(
            ResNetConfig::new()
                .with_variant(config.backbone.variant.clone())
                .with_frozen_stages(config.backbone.frozen_stages),
            TransformerBlockConfig::new(config.embedding_dim, config.num_heads, config.mlp_units)
                .with_dropout(config.dropout_rate),
            config.num_transformer_blocks,
        )
    }

    /// # Errors
    ///
    /// Returns `Err(DfdnError::InvalidConfiguration)` if the Transformer block is invalid.
    pub fn init<B: Backend>(&self, device: &B::Device) -> DfdnResult<BackboneEncoder<B>> {
        let features = self.backbone.init(device);
        let projection = LinearConfig::new(
            self.backbone.variant.out_channels(),
            self.block.d_model,
        )
        .init(device);

        Ok(BackboneEncoder {
            features,
            projection,
            blocks: self.block.init_stack(self.num_blocks, device)?,
        })
    }
}

/// Turns an image batch into a sequence of contextual embeddings.
#[derive(Module, Debug)]
pub struct BackboneEncoder<B: Backend> {
    pub features: ResNet<B>,
    projection: Linear<B>,
    blocks: Vec<TransformerBlock<B>>,
}

impl<B: Backend> BackboneEncoder<B> {
    /// `[B, C, H, W] -> [B, L, D]` with `L = ⌈H/32⌉·⌈W/32⌉`.
    ///
    /// A single-channel batch is replicated to three channels first.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 3> {
        let images = if images.dims()[1] == 1 {
            images.repeat_dim(1, 3)
        } else {
            images
        };

        let maps = self.features.forward(images);
        let sequence = maps.flatten::<3>(2, 3).swap_dims(1, 2);
        let sequence = self.projection.forward(sequence);

        let [_, seq_len, dim] = sequence.dims();
        let positions = sinusoidal_position_encoding::<B>(seq_len, dim, &sequence.device());

        forward_stack(&self.blocks, sequence + positions)
    }

    /// Replace the convolutional parameters with a torchvision checkpoint.
    ///
    /// Frozen stages stay frozen.
    #[cfg(feature = "pretrained")]
    pub fn load_backbone_weights(
        mut self,
        path: &std::path::Path,
        frozen_stages: usize,
        device: &B::Device,
    ) -> DfdnResult<Self> {
        self.features = self
            .features
            .load_torchvision(path, device)
            .map_err(|e| crate::error::DfdnError::Checkpoint {
                reason: format!("failed to import backbone weights: {e}"),
            })?
            .freeze_stages(frozen_stages);
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use burn::tensor::Distribution;
    use resnet::ResNetVariant;

    use super::*;
    use crate::tests::TestBackend;

    fn small_encoder() -> BackboneEncoder<TestBackend> {
        let device = Default::default();
        BackboneEncoderConfig::new(
            ResNetConfig::new().with_variant(ResNetVariant::ResNet18),
            TransformerBlockConfig::new(32, 4, 64),
            2,
        )
        .init(&device)
        .unwrap()
    }

    #[test]
    fn encoder_maps_grayscale_batch_to_sequence() {
        let device = Default::default();
        let encoder = small_encoder();

        let images =
            Tensor::<TestBackend, 4>::random([2, 1, 64, 96], Distribution::Uniform(0.0, 1.0), &device);

        // 64/32 x 96/32 = 2 x 3 patches.
        assert_eq!(encoder.forward(images).dims(), [2, 6, 32]);
    }

    #[test]
    fn encoder_accepts_three_channel_batch() {
        let device = Default::default();
        let encoder = small_encoder();

        let images =
            Tensor::<TestBackend, 4>::random([1, 3, 64, 64], Distribution::Uniform(0.0, 1.0), &device);

        assert_eq!(encoder.forward(images).dims(), [1, 4, 32]);
    }

    #[test]
    fn encoder_config_follows_model_config() {
        let model = DfdnConfig::new();
        let config = BackboneEncoderConfig::from_model(&model);

        assert_eq!(config.num_blocks, 6);
        assert_eq!(config.block.d_model, 256);
        assert_eq!(config.backbone.frozen_stages, 3);
        assert_eq!(config.backbone.variant.out_channels(), 2048);
    }
}
