//! Feature decoders.
//!
//! The pathology and physiology decoders are two instances of the same
//! structure built from separate parameters.

use burn::{
    nn::{Dropout, DropoutConfig, Linear, LinearConfig, Relu},
    prelude::*,
};

use super::transformer::{forward_stack, TransformerBlock, TransformerBlockConfig};
use crate::{config::DfdnConfig, error::DfdnResult};

/// Width of the first dense layer after pooling.
const HIDDEN_UNITS: usize = 512;
/// Width of the second dense layer after pooling.
const BOTTLENECK_UNITS: usize = 256;

/// Configuration for a [FeatureDecoder].
#[derive(Config, Debug)]
pub struct FeatureDecoderConfig {
    pub block: TransformerBlockConfig,
    pub num_blocks: usize,
    /// Length of the output embedding.
    #[config(default = 128)]
    pub feature_dim: usize,
}

impl FeatureDecoderConfig {
    /// Decoder part of a full model configuration.
    pub fn from_model(config: &DfdnConfig) -> Self {
        Self::new(
            TransformerBlockConfig::new(config.embedding_dim, config.num_heads, config.mlp_units)
                .with_dropout(config.dropout_rate),
            config.num_decoder_blocks,
        )
        .with_feature_dim(config.feature_dim)
    }

    /// # Errors
    ///
    /// Returns `Err(DfdnError::InvalidConfiguration)` if the Transformer block is invalid.
    pub fn init<B: Backend>(&self, device: &B::Device) -> DfdnResult<FeatureDecoder<B>> {
        Ok(FeatureDecoder {
            blocks: self.block.init_stack(self.num_blocks, device)?,
            hidden: LinearConfig::new(self.block.d_model, HIDDEN_UNITS).init(device),
            dropout: DropoutConfig::new(self.block.dropout).init(),
            bottleneck: LinearConfig::new(HIDDEN_UNITS, BOTTLENECK_UNITS).init(device),
            output: LinearConfig::new(BOTTLENECK_UNITS, self.feature_dim).init(device),
            activation: Relu::new(),
        })
    }
}

/// Pools an embedding sequence into one fixed-length vector per sample.
#[derive(Module, Debug)]
pub struct FeatureDecoder<B: Backend> {
    blocks: Vec<TransformerBlock<B>>,
    hidden: Linear<B>,
    dropout: Dropout,
    bottleneck: Linear<B>,
    output: Linear<B>,
    activation: Relu,
}

impl<B: Backend> FeatureDecoder<B> {
    /// `[B, L, D] -> [B, F]`
    pub fn forward(&self, sequence: Tensor<B, 3>) -> Tensor<B, 2> {
        let pooled = forward_stack(&self.blocks, sequence)
            .mean_dim(1)
            .squeeze::<2>(1);

        let x = self.activation.forward(self.hidden.forward(pooled));
        let x = self.dropout.forward(x);
        let x = self.activation.forward(self.bottleneck.forward(x));

        self.output.forward(x)
    }
}

#[cfg(test)]
mod tests {
    use burn::tensor::Distribution;

    use super::*;
    use crate::tests::TestBackend;

    #[test]
    fn decoder_pools_sequence_to_feature_vector() {
        let device = Default::default();
        let decoder = FeatureDecoderConfig::new(TransformerBlockConfig::new(32, 4, 64), 1)
            .init::<TestBackend>(&device)
            .unwrap();

        let sequence =
            Tensor::<TestBackend, 3>::random([3, 4, 32], Distribution::Normal(0.0, 1.0), &device);

        assert_eq!(decoder.forward(sequence).dims(), [3, 128]);
    }

    #[test]
    fn decoder_handles_single_position_sequence() {
        let device = Default::default();
        let decoder = FeatureDecoderConfig::new(TransformerBlockConfig::new(16, 2, 32), 2)
            .with_feature_dim(24)
            .init::<TestBackend>(&device)
            .unwrap();

        let sequence =
            Tensor::<TestBackend, 3>::random([2, 1, 16], Distribution::Normal(0.0, 1.0), &device);

        assert_eq!(decoder.forward(sequence).dims(), [2, 24]);
    }

    #[test]
    fn decoder_config_uses_fewer_blocks_than_encoder() {
        let config = FeatureDecoderConfig::from_model(&DfdnConfig::new());

        assert_eq!(config.num_blocks, 3);
        assert_eq!(config.feature_dim, 128);
    }
}
