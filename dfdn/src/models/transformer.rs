//! Post-norm Transformer block shared by the encoder and both decoders.

use burn::{
    nn::{
        attention::{MhaInput, MultiHeadAttention, MultiHeadAttentionConfig},
        Dropout, DropoutConfig, LayerNorm, LayerNormConfig, Linear, LinearConfig, Relu,
    },
    prelude::*,
};

use crate::error::{DfdnError, DfdnResult};

/// Epsilon of both layer norms.
const LAYER_NORM_EPSILON: f64 = 1e-6;

/// Configuration for a [TransformerBlock].
#[derive(Config, Debug)]
pub struct TransformerBlockConfig {
    pub d_model: usize,
    pub num_heads: usize,
    /// Hidden width of the feed-forward sub-layer.
    pub mlp_units: usize,
    #[config(default = 0.1)]
    pub dropout: f64,
}

impl TransformerBlockConfig {
    /// # Errors
    ///
    /// Returns `Err(DfdnError::InvalidConfiguration)` when `d_model` is not a
    /// multiple of `num_heads`.
    pub fn init<B: Backend>(&self, device: &B::Device) -> DfdnResult<TransformerBlock<B>> {
        if self.num_heads == 0 || self.d_model % self.num_heads != 0 {
            return Err(DfdnError::InvalidConfiguration {
                reason: format!(
                    "d_model ({}) must be divisible by num_heads ({})",
                    self.d_model, self.num_heads
                ),
            });
        }

        Ok(TransformerBlock {
            attention: MultiHeadAttentionConfig::new(self.d_model, self.num_heads)
                .with_dropout(0.0)
                .init(device),
            attention_dropout: DropoutConfig::new(self.dropout).init(),
            attention_norm: LayerNormConfig::new(self.d_model)
                .with_epsilon(LAYER_NORM_EPSILON)
                .init(device),
            ffn_in: LinearConfig::new(self.d_model, self.mlp_units).init(device),
            ffn_out: LinearConfig::new(self.mlp_units, self.d_model).init(device),
            activation: Relu::new(),
            ffn_dropout: DropoutConfig::new(self.dropout).init(),
            ffn_norm: LayerNormConfig::new(self.d_model)
                .with_epsilon(LAYER_NORM_EPSILON)
                .init(device),
        })
    }

    /// Build `count` independent blocks.
    ///
    /// # Errors
    ///
    /// See [TransformerBlockConfig::init].
    pub fn init_stack<B: Backend>(
        &self,
        count: usize,
        device: &B::Device,
    ) -> DfdnResult<Vec<TransformerBlock<B>>> {
        (0..count).map(|_| self.init(device)).collect()
    }
}

/// Self-attention and feed-forward sub-layers, each followed by dropout, a
/// residual connection and layer normalisation.
#[derive(Module, Debug)]
pub struct TransformerBlock<B: Backend> {
    attention: MultiHeadAttention<B>,
    attention_dropout: Dropout,
    attention_norm: LayerNorm<B>,
    ffn_in: Linear<B>,
    ffn_out: Linear<B>,
    activation: Relu,
    ffn_dropout: Dropout,
    ffn_norm: LayerNorm<B>,
}

impl<B: Backend> TransformerBlock<B> {
    /// `[B, L, D] -> [B, L, D]`
    pub fn forward(&self, input: Tensor<B, 3>) -> Tensor<B, 3> {
        let attended = self
            .attention
            .forward(MhaInput::self_attn(input.clone()))
            .context;
        let x = self
            .attention_norm
            .forward(input + self.attention_dropout.forward(attended));

        let hidden = self.activation.forward(self.ffn_in.forward(x.clone()));
        let projected = self.ffn_dropout.forward(self.ffn_out.forward(hidden));

        self.ffn_norm.forward(x + projected)
    }
}

/// Run `input` through `blocks` in order.
pub fn forward_stack<B: Backend>(blocks: &[TransformerBlock<B>], input: Tensor<B, 3>) -> Tensor<B, 3> {
    blocks.iter().fold(input, |x, block| block.forward(x))
}

#[cfg(test)]
mod tests {
    use burn::tensor::{Distribution, Tolerance};

    use super::*;
    use crate::tests::TestBackend;

    #[test]
    fn transformer_block_preserves_shape() {
        let device = Default::default();
        let block = TransformerBlockConfig::new(32, 4, 64)
            .init::<TestBackend>(&device)
            .unwrap();

        let input =
            Tensor::<TestBackend, 3>::random([2, 9, 32], Distribution::Normal(0.0, 1.0), &device);

        assert_eq!(block.forward(input).dims(), [2, 9, 32]);
    }

    #[test]
    fn transformer_block_output_is_layer_normalised() {
        let device = Default::default();
        let block = TransformerBlockConfig::new(16, 2, 32)
            .init::<TestBackend>(&device)
            .unwrap();

        let input =
            Tensor::<TestBackend, 3>::random([1, 5, 16], Distribution::Normal(3.0, 2.0), &device);
        let output = block.forward(input);

        // Fresh layer norms have unit gain and zero bias.
        let mean = output.clone().mean_dim(2);
        mean.into_data().assert_approx_eq::<f32>(
            &TensorData::zeros::<f32, _>([1, 5, 1]),
            Tolerance::absolute(1e-4),
        );
    }

    #[test]
    fn transformer_block_rejects_indivisible_heads() {
        let device = Default::default();
        let result = TransformerBlockConfig::new(30, 4, 64).init::<TestBackend>(&device);

        assert!(matches!(
            result,
            Err(DfdnError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn stacked_blocks_are_independent() {
        let device = Default::default();
        let blocks = TransformerBlockConfig::new(8, 2, 16)
            .init_stack::<TestBackend>(3, &device)
            .unwrap();

        assert_eq!(blocks.len(), 3);
        let input =
            Tensor::<TestBackend, 3>::random([1, 4, 8], Distribution::Normal(0.0, 1.0), &device);
        assert_eq!(forward_stack(&blocks, input).dims(), [1, 4, 8]);
    }
}
