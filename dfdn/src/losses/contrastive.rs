//! Batch-level contrastive loss between pathology and physiology embeddings.
//!
//! ```text
//! S    = norm(P) · norm(Q)ᵀ / τ                  [B, B]
//! Loss = mean BCE(sigmoid(S), I)
//! ```
//!
//! The diagonal (a sample paired with itself) is the positive class; every
//! cross-sample pair is a negative. The binary cross-entropy is evaluated in
//! the logits form `max(s, 0) - s·y + log(1 + e^{-|s|})`.

use burn::{
    config::Config,
    module::{Content, DisplaySettings, Module, ModuleDisplay},
    tensor::{backend::Backend, Tensor, TensorData},
};
use burn_extra_ops::l2_normalize;

/// Configuration for creating a [Contrastive loss](ContrastiveLoss).
#[derive(Config, Debug)]
pub struct ContrastiveLossConfig {
    /// Temperature τ dividing the cosine similarities. Default: 0.07
    #[config(default = 0.07)]
    pub temperature: f64,
}

impl ContrastiveLossConfig {
    /// Initialize [Contrastive loss](ContrastiveLoss).
    pub fn init(&self) -> ContrastiveLoss {
        self.assertions();
        ContrastiveLoss {
            temperature: self.temperature,
        }
    }

    fn assertions(&self) {
        assert!(
            self.temperature > 0.0,
            "Temperature for ContrastiveLoss must be positive, got {}",
            self.temperature
        );
    }
}

/// Identity-target binary cross-entropy over the similarity matrix.
#[derive(Module, Clone, Debug)]
#[module(custom_display)]
pub struct ContrastiveLoss {
    /// Temperature τ.
    pub temperature: f64,
}

impl ModuleDisplay for ContrastiveLoss {
    fn custom_settings(&self) -> Option<DisplaySettings> {
        DisplaySettings::new()
            .with_new_line_after_attribute(false)
            .optional()
    }

    fn custom_content(&self, content: Content) -> Option<Content> {
        content.add("temperature", &self.temperature).optional()
    }
}

impl ContrastiveLoss {
    /// # Shapes
    ///
    /// - pathology: `[batch_size, feature_dim]`
    /// - physiology: `[batch_size, feature_dim]`
    /// - output: `[1]`
    pub fn forward<B: Backend>(
        &self,
        pathology: Tensor<B, 2>,
        physiology: Tensor<B, 2>,
    ) -> Tensor<B, 1> {
        let [batch_size, _] = pathology.dims();
        assert_eq!(
            pathology.dims(),
            physiology.dims(),
            "Pathology and physiology embeddings must have the same shape"
        );

        let logits = self.similarity(pathology, physiology);
        let targets = identity::<B>(batch_size, &logits.device());

        let loss = logits.clone().clamp_min(0.0) - logits.clone() * targets
            + logits.abs().neg().exp().log1p();

        loss.mean()
    }

    /// Temperature-scaled cosine similarity matrix `[batch_size, batch_size]`.
    pub fn similarity<B: Backend>(
        &self,
        pathology: Tensor<B, 2>,
        physiology: Tensor<B, 2>,
    ) -> Tensor<B, 2> {
        let pathology = l2_normalize(pathology, 1);
        let physiology = l2_normalize(physiology, 1);

        pathology
            .matmul(physiology.transpose())
            .div_scalar(self.temperature)
    }
}

fn identity<B: Backend>(size: usize, device: &B::Device) -> Tensor<B, 2> {
    let mut values = vec![0.0f32; size * size];
    for index in 0..size {
        values[index * size + index] = 1.0;
    }
    Tensor::from_data(
        TensorData::new(values, [size, size]).convert::<B::FloatElem>(),
        device,
    )
}
