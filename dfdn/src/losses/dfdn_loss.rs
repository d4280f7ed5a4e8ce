//! Combined training objective.
//!
//! ```text
//! total = CE + λc · clip(contrastive) + λo · clip(orthogonality)
//! ```
//!
//! NaN entries in any term are replaced with zero before combining, and the
//! auxiliary terms are clipped to `[-clip_bound, clip_bound]`.

use burn::{
    module::{Content, DisplaySettings, Module, ModuleDisplay},
    tensor::{backend::Backend, Tensor},
};
use burn_extra_ops::nan_to_zero;

use super::{
    ClassificationLoss, ClassificationLossConfig, ContrastiveLoss, ContrastiveLossConfig,
    OrthogonalityLoss,
};
use crate::config::DfdnLossConfig;

/// The individual terms of one loss evaluation, each of shape `[1]`.
#[derive(Debug, Clone)]
pub struct DfdnLossOutput<B: Backend> {
    /// Weighted sum used for back-propagation.
    pub total: Tensor<B, 1>,
    pub classification: Tensor<B, 1>,
    /// Clipped, unweighted contrastive term.
    pub contrastive: Tensor<B, 1>,
    /// Clipped, unweighted orthogonality term.
    pub orthogonality: Tensor<B, 1>,
}

impl DfdnLossConfig {
    /// Build the loss criterion.
    ///
    /// Call [DfdnLossConfig::validate] first; invalid values panic here.
    pub fn init(&self) -> DfdnLoss {
        DfdnLoss {
            classification: ClassificationLossConfig::new()
                .with_label_smoothing(self.label_smoothing)
                .init(),
            contrastive: ContrastiveLossConfig::new()
                .with_temperature(self.temperature)
                .init(),
            contrastive_weight: self.contrastive_weight,
            ortho_weight: self.ortho_weight,
            clip_bound: self.clip_bound,
        }
    }
}

/// Classification, contrastive and orthogonality terms with their weights.
#[derive(Module, Clone, Debug)]
#[module(custom_display)]
pub struct DfdnLoss {
    pub classification: ClassificationLoss,
    pub contrastive: ContrastiveLoss,
    pub contrastive_weight: f64,
    pub ortho_weight: f64,
    pub clip_bound: f64,
}

impl ModuleDisplay for DfdnLoss {
    fn custom_settings(&self) -> Option<DisplaySettings> {
        DisplaySettings::new()
            .with_new_line_after_attribute(false)
            .optional()
    }

    fn custom_content(&self, content: Content) -> Option<Content> {
        content
            .add("label_smoothing", &self.classification.label_smoothing)
            .add("temperature", &self.contrastive.temperature)
            .add("contrastive_weight", &self.contrastive_weight)
            .add("ortho_weight", &self.ortho_weight)
            .add("clip_bound", &self.clip_bound)
            .optional()
    }
}

impl DfdnLoss {
    /// # Shapes
    ///
    /// - logits: `[batch_size, num_classes]`
    /// - pathology, physiology: `[batch_size, feature_dim]`
    /// - targets: `[batch_size, num_classes]` one-hot
    /// - weights: `[batch_size]`, applied to the classification term only
    pub fn forward<B: Backend>(
        &self,
        logits: Tensor<B, 2>,
        pathology: Tensor<B, 2>,
        physiology: Tensor<B, 2>,
        targets: Tensor<B, 2>,
        weights: Option<Tensor<B, 1>>,
    ) -> DfdnLossOutput<B> {
        let classification = nan_to_zero(self.classification.forward(logits, targets, weights));
        let contrastive = self.clip(
            self.contrastive
                .forward(pathology.clone(), physiology.clone()),
        );
        let orthogonality = self.clip(OrthogonalityLoss::new().forward(pathology, physiology));

        let total = classification.clone()
            + contrastive.clone().mul_scalar(self.contrastive_weight)
            + orthogonality.clone().mul_scalar(self.ortho_weight);

        DfdnLossOutput {
            total,
            classification,
            contrastive,
            orthogonality,
        }
    }

    fn clip<B: Backend>(&self, term: Tensor<B, 1>) -> Tensor<B, 1> {
        nan_to_zero(term).clamp(-self.clip_bound, self.clip_bound)
    }
}
