//! Label-smoothed categorical cross-entropy.
//!
//! ```text
//! y'   = y · (1 - ε) + ε / K
//! ℓᵢ   = -Σₖ y'ᵢₖ · log softmax(zᵢ)ₖ
//! Loss = Σᵢ wᵢ · ℓᵢ / B          (wᵢ = 1 without sample weights)
//! ```

use burn::{
    config::Config,
    module::{Content, DisplaySettings, Module, ModuleDisplay},
    tensor::{activation::log_softmax, backend::Backend, Tensor},
};

/// Configuration for creating a [Classification loss](ClassificationLoss).
#[derive(Config, Debug)]
pub struct ClassificationLossConfig {
    /// Smoothing factor ε applied to the one-hot targets. Default: 0.1
    #[config(default = 0.1)]
    pub label_smoothing: f64,
}

impl ClassificationLossConfig {
    /// Initialize [Classification loss](ClassificationLoss).
    pub fn init(&self) -> ClassificationLoss {
        self.assertions();
        ClassificationLoss {
            label_smoothing: self.label_smoothing,
        }
    }

    fn assertions(&self) {
        assert!(
            (0.0..1.0).contains(&self.label_smoothing),
            "Label smoothing for ClassificationLoss must lie in [0, 1), got {}",
            self.label_smoothing
        );
    }
}

/// Cross-entropy between smoothed one-hot targets and the softmax of the logits.
#[derive(Module, Clone, Debug)]
#[module(custom_display)]
pub struct ClassificationLoss {
    /// Smoothing factor ε.
    pub label_smoothing: f64,
}

impl ModuleDisplay for ClassificationLoss {
    fn custom_settings(&self) -> Option<DisplaySettings> {
        DisplaySettings::new()
            .with_new_line_after_attribute(false)
            .optional()
    }

    fn custom_content(&self, content: Content) -> Option<Content> {
        content
            .add("label_smoothing", &self.label_smoothing)
            .optional()
    }
}

impl ClassificationLoss {
    /// Batch loss, optionally weighted per sample.
    ///
    /// # Shapes
    ///
    /// - logits: `[batch_size, num_classes]`
    /// - targets: `[batch_size, num_classes]` one-hot
    /// - weights: `[batch_size]`
    /// - output: `[1]`
    pub fn forward<B: Backend>(
        &self,
        logits: Tensor<B, 2>,
        targets: Tensor<B, 2>,
        weights: Option<Tensor<B, 1>>,
    ) -> Tensor<B, 1> {
        let per_sample = self.forward_no_reduction(logits, targets);
        match weights {
            Some(weights) => (per_sample * weights).mean(),
            None => per_sample.mean(),
        }
    }

    /// Per-sample loss.
    ///
    /// # Shapes
    ///
    /// - logits: `[batch_size, num_classes]`
    /// - targets: `[batch_size, num_classes]` one-hot
    /// - output: `[batch_size]`
    pub fn forward_no_reduction<B: Backend>(
        &self,
        logits: Tensor<B, 2>,
        targets: Tensor<B, 2>,
    ) -> Tensor<B, 1> {
        let [batch_size, num_classes] = logits.dims();
        assert_eq!(
            targets.dims(),
            [batch_size, num_classes],
            "Targets must match logits shape [batch_size, num_classes]"
        );

        let smoothed = targets
            .mul_scalar(1.0 - self.label_smoothing)
            .add_scalar(self.label_smoothing / num_classes as f64);

        (smoothed * log_softmax(logits, 1))
            .sum_dim(1)
            .neg()
            .reshape([batch_size])
    }
}

#[cfg(test)]
mod tests {
    use burn::{
        nn::loss::CrossEntropyLossConfig,
        tensor::{Int, TensorData, Tolerance, Transaction},
    };

    use super::*;
    use crate::tests::TestBackend;

    type Fixture = (
        Tensor<TestBackend, 2>,
        Tensor<TestBackend, 2>,
        Tensor<TestBackend, 1, Int>,
    );

    fn logits_and_targets() -> Fixture {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::from_data(
            TensorData::from([[2.0, 1.0, 0.5], [0.1, 3.0, 0.2]]),
            &device,
        );
        let one_hot = Tensor::<TestBackend, 2>::from_data(
            TensorData::from([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]),
            &device,
        );
        let indices = Tensor::<TestBackend, 1, Int>::from_data(TensorData::from([0, 1]), &device);
        (logits, one_hot, indices)
    }

    #[test]
    fn cls_loss_without_smoothing_matches_cross_entropy() {
        let device = Default::default();
        let (logits, one_hot, indices) = logits_and_targets();
        let loss = ClassificationLossConfig::new()
            .with_label_smoothing(0.0)
            .init();

        let result = loss.forward(logits.clone(), one_hot, None);
        let expected = CrossEntropyLossConfig::new()
            .init::<TestBackend>(&device)
            .forward(logits, indices);

        let [result, expected] = Transaction::default()
            .register(result)
            .register(expected)
            .execute()
            .try_into()
            .expect("Correct amount of tensor data");

        result.assert_approx_eq::<f32>(&expected, Tolerance::default());
    }

    #[test]
    fn cls_loss_with_smoothing_matches_smoothed_cross_entropy() {
        let device = Default::default();
        let (logits, one_hot, indices) = logits_and_targets();
        let loss = ClassificationLossConfig::new().init();

        let result = loss.forward(logits.clone(), one_hot, None);
        let expected = CrossEntropyLossConfig::new()
            .with_smoothing(Some(0.1))
            .init::<TestBackend>(&device)
            .forward(logits, indices);

        result
            .into_data()
            .assert_approx_eq::<f32>(&expected.into_data(), Tolerance::default());
    }

    #[test]
    fn cls_loss_sample_weights_scale_per_sample_terms() {
        let device = Default::default();
        let (logits, one_hot, _) = logits_and_targets();
        let loss = ClassificationLossConfig::new().init();

        let per_sample = loss.forward_no_reduction(logits.clone(), one_hot.clone());
        let weights = Tensor::<TestBackend, 1>::from_data(TensorData::from([2.0, 0.0]), &device);
        let weighted = loss.forward(logits, one_hot, Some(weights));

        // (2·ℓ₀ + 0·ℓ₁) / 2 = ℓ₀
        let first = per_sample.slice([0..1]);
        weighted
            .into_data()
            .assert_approx_eq::<f32>(&first.into_data(), Tolerance::default());
    }

    #[test]
    fn cls_loss_is_lower_for_confident_correct_predictions() {
        let device = Default::default();
        let loss = ClassificationLossConfig::new().init();
        let targets =
            Tensor::<TestBackend, 2>::from_data(TensorData::from([[0.0, 0.0, 1.0]]), &device);
        let right = Tensor::<TestBackend, 2>::from_data(TensorData::from([[0.0, 0.0, 5.0]]), &device);
        let wrong = Tensor::<TestBackend, 2>::from_data(TensorData::from([[5.0, 0.0, 0.0]]), &device);

        let right = loss.forward(right, targets.clone(), None).into_scalar();
        let wrong = loss.forward(wrong, targets, None).into_scalar();

        assert!(right < wrong);
        // Smoothing keeps the loss strictly positive.
        assert!(right > 0.0);
    }

    #[test]
    fn display_classification_loss() {
        let loss = ClassificationLossConfig::new().init();

        assert_eq!(
            format!("{loss}"),
            "ClassificationLoss {label_smoothing: 0.1}"
        );
    }
}
