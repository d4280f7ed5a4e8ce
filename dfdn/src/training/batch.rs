use burn::{prelude::*, tensor::ElementConversion};

/// A batch of images with their labels.
#[derive(Debug, Clone)]
pub struct DfdnBatch<B: Backend> {
    /// Images `[B, C, H, W]`.
    pub images: Tensor<B, 4>,
    /// One-hot labels `[B, K]`.
    pub labels: Tensor<B, 2>,
    /// Class indices `[B]`.
    pub targets: Tensor<B, 1, Int>,
    /// Per-sample loss weights `[B]`.
    pub weights: Option<Tensor<B, 1>>,
}

impl<B: Backend> DfdnBatch<B> {
    pub fn batch_size(&self) -> usize {
        self.images.dims()[0]
    }
}

/// Output of a training or validation step.
#[derive(Debug, Clone)]
pub struct DfdnStepOutput<B: Backend> {
    /// Total loss `[1]`.
    pub loss: Tensor<B, 1>,
    pub classification_loss: Tensor<B, 1>,
    pub contrastive_loss: Tensor<B, 1>,
    pub orthogonality_loss: Tensor<B, 1>,
    /// Class logits `[B, K]`.
    pub logits: Tensor<B, 2>,
    /// Class indices `[B]`.
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> DfdnStepOutput<B> {
    /// Number of samples whose arg-max prediction equals the target.
    pub fn correct(&self) -> usize {
        let [batch_size, _] = self.logits.dims();
        let predicted = self.logits.clone().argmax(1).reshape([batch_size]);

        predicted
            .equal(self.targets.clone())
            .int()
            .sum()
            .into_scalar()
            .elem::<i64>() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::TestBackend;

    #[test]
    fn correct_counts_argmax_agreement() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::from_data(
            TensorData::from([[2.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 3.0, 0.0]]),
            &device,
        );
        let targets = Tensor::<TestBackend, 1, Int>::from_data(TensorData::from([0, 1, 1]), &device);
        let loss = Tensor::<TestBackend, 1>::zeros([1], &device);

        let output = DfdnStepOutput {
            loss: loss.clone(),
            classification_loss: loss.clone(),
            contrastive_loss: loss.clone(),
            orthogonality_loss: loss,
            logits,
            targets,
        };

        assert_eq!(output.correct(), 2);
    }
}
