use burn::{
    nn::{Dropout, DropoutConfig, Linear, LinearConfig, Relu},
    prelude::*,
};

const HIDDEN_UNITS: usize = 64;

/// Configuration for a [ClassifierHead].
#[derive(Config, Debug)]
pub struct ClassifierHeadConfig {
    /// Length of the pathology embedding.
    #[config(default = 128)]
    pub feature_dim: usize,
    #[config(default = 3)]
    pub num_classes: usize,
    #[config(default = 0.1)]
    pub dropout: f64,
}

impl ClassifierHeadConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ClassifierHead<B> {
        ClassifierHead {
            hidden: LinearConfig::new(self.feature_dim, HIDDEN_UNITS).init(device),
            activation: Relu::new(),
            dropout: DropoutConfig::new(self.dropout).init(),
            output: LinearConfig::new(HIDDEN_UNITS, self.num_classes).init(device),
        }
    }
}

/// Maps the pathology embedding to class logits.
///
/// Softmax is applied by the caller so the loss can work on log-probabilities
/// of the same logits.
#[derive(Module, Debug)]
pub struct ClassifierHead<B: Backend> {
    hidden: Linear<B>,
    activation: Relu,
    dropout: Dropout,
    output: Linear<B>,
}

impl<B: Backend> ClassifierHead<B> {
    /// `[B, F] -> [B, K]` logits.
    pub fn forward(&self, pathology: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.activation.forward(self.hidden.forward(pathology));
        self.output.forward(self.dropout.forward(x))
    }
}

#[cfg(test)]
mod tests {
    use burn::tensor::{activation::softmax, Distribution, Tolerance};

    use super::*;
    use crate::tests::TestBackend;

    #[test]
    fn classifier_softmax_rows_sum_to_one() {
        let device = Default::default();
        let head = ClassifierHeadConfig::new().init::<TestBackend>(&device);

        let features =
            Tensor::<TestBackend, 2>::random([5, 128], Distribution::Normal(0.0, 4.0), &device);
        let probabilities = softmax(head.forward(features), 1);

        assert_eq!(probabilities.dims(), [5, 3]);
        probabilities.sum_dim(1).into_data().assert_approx_eq::<f32>(
            &TensorData::ones::<f32, _>([5, 1]),
            Tolerance::absolute(1e-5),
        );
    }
}
