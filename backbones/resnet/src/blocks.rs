//! Residual units and stages.
//!
//! A unit is either the two-convolution basic form (ResNet-18/34) or the
//! three-convolution bottleneck form (ResNet-50 and deeper). Both share one
//! struct: a chain of conv/batch-norm pairs with ReLU between them, plus an
//! optional projection shortcut.

use core::f64::consts::SQRT_2;

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        BatchNorm, BatchNormConfig, Initializer, PaddingConfig2d, Relu,
    },
    prelude::*,
};

/// Bottleneck units narrow the 3x3 convolution by this factor.
pub const BOTTLENECK_EXPANSION: usize = 4;

/// Bias-free square convolution with "same" padding and fan-out Kaiming init.
pub(crate) fn conv<B: Backend>(
    channels: [usize; 2],
    kernel: usize,
    stride: usize,
    device: &Device<B>,
) -> Conv2d<B> {
    let padding = kernel / 2;
    Conv2dConfig::new(channels, [kernel, kernel])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(padding, padding))
        .with_bias(false)
        .with_initializer(Initializer::KaimingNormal {
            gain: SQRT_2,
            fan_out_only: true,
        })
        .init(device)
}

/// 1x1 projection used when a unit changes resolution or width.
#[derive(Module, Debug)]
pub struct Shortcut<B: Backend> {
    pub(crate) conv: Conv2d<B>,
    pub(crate) norm: BatchNorm<B, 2>,
}

impl<B: Backend> Shortcut<B> {
    fn new(in_channels: usize, out_channels: usize, stride: usize, device: &Device<B>) -> Self {
        Self {
            conv: conv([in_channels, out_channels], 1, stride, device),
            norm: BatchNormConfig::new(out_channels).init(device),
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        self.norm.forward(self.conv.forward(input))
    }
}

/// One residual unit.
///
/// In the bottleneck form the stride sits on the 3x3 convolution (ResNet v1.5).
#[derive(Module, Debug)]
pub struct ResidualUnit<B: Backend> {
    pub(crate) convs: Vec<Conv2d<B>>,
    pub(crate) norms: Vec<BatchNorm<B, 2>>,
    pub(crate) shortcut: Option<Shortcut<B>>,
    activation: Relu,
}

impl<B: Backend> ResidualUnit<B> {
    /// Two 3x3 convolutions.
    pub fn basic(in_channels: usize, out_channels: usize, stride: usize, device: &Device<B>) -> Self {
        let convs = vec![
            conv([in_channels, out_channels], 3, stride, device),
            conv([out_channels, out_channels], 3, 1, device),
        ];
        Self::assemble(convs, in_channels, out_channels, stride, device)
    }

    /// 1x1 reduce, 3x3, 1x1 expand.
    pub fn bottleneck(
        in_channels: usize,
        out_channels: usize,
        stride: usize,
        device: &Device<B>,
    ) -> Self {
        let width = out_channels / BOTTLENECK_EXPANSION;
        let convs = vec![
            conv([in_channels, width], 1, 1, device),
            conv([width, width], 3, stride, device),
            conv([width, out_channels], 1, 1, device),
        ];
        Self::assemble(convs, in_channels, out_channels, stride, device)
    }

    fn assemble(
        convs: Vec<Conv2d<B>>,
        in_channels: usize,
        out_channels: usize,
        stride: usize,
        device: &Device<B>,
    ) -> Self {
        let norms = convs
            .iter()
            .map(|conv| BatchNormConfig::new(conv.weight.dims()[0]).init(device))
            .collect();
        let shortcut = (stride != 1 || in_channels != out_channels)
            .then(|| Shortcut::new(in_channels, out_channels, stride, device));

        Self {
            convs,
            norms,
            shortcut,
            activation: Relu::new(),
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = match &self.shortcut {
            Some(shortcut) => shortcut.forward(input.clone()),
            None => input.clone(),
        };

        let last = self.convs.len() - 1;
        let mut out = input;
        for (index, (conv, norm)) in self.convs.iter().zip(&self.norms).enumerate() {
            out = norm.forward(conv.forward(out));
            if index < last {
                out = self.activation.forward(out);
            }
        }

        self.activation.forward(out + identity)
    }
}

/// A run of residual units; only the first one strides.
#[derive(Module, Debug)]
pub struct Stage<B: Backend> {
    pub(crate) units: Vec<ResidualUnit<B>>,
}

impl<B: Backend> Stage<B> {
    pub fn new(
        depth: usize,
        in_channels: usize,
        out_channels: usize,
        stride: usize,
        bottleneck: bool,
        device: &Device<B>,
    ) -> Self {
        let units = (0..depth)
            .map(|index| {
                let (unit_in, unit_stride) = if index == 0 {
                    (in_channels, stride)
                } else {
                    (out_channels, 1)
                };
                if bottleneck {
                    ResidualUnit::bottleneck(unit_in, out_channels, unit_stride, device)
                } else {
                    ResidualUnit::basic(unit_in, out_channels, unit_stride, device)
                }
            })
            .collect();

        Self { units }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        self.units
            .iter()
            .fold(input, |out, unit| unit.forward(out))
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{backend::NdArray, tensor::Distribution};

    type TestBackend = NdArray<f32>;

    #[test]
    fn basic_unit_keeps_shape_without_shortcut() {
        let device = Default::default();
        let unit = ResidualUnit::<TestBackend>::basic(16, 16, 1, &device);
        assert!(unit.shortcut.is_none());

        let input =
            Tensor::<TestBackend, 4>::random([2, 16, 8, 8], Distribution::Default, &device);
        assert_eq!(unit.forward(input).dims(), [2, 16, 8, 8]);
    }

    #[test]
    fn bottleneck_unit_strides_on_middle_convolution() {
        let device = Default::default();
        let unit = ResidualUnit::<TestBackend>::bottleneck(64, 256, 2, &device);

        assert_eq!(unit.convs.len(), 3);
        assert_eq!(unit.convs[1].stride, [2, 2]);
        assert!(unit.shortcut.is_some());

        let input =
            Tensor::<TestBackend, 4>::random([1, 64, 16, 16], Distribution::Default, &device);
        assert_eq!(unit.forward(input).dims(), [1, 256, 8, 8]);
    }

    #[test]
    fn stage_output_is_non_negative() {
        let device = Default::default();
        let stage = Stage::<TestBackend>::new(2, 8, 16, 2, false, &device);
        assert_eq!(stage.len(), 2);

        let input =
            Tensor::<TestBackend, 4>::random([1, 8, 8, 8], Distribution::Normal(0.0, 1.0), &device);
        let output = stage.forward(input);

        assert_eq!(output.dims(), [1, 16, 4, 4]);
        assert!(output.min().into_scalar() >= 0.0);
    }
}
