//! ResNet feature extractor for the DFDN encoder.
//!
//! Provides the torchvision ResNet family without its classification head. The
//! DFDN encoder consumes the deepest feature map (stride 32); the intermediate
//! stages are exposed as well for inspection. Early stages can be frozen so
//! only the deeper part of a pretrained network is fine-tuned.

use burn::nn::{
    conv::Conv2d,
    pool::{MaxPool2d, MaxPool2dConfig},
    BatchNorm, BatchNormConfig, PaddingConfig2d, Relu,
};
use burn::prelude::*;

mod blocks;
#[cfg(feature = "pretrained")]
mod pretrained;

pub use blocks::{ResidualUnit, Shortcut, Stage, BOTTLENECK_EXPANSION};

/// Total downsampling factor between the input and the deepest stage.
pub const OUTPUT_STRIDE: usize = 32;

/// Number of freezable parts: the stem plus four stages.
pub const NUM_FREEZABLE_STAGES: usize = 5;

/// Supported ResNet depths.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum ResNetVariant {
    ResNet18,
    ResNet34,
    ResNet50,
    ResNet101,
    ResNet152,
}

impl ResNetVariant {
    /// Number of residual units in each of the four stages.
    #[must_use]
    pub const fn stage_depths(&self) -> [usize; 4] {
        match self {
            Self::ResNet18 => [2, 2, 2, 2],
            Self::ResNet34 | Self::ResNet50 => [3, 4, 6, 3],
            Self::ResNet101 => [3, 4, 23, 3],
            Self::ResNet152 => [3, 8, 36, 3],
        }
    }

    /// Whether the stages are built from bottleneck units.
    #[must_use]
    pub const fn uses_bottleneck(&self) -> bool {
        !matches!(self, Self::ResNet18 | Self::ResNet34)
    }

    /// Channel count of the deepest feature map.
    #[must_use]
    pub const fn out_channels(&self) -> usize {
        if self.uses_bottleneck() {
            512 * BOTTLENECK_EXPANSION
        } else {
            512
        }
    }
}

/// Configuration for building a [ResNet].
#[derive(Config, Debug)]
pub struct ResNetConfig {
    /// Network depth.
    #[config(default = "ResNetVariant::ResNet50")]
    pub variant: ResNetVariant,
    /// How many leading parts (stem first, then stages 1..4) receive no gradient.
    #[config(default = 0)]
    pub frozen_stages: usize,
}

impl ResNetConfig {
    /// Build the network and freeze the configured leading stages.
    pub fn init<B: Backend>(&self, device: &B::Device) -> ResNet<B> {
        ResNet::new(&self.variant, device).freeze_stages(self.frozen_stages)
    }
}

/// Stem: 7x7/2 convolution, batch norm, ReLU and 3x3/2 max pooling.
#[derive(Module, Debug)]
pub struct Stem<B: Backend> {
    pub(crate) conv: Conv2d<B>,
    pub(crate) norm: BatchNorm<B, 2>,
    activation: Relu,
    pool: MaxPool2d,
}

impl<B: Backend> Stem<B> {
    fn new(in_channels: usize, device: &Device<B>) -> Self {
        Self {
            conv: blocks::conv([in_channels, 64], 7, 2, device),
            norm: BatchNormConfig::new(64).init(device),
            activation: Relu::new(),
            pool: MaxPool2dConfig::new([3, 3])
                .with_strides([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(),
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let out = self.norm.forward(self.conv.forward(input));
        self.pool.forward(self.activation.forward(out))
    }
}

/// Headless ResNet over three-channel images.
#[derive(Module, Debug)]
pub struct ResNet<B: Backend> {
    pub stem: Stem<B>,
    pub layer1: Stage<B>,
    pub layer2: Stage<B>,
    pub layer3: Stage<B>,
    pub layer4: Stage<B>,
}

impl<B: Backend> ResNet<B> {
    /// Randomly initialised network of the given depth.
    pub fn new(variant: &ResNetVariant, device: &Device<B>) -> Self {
        let depths = variant.stage_depths();
        let bottleneck = variant.uses_bottleneck();
        let widen = if bottleneck { BOTTLENECK_EXPANSION } else { 1 };

        Self {
            stem: Stem::new(3, device),
            layer1: Stage::new(depths[0], 64, 64 * widen, 1, bottleneck, device),
            layer2: Stage::new(depths[1], 64 * widen, 128 * widen, 2, bottleneck, device),
            layer3: Stage::new(depths[2], 128 * widen, 256 * widen, 2, bottleneck, device),
            layer4: Stage::new(depths[3], 256 * widen, 512 * widen, 2, bottleneck, device),
        }
    }

    /// Exclude the stem and the first `count - 1` stages from gradient tracking.
    pub fn freeze_stages(mut self, count: usize) -> Self {
        if count > 0 {
            self.stem = self.stem.no_grad();
        }
        if count > 1 {
            self.layer1 = self.layer1.no_grad();
        }
        if count > 2 {
            self.layer2 = self.layer2.no_grad();
        }
        if count > 3 {
            self.layer3 = self.layer3.no_grad();
        }
        if count > 4 {
            self.layer4 = self.layer4.no_grad();
        }
        self
    }

    /// Deepest feature map, `[B, C', H/32, W/32]`.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let [_, _, _, deepest] = self.forward_stages(input);
        deepest
    }

    /// Outputs of all four stages, at strides 4, 8, 16 and 32.
    pub fn forward_stages(&self, input: Tensor<B, 4>) -> [Tensor<B, 4>; 4] {
        let c1 = self.layer1.forward(self.stem.forward(input));
        let c2 = self.layer2.forward(c1.clone());
        let c3 = self.layer3.forward(c2.clone());
        let c4 = self.layer4.forward(c3.clone());

        [c1, c2, c3, c4]
    }
}
