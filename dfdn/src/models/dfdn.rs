//! # DFDN Model
//!
//! The Dynamic Feature Decoupling Network splits one backbone representation
//! into a pathology embedding, which drives the diagnosis, and a physiology
//! embedding, which is pushed away from it during training.
//!
//! ```text
//! images ─► BackboneEncoder ─┬─► pathology decoder ─► pathology ─► ClassifierHead ─► logits
//!                            └─► physiology decoder ─► physiology
//! ```

use burn::{module::Ignored, prelude::*, tensor::activation::softmax};

use super::{
    BackboneEncoder, BackboneEncoderConfig, ClassifierHead, ClassifierHeadConfig, FeatureDecoder,
    FeatureDecoderConfig,
};
use crate::{
    config::{DfdnConfig, Modality},
    error::{DfdnError, DfdnResult},
    losses::DfdnLoss,
};

#[cfg(feature = "train")]
use crate::training::{DfdnBatch, DfdnStepOutput};

#[cfg(feature = "train")]
use burn::{
    tensor::backend::AutodiffBackend,
    train::{TrainOutput, TrainStep, ValidStep},
};

/// Outputs of one forward pass.
#[derive(Debug, Clone)]
pub struct DfdnOutput<B: Backend> {
    /// Class logits `[B, K]`.
    pub logits: Tensor<B, 2>,
    /// Pathology embedding `[B, F]`.
    pub pathology: Tensor<B, 2>,
    /// Physiology embedding `[B, F]`.
    pub physiology: Tensor<B, 2>,
}

impl DfdnConfig {
    /// Initializes a [Dfdn] model.
    ///
    /// # Errors
    ///
    /// Returns `Err(DfdnError::InvalidConfiguration)` if the configuration is
    /// invalid, and a checkpoint error if backbone weights cannot be imported.
    pub fn init<B: Backend>(&self, device: &B::Device) -> DfdnResult<Dfdn<B>> {
        self.validate()?;

        tracing::info!(
            modality = self.modality.name(),
            backbone = ?self.backbone.variant,
            frozen_stages = self.backbone.frozen_stages,
            embedding_dim = self.embedding_dim,
            num_heads = self.num_heads,
            encoder_blocks = self.num_transformer_blocks,
            decoder_blocks = self.num_decoder_blocks,
            feature_dim = self.feature_dim,
            "building DFDN model"
        );
        if self.execution.fused_compile {
            tracing::debug!("fused execution requested, fusion follows the backend type");
        }

        let encoder = BackboneEncoderConfig::from_model(self).init(device)?;
        let encoder = self.import_backbone_weights(encoder, device)?;

        let decoder = FeatureDecoderConfig::from_model(self);
        let classifier = ClassifierHeadConfig::new()
            .with_feature_dim(self.feature_dim)
            .with_num_classes(self.num_classes)
            .with_dropout(self.dropout_rate);

        Ok(Dfdn {
            encoder,
            pathology_decoder: decoder.init(device)?,
            physiology_decoder: decoder.init(device)?,
            classifier: classifier.init(device),
            loss: self.loss.init(),
            config: Ignored(self.clone()),
        })
    }

    #[cfg(feature = "pretrained")]
    fn import_backbone_weights<B: Backend>(
        &self,
        encoder: BackboneEncoder<B>,
        device: &B::Device,
    ) -> DfdnResult<BackboneEncoder<B>> {
        match &self.backbone.weights {
            Some(path) => {
                tracing::info!(path = %path.display(), "importing backbone weights");
                encoder.load_backbone_weights(path, self.backbone.frozen_stages, device)
            }
            None => Ok(encoder),
        }
    }

    #[cfg(not(feature = "pretrained"))]
    fn import_backbone_weights<B: Backend>(
        &self,
        encoder: BackboneEncoder<B>,
        _device: &B::Device,
    ) -> DfdnResult<BackboneEncoder<B>> {
        match &self.backbone.weights {
            Some(path) => Err(DfdnError::InvalidConfiguration {
                reason: format!(
                    "backbone weights {} require the `pretrained` feature",
                    path.display()
                ),
            }),
            None => Ok(encoder),
        }
    }
}

/// Dynamic Feature Decoupling Network.
#[derive(Module, Debug)]
pub struct Dfdn<B: Backend> {
    pub encoder: BackboneEncoder<B>,
    pub pathology_decoder: FeatureDecoder<B>,
    pub physiology_decoder: FeatureDecoder<B>,
    pub classifier: ClassifierHead<B>,
    pub loss: DfdnLoss,
    config: Ignored<DfdnConfig>,
}

impl<B: Backend> Dfdn<B> {
    /// Configuration the model was built from.
    pub fn config(&self) -> &DfdnConfig {
        &self.config.0
    }

    pub fn modality(&self) -> &Modality {
        &self.config.0.modality
    }

    /// Check an image batch against the configured input shape.
    ///
    /// # Errors
    ///
    /// Returns `Err(DfdnError::InvalidTensorShape)` for an empty batch, a wrong
    /// channel count or a wrong spatial size.
    pub fn check_input(&self, images: &Tensor<B, 4>) -> DfdnResult<()> {
        let [batch, channels, height, width] = images.dims();
        let config = self.config();
        let [expected_h, expected_w] = config.input_size;

        if batch == 0 || channels != config.in_channels || [height, width] != config.input_size {
            return Err(DfdnError::InvalidTensorShape {
                expected: format!("[B>0, {}, {expected_h}, {expected_w}]", config.in_channels),
                actual: format!("{:?}", images.dims()),
            });
        }
        Ok(())
    }

    /// Full forward pass.
    ///
    /// # Shapes
    ///
    /// - images: `[batch_size, in_channels, height, width]`
    ///
    /// # Errors
    ///
    /// See [Dfdn::check_input].
    pub fn forward(&self, images: Tensor<B, 4>) -> DfdnResult<DfdnOutput<B>> {
        self.check_input(&images)?;
        Ok(self.forward_unchecked(images))
    }

    pub(crate) fn forward_unchecked(&self, images: Tensor<B, 4>) -> DfdnOutput<B> {
        let sequence = self.encoder.forward(images);
        let pathology = self.pathology_decoder.forward(sequence.clone());
        let physiology = self.physiology_decoder.forward(sequence);
        let logits = self.classifier.forward(pathology.clone());

        DfdnOutput {
            logits,
            pathology,
            physiology,
        }
    }

    /// Class probabilities `[batch_size, num_classes]`; every row sums to one.
    ///
    /// # Errors
    ///
    /// See [Dfdn::check_input].
    pub fn predict(&self, images: Tensor<B, 4>) -> DfdnResult<Tensor<B, 2>> {
        Ok(softmax(self.forward(images)?.logits, 1))
    }

    /// Pathology and physiology embeddings, each `[batch_size, feature_dim]`.
    ///
    /// # Errors
    ///
    /// See [Dfdn::check_input].
    pub fn extract_features(&self, images: Tensor<B, 4>) -> DfdnResult<(Tensor<B, 2>, Tensor<B, 2>)> {
        let output = self.forward(images)?;
        Ok((output.pathology, output.physiology))
    }
}

#[cfg(feature = "train")]
impl<B: Backend> Dfdn<B> {
    /// Forward pass and loss for one batch.
    ///
    /// The batch is produced by [StrokeBatcher](crate::training::StrokeBatcher)
    /// from a dataset checked against this model's configuration.
    pub fn forward_step(&self, batch: DfdnBatch<B>) -> DfdnStepOutput<B> {
        let output = self.forward_unchecked(batch.images);
        let loss = self.loss.forward(
            output.logits.clone(),
            output.pathology,
            output.physiology,
            batch.labels,
            batch.weights,
        );

        DfdnStepOutput {
            loss: loss.total,
            classification_loss: loss.classification,
            contrastive_loss: loss.contrastive,
            orthogonality_loss: loss.orthogonality,
            logits: output.logits,
            targets: batch.targets,
        }
    }
}

#[cfg(feature = "train")]
impl<B: AutodiffBackend> TrainStep<DfdnBatch<B>, DfdnStepOutput<B>> for Dfdn<B> {
    fn step(&self, batch: DfdnBatch<B>) -> TrainOutput<DfdnStepOutput<B>> {
        let item = self.forward_step(batch);
        TrainOutput::new(self, item.loss.backward(), item)
    }
}

#[cfg(feature = "train")]
impl<B: Backend> ValidStep<DfdnBatch<B>, DfdnStepOutput<B>> for Dfdn<B> {
    fn step(&self, batch: DfdnBatch<B>) -> DfdnStepOutput<B> {
        // Class balancing applies to training batches only.
        self.forward_step(DfdnBatch {
            weights: None,
            ..batch
        })
    }
}
