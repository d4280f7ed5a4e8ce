//! The training loop.
//!
//! Each epoch runs shuffled mini-batches through [TrainStep], clips the
//! gradient norm, applies Adam, and then, when validation data is given,
//! measures validation accuracy with [ValidStep] on the inner backend. The
//! parameters with the best validation accuracy are restored at the end.

use std::{path::PathBuf, sync::Arc};

use burn::{
    data::{
        dataloader::{DataLoader, DataLoaderBuilder},
        dataset::Dataset,
    },
    grad_clipping::GradientClippingConfig,
    module::AutodiffModule,
    optim::{AdamConfig, Optimizer},
    prelude::*,
    tensor::{backend::AutodiffBackend, ElementConversion},
    train::{TrainStep, ValidStep},
};
use serde::Serialize;

use super::{DfdnBatch, DfdnStepOutput, StrokeBatcher, StrokeDataset};
use crate::{
    error::{DfdnError, DfdnResult},
    models::{Dfdn, DfdnRecord},
};

/// Optimisation and early-stopping settings.
#[derive(Config, Debug)]
pub struct TrainingConfig {
    #[config(default = 50)]
    pub num_epochs: usize,

    #[config(default = 128)]
    pub batch_size: usize,

    /// Epochs without a validation accuracy improvement before stopping.
    #[config(default = 10)]
    pub early_stopping_patience: usize,

    #[config(default = 1e-4)]
    pub learning_rate: f64,

    /// Maximum L2 norm of each parameter gradient.
    #[config(default = 1.0)]
    pub grad_clip_norm: f64,

    /// Seed for parameter initialisation and batch shuffling.
    #[config(default = 42)]
    pub seed: u64,

    /// Weight training samples by inverse class frequency.
    #[config(default = true)]
    pub class_balanced: bool,

    /// Directory receiving a checkpoint on every validation improvement.
    #[config(default = "None")]
    pub checkpoint_dir: Option<PathBuf>,
}

impl TrainingConfig {
    /// # Errors
    ///
    /// Returns `Err(DfdnError::InvalidConfiguration)` for a zero batch size or a
    /// non-positive learning rate or clip norm.
    pub fn validate(&self) -> DfdnResult<()> {
        if self.batch_size == 0 {
            return Err(DfdnError::InvalidConfiguration {
                reason: "batch_size must be positive".to_owned(),
            });
        }
        if self.learning_rate <= 0.0 || self.grad_clip_norm <= 0.0 {
            return Err(DfdnError::InvalidConfiguration {
                reason: format!(
                    "learning_rate ({}) and grad_clip_norm ({}) must be positive",
                    self.learning_rate, self.grad_clip_norm
                ),
            });
        }
        Ok(())
    }
}

/// Metrics of one epoch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpochMetrics {
    /// One-based epoch number.
    pub epoch: usize,
    /// Mean total loss over the applied steps.
    pub loss: f64,
    pub classification_loss: f64,
    pub contrastive_loss: f64,
    pub orthogonality_loss: f64,
    pub train_accuracy: f64,
    pub val_loss: Option<f64>,
    pub val_accuracy: Option<f64>,
    /// Best validation accuracy so far.
    pub best_val_accuracy: Option<f64>,
}

/// Everything recorded during [Trainer::fit].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochMetrics>,
    pub best_val_accuracy: Option<f64>,
    /// Epoch whose parameters were restored.
    pub best_epoch: Option<usize>,
    pub stopped_early: bool,
}

impl TrainingHistory {
    /// Number of completed epochs.
    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }
}

#[derive(Default)]
struct EpochTotals {
    loss: f64,
    classification: f64,
    contrastive: f64,
    orthogonality: f64,
    correct: usize,
    samples: usize,
    steps: usize,
}

impl EpochTotals {
    fn mean(&self, sum: f64) -> f64 {
        if self.steps == 0 {
            f64::NAN
        } else {
            sum / self.steps as f64
        }
    }

    fn accuracy(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.correct as f64 / self.samples as f64
        }
    }
}

fn scalar<B: Backend>(tensor: &Tensor<B, 1>) -> f64 {
    tensor.clone().into_scalar().elem::<f64>()
}

/// Runs the training loop for a [TrainingConfig].
#[derive(Debug, Clone)]
pub struct Trainer {
    config: TrainingConfig,
}

impl Trainer {
    pub const fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    pub const fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Train `model` on `train`, optionally selecting the best epoch on `valid`.
    ///
    /// With zero epochs the model is returned untouched with an empty history.
    ///
    /// # Errors
    ///
    /// Returns `Err(DfdnError::InvalidConfiguration)` for an invalid training
    /// configuration, `Err(DfdnError::Dataset)` when a dataset does not match
    /// the model, and checkpoint errors from writing improvements.
    pub fn fit<B: AutodiffBackend>(
        &self,
        model: Dfdn<B>,
        train: StrokeDataset,
        valid: Option<StrokeDataset>,
        device: &B::Device,
    ) -> DfdnResult<(Dfdn<B>, TrainingHistory)> {
        let config = &self.config;
        config.validate()?;

        let mut history = TrainingHistory::default();
        if config.num_epochs == 0 {
            tracing::info!("num_epochs is 0, nothing to train");
            return Ok((model, history));
        }

        train.check_config(model.config())?;
        if let Some(valid) = &valid {
            valid.check_config(model.config())?;
        }

        B::seed(config.seed);
        let num_classes = model.config().num_classes;
        let train_len = train.len();
        let train = if config.class_balanced {
            train.with_class_weights(num_classes)
        } else {
            train.without_weights()
        };

        let train_loader: Arc<dyn DataLoader<B, DfdnBatch<B>>> =
            DataLoaderBuilder::new(StrokeBatcher::new(num_classes))
                .batch_size(config.batch_size)
                .shuffle(config.seed)
                .set_device(device.clone())
                .build(train);
        let valid_loader = valid.map(|valid| {
            let loader: Arc<dyn DataLoader<B::InnerBackend, DfdnBatch<B::InnerBackend>>> =
                DataLoaderBuilder::new(StrokeBatcher::new(num_classes))
                    .batch_size(config.batch_size)
                    .set_device(device.clone())
                    .build(valid.without_weights());
            loader
        });

        let mut optimizer = AdamConfig::new()
            .with_beta_1(0.9)
            .with_beta_2(0.999)
            .with_epsilon(1e-7)
            .with_grad_clipping(Some(GradientClippingConfig::Norm(
                config.grad_clip_norm as f32,
            )))
            .init::<B, Dfdn<B>>();

        tracing::info!(
            samples = train_len,
            epochs = config.num_epochs,
            batch_size = config.batch_size,
            learning_rate = config.learning_rate,
            validation = valid_loader.is_some(),
            "starting training"
        );

        let drop_remainder = train_len >= config.batch_size;
        let mut model = model;
        let mut best: Option<DfdnRecord<B>> = None;
        let mut best_accuracy = 0.0;
        let mut epochs_without_improvement = 0;

        for epoch in 1..=config.num_epochs {
            let mut totals = EpochTotals::default();

            for (iteration, batch) in train_loader.iter().enumerate() {
                let batch_size = batch.batch_size();
                if drop_remainder && batch_size < config.batch_size {
                    continue;
                }

                let output = TrainStep::<DfdnBatch<B>, DfdnStepOutput<B>>::step(&model, batch);
                let item = output.item;
                let loss = scalar(&item.loss);
                if !loss.is_finite() {
                    tracing::warn!(epoch, iteration, "non-finite loss, skipping update");
                    continue;
                }

                totals.loss += loss;
                totals.classification += scalar(&item.classification_loss);
                totals.contrastive += scalar(&item.contrastive_loss);
                totals.orthogonality += scalar(&item.orthogonality_loss);
                totals.correct += item.correct();
                totals.samples += batch_size;
                totals.steps += 1;

                model = optimizer.step(config.learning_rate, model, output.grads);
                tracing::debug!(epoch, iteration, loss, "batch complete");
            }

            let mut metrics = EpochMetrics {
                epoch,
                loss: totals.mean(totals.loss),
                classification_loss: totals.mean(totals.classification),
                contrastive_loss: totals.mean(totals.contrastive),
                orthogonality_loss: totals.mean(totals.orthogonality),
                train_accuracy: totals.accuracy(),
                val_loss: None,
                val_accuracy: None,
                best_val_accuracy: None,
            };

            let mut stop = false;
            if let Some(loader) = &valid_loader {
                let (val_loss, val_accuracy) = evaluate(&model.valid(), loader.as_ref());
                metrics.val_loss = Some(val_loss);
                metrics.val_accuracy = Some(val_accuracy);

                if val_accuracy > best_accuracy {
                    tracing::info!(epoch, val_accuracy, "validation accuracy improved");
                    best_accuracy = val_accuracy;
                    best = Some(model.clone().into_record());
                    history.best_epoch = Some(epoch);
                    history.best_val_accuracy = Some(val_accuracy);
                    epochs_without_improvement = 0;

                    if let Some(dir) = &config.checkpoint_dir {
                        model.save_checkpoint(model.checkpoint_path(dir))?;
                    }
                } else {
                    epochs_without_improvement += 1;
                    stop = epochs_without_improvement >= config.early_stopping_patience;
                }
                metrics.best_val_accuracy = Some(best_accuracy);
            }

            tracing::info!(
                epoch,
                loss = metrics.loss,
                classification_loss = metrics.classification_loss,
                contrastive_loss = metrics.contrastive_loss,
                orthogonality_loss = metrics.orthogonality_loss,
                train_accuracy = metrics.train_accuracy,
                val_loss = metrics.val_loss,
                val_accuracy = metrics.val_accuracy,
                "epoch complete"
            );
            history.epochs.push(metrics);

            if stop {
                tracing::info!(
                    epoch,
                    patience = config.early_stopping_patience,
                    "early stopping"
                );
                history.stopped_early = true;
                break;
            }
        }

        if let Some(record) = best {
            tracing::info!(epoch = history.best_epoch, "restoring best parameters");
            model = model.load_record(record);
        }

        Ok((model, history))
    }
}

/// Mean validation loss and accuracy over all samples.
fn evaluate<B: Backend>(model: &Dfdn<B>, loader: &dyn DataLoader<B, DfdnBatch<B>>) -> (f64, f64) {
    let mut loss = 0.0;
    let mut correct = 0;
    let mut samples = 0;

    for batch in loader.iter() {
        let batch_size = batch.batch_size();
        let output = ValidStep::<DfdnBatch<B>, DfdnStepOutput<B>>::step(model, batch);
        loss += scalar(&output.loss) * batch_size as f64;
        correct += output.correct();
        samples += batch_size;
    }

    if samples == 0 {
        return (f64::NAN, 0.0);
    }
    (loss / samples as f64, correct as f64 / samples as f64)
}

#[cfg(test)]
mod tests {
    use burn::tensor::{Distribution, Tolerance};

    use super::*;
    use crate::{
        tests::{small_config, TestAutodiffBackend, TestBackend},
        training::StrokeItem,
    };

    const PIXELS: usize = 64 * 64;

    fn random_dataset(labels: &[usize]) -> StrokeDataset {
        let device = Default::default();
        let items = labels
            .iter()
            .map(|&label| {
                let image = Tensor::<TestBackend, 1>::random(
                    [PIXELS],
                    Distribution::Uniform(0.0, 1.0),
                    &device,
                )
                .into_data()
                .to_vec::<f32>()
                .unwrap();
                StrokeItem::new(image, [1, 64, 64], label)
            })
            .collect();
        StrokeDataset::new(items).unwrap()
    }

    fn zero_dataset(labels: &[usize]) -> StrokeDataset {
        let items = labels
            .iter()
            .map(|&label| StrokeItem::new(vec![0.0; PIXELS], [1, 64, 64], label))
            .collect();
        StrokeDataset::new(items).unwrap()
    }

    fn probe() -> Tensor<TestBackend, 4> {
        Tensor::random(
            [2, 1, 64, 64],
            Distribution::Uniform(0.0, 1.0),
            &Default::default(),
        )
    }

    #[test]
    fn zero_epochs_return_untouched_model() {
        let device = Default::default();
        let model = small_config().init::<TestAutodiffBackend>(&device).unwrap();
        let images = probe();
        let before = model.valid().predict(images.clone()).unwrap();

        let trainer = Trainer::new(TrainingConfig::new().with_num_epochs(0));
        let (model, history) = trainer
            .fit(model, random_dataset(&[0, 1, 2]), None, &device)
            .unwrap();

        assert!(history.is_empty());
        assert_eq!(history.best_epoch, None);
        before.into_data().assert_approx_eq::<f32>(
            &model.valid().predict(images).unwrap().into_data(),
            Tolerance::default(),
        );
    }

    #[test]
    fn training_records_finite_losses_per_epoch() {
        let device = Default::default();
        let model = small_config().init::<TestAutodiffBackend>(&device).unwrap();
        let trainer = Trainer::new(
            TrainingConfig::new()
                .with_num_epochs(2)
                .with_batch_size(3),
        );

        let (_, history) = trainer
            .fit(model, random_dataset(&[0, 1, 2, 0, 1, 2]), None, &device)
            .unwrap();

        assert_eq!(history.len(), 2);
        for metrics in &history.epochs {
            assert!(metrics.loss.is_finite());
            assert!(metrics.classification_loss > 0.0);
            assert!(metrics.contrastive_loss.is_finite());
            assert!(metrics.orthogonality_loss >= 0.0);
            assert!((0.0..=1.0).contains(&metrics.train_accuracy));
            assert_eq!(metrics.val_accuracy, None);
        }
        assert!(!history.stopped_early);
    }

    #[test]
    fn early_stopping_restores_best_checkpoint() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let model = small_config().init::<TestAutodiffBackend>(&device).unwrap();
        let trainer = Trainer::new(
            TrainingConfig::new()
                .with_num_epochs(3)
                .with_batch_size(4)
                .with_early_stopping_patience(1)
                .with_checkpoint_dir(Some(dir.path().to_path_buf())),
        );

        // Identical validation images get identical predictions, so exactly
        // one of the three labels is matched every epoch.
        let (model, history) = trainer
            .fit(
                model,
                random_dataset(&[0, 1, 2, 0]),
                Some(zero_dataset(&[0, 1, 2])),
                &device,
            )
            .unwrap();

        assert_eq!(history.len(), 2);
        assert!(history.stopped_early);
        assert_eq!(history.best_epoch, Some(1));
        let best = history.best_val_accuracy.unwrap();
        assert!((best - 1.0 / 3.0).abs() < 1e-9);

        let mut loaded = small_config().init::<TestBackend>(&device).unwrap();
        let path = loaded.checkpoint_path(dir.path());
        assert!(path.with_extension("mpk").is_file());
        loaded.load_checkpoint(&path, &device).unwrap();

        let images = probe();
        model
            .valid()
            .predict(images.clone())
            .unwrap()
            .into_data()
            .assert_approx_eq::<f32>(
                &loaded.predict(images).unwrap().into_data(),
                Tolerance::default(),
            );
    }

    #[test]
    fn best_validation_accuracy_never_decreases() {
        let device = Default::default();
        let model = small_config().init::<TestAutodiffBackend>(&device).unwrap();
        let trainer = Trainer::new(
            TrainingConfig::new()
                .with_num_epochs(3)
                .with_batch_size(2)
                .with_early_stopping_patience(5)
                .with_class_balanced(false),
        );

        let (_, history) = trainer
            .fit(
                model,
                random_dataset(&[0, 1, 2, 2]),
                Some(random_dataset(&[0, 1, 2])),
                &device,
            )
            .unwrap();

        assert_eq!(history.len(), 3);
        let best: Vec<f64> = history
            .epochs
            .iter()
            .map(|metrics| metrics.best_val_accuracy.unwrap())
            .collect();
        assert!(best.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn mismatched_dataset_is_rejected() {
        let device = Default::default();
        let model = small_config().init::<TestAutodiffBackend>(&device).unwrap();
        let wrong = StrokeDataset::new(vec![StrokeItem::new(vec![0.0; 16], [1, 4, 4], 0)]).unwrap();

        let result = Trainer::new(TrainingConfig::new().with_num_epochs(1))
            .fit(model, wrong, None, &device);

        assert!(matches!(result, Err(DfdnError::Dataset { .. })));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        assert!(TrainingConfig::new().with_batch_size(0).validate().is_err());
    }
}
