//! Train DFDN on an image folder.
//!
//! The folder holds one sub-directory per class (`normal`, `ischemic`,
//! `hemorrhagic`). The best checkpoint is written to the checkpoint
//! directory and the per-epoch history to `history.json` next to it.
//!
//! ```bash
//! cargo run --release --bin train -- --train-dir data/ct/train --valid-dir data/ct/val --modality ct
//! cargo run --release --bin train --no-default-features --features wgpu -- --train-dir data/mri/train --modality mri
//! ```

use std::path::PathBuf;

use anyhow::{ensure, Context, Result};
use clap::Parser;
use dfdn_burn::{
    training::{load_image_folder, Trainer, TrainingConfig},
    DfdnConfig, Modality,
};
use dfdn_demos::{create_device, get_backend_name, init_logging, write_json, TrainingBackend};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Training image folder
    #[arg(long)]
    train_dir: PathBuf,

    /// Validation image folder used for early stopping
    #[arg(long)]
    valid_dir: Option<PathBuf>,

    /// Imaging modality (ct or mri)
    #[arg(long, default_value = "ct")]
    modality: String,

    /// Model configuration file (JSON)
    #[arg(long)]
    model_config: Option<PathBuf>,

    /// Training configuration file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override number of epochs
    #[arg(long)]
    num_epochs: Option<usize>,

    /// Override batch size
    #[arg(long)]
    batch_size: Option<usize>,

    /// Override learning rate
    #[arg(long)]
    learning_rate: Option<f64>,

    /// Checkpoint directory
    #[arg(long, default_value = "checkpoints")]
    checkpoint_dir: PathBuf,
}

fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    let modality: Modality = args.modality.parse()?;
    let model_config = match &args.model_config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read model config: {}", path.display()))?;
            serde_json::from_str::<DfdnConfig>(&text)
                .with_context(|| format!("Failed to parse model config: {}", path.display()))?
        }
        None => DfdnConfig::new(),
    }
    .with_modality(modality.clone());

    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read training config: {}", path.display()))?;
            serde_json::from_str::<TrainingConfig>(&text)
                .with_context(|| format!("Failed to parse training config: {}", path.display()))?
        }
        None => TrainingConfig::new(),
    };
    if let Some(num_epochs) = args.num_epochs {
        config.num_epochs = num_epochs;
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(learning_rate) = args.learning_rate {
        config.learning_rate = learning_rate;
    }
    config.checkpoint_dir = Some(args.checkpoint_dir.clone());

    ensure!(
        args.train_dir.is_dir(),
        "Training dataset path does not exist: {}",
        args.train_dir.display()
    );

    tracing::info!(
        backend = get_backend_name(),
        modality = modality.name(),
        epochs = config.num_epochs,
        batch_size = config.batch_size,
        learning_rate = config.learning_rate,
        "starting training"
    );

    let train = load_image_folder(&args.train_dir, &model_config)
        .with_context(|| format!("Failed to load {}", args.train_dir.display()))?;
    let valid = args
        .valid_dir
        .as_ref()
        .map(|dir| {
            load_image_folder(dir, &model_config)
                .with_context(|| format!("Failed to load {}", dir.display()))
        })
        .transpose()?;

    let device = create_device();
    let model = model_config.init::<TrainingBackend>(&device)?;
    let (model, history) = Trainer::new(config).fit(model, train, valid, &device)?;

    let history_path = args.checkpoint_dir.join("history.json");
    write_json(&history_path, &history)?;

    // Without validation data nothing was checkpointed along the way.
    if history.best_epoch.is_none() {
        model.save_checkpoint(model.checkpoint_path(&args.checkpoint_dir))?;
    }

    tracing::info!(
        epochs = history.len(),
        best_epoch = ?history.best_epoch,
        best_val_accuracy = ?history.best_val_accuracy,
        stopped_early = history.stopped_early,
        "training finished"
    );
    Ok(())
}
