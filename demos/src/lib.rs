//! Command-line tools for DFDN.
//!
//! - `train`: fit a model on an image folder and write the best checkpoint
//! - `analyze`: diagnose scans with a trained checkpoint
//!
//! ```bash
//! cargo run --release --bin train -- --train-dir data/train --valid-dir data/val --modality ct
//! cargo run --release --bin analyze -- --checkpoint-dir checkpoints --modality ct scan.png
//! ```

pub mod backend;

use std::path::Path;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

pub use backend::{
    create_device, get_backend_name, SelectedBackend, SelectedDevice, TrainingBackend,
};

/// Install a `fmt` subscriber honouring `RUST_LOG`, defaulting to `info`.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Write `value` as pretty JSON, creating parent directories.
pub fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(value).context("Failed to serialize JSON")?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}
