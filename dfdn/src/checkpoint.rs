//! Checkpoint persistence.
//!
//! A checkpoint at `<path>` is two files:
//!
//! - `<path>.mpk`: the parameter record, written with Burn's named MessagePack recorder
//! - `<path>.json`: the [DfdnConfig] the parameters were trained with
//!
//! The record is first written to `<stem>-partial.mpk` and then renamed over
//! the final name, so a reader never observes a half-written record.

use std::{
    fs,
    path::{Path, PathBuf},
};

use burn::{
    prelude::*,
    record::{FullPrecisionSettings, HalfPrecisionSettings, NamedMpkFileRecorder, Recorder},
};

use crate::{
    config::{DfdnConfig, Modality, Precision},
    error::{DfdnError, DfdnResult},
    models::{Dfdn, DfdnRecord},
};

const RECORD_EXTENSION: &str = "mpk";
const CONFIG_EXTENSION: &str = "json";

/// Conventional checkpoint location for a modality: `dir/dfdn_{ct|mri}_model`.
pub fn checkpoint_path(dir: impl AsRef<Path>, modality: &Modality) -> PathBuf {
    dir.as_ref()
        .join(format!("dfdn_{}_model", modality.slug()))
}

fn partial_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{stem}-partial"))
}

fn recorder_error(action: &str, path: &Path, error: impl std::fmt::Display) -> DfdnError {
    DfdnError::Checkpoint {
        reason: format!("failed to {action} {}: {error}", path.display()),
    }
}

impl<B: Backend> Dfdn<B> {
    /// Conventional checkpoint location for this model's modality.
    pub fn checkpoint_path(&self, dir: impl AsRef<Path>) -> PathBuf {
        checkpoint_path(dir, self.modality())
    }

    /// Persist parameters and configuration.
    ///
    /// The record is stored in the precision selected by
    /// [ExecutionConfig::precision](crate::config::ExecutionConfig).
    ///
    /// # Errors
    ///
    /// Returns `Err(DfdnError::Checkpoint)` if the recorder fails and
    /// `Err(DfdnError::Io)` for file system failures.
    pub fn save_checkpoint(&self, path: impl AsRef<Path>) -> DfdnResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let partial = partial_path(path);
        let result = match self.config().execution.precision {
            Precision::F32 => self.clone().save_file(
                partial.clone(),
                &NamedMpkFileRecorder::<FullPrecisionSettings>::new(),
            ),
            Precision::F16 => self.clone().save_file(
                partial.clone(),
                &NamedMpkFileRecorder::<HalfPrecisionSettings>::new(),
            ),
        };
        result.map_err(|e| recorder_error("write", &partial, e))?;

        let record_path = path.with_extension(RECORD_EXTENSION);
        fs::rename(partial.with_extension(RECORD_EXTENSION), &record_path)?;
        self.config().save(path.with_extension(CONFIG_EXTENSION))?;

        tracing::info!(
            path = %record_path.display(),
            modality = self.modality().name(),
            "checkpoint saved"
        );
        Ok(())
    }

    /// Replace the parameters with those stored at `path`.
    ///
    /// When the configuration file is present, its modality and architecture
    /// must match this model. On any error the parameters are left untouched.
    ///
    /// # Errors
    ///
    /// - `Err(DfdnError::CheckpointNotFound)` if no record exists at `path`
    /// - `Err(DfdnError::ModalityMismatch)` if the checkpoint is for another modality
    /// - `Err(DfdnError::InvalidConfiguration)` if the architectures differ
    /// - `Err(DfdnError::Checkpoint)` if the record cannot be read
    pub fn load_checkpoint(&mut self, path: impl AsRef<Path>, device: &B::Device) -> DfdnResult<()> {
        let path = path.as_ref();
        let record_path = path.with_extension(RECORD_EXTENSION);
        if !record_path.is_file() {
            return Err(DfdnError::CheckpointNotFound { path: record_path });
        }

        let mut precision = self.config().execution.precision.clone();
        let config_path = path.with_extension(CONFIG_EXTENSION);
        if config_path.is_file() {
            let stored = DfdnConfig::load(&config_path)
                .map_err(|e| recorder_error("read", &config_path, e))?;
            self.check_compatible(&stored)?;
            precision = stored.execution.precision;
        }

        let record: DfdnRecord<B> = match precision {
            Precision::F32 => NamedMpkFileRecorder::<FullPrecisionSettings>::new()
                .load(record_path.clone(), device),
            Precision::F16 => NamedMpkFileRecorder::<HalfPrecisionSettings>::new()
                .load(record_path.clone(), device),
        }
        .map_err(|e| recorder_error("read", &record_path, e))?;

        *self = self.clone().load_record(record);
        tracing::info!(path = %record_path.display(), "checkpoint loaded");
        Ok(())
    }

    /// Build a model from `config` and load the checkpoint for its modality from `dir`.
    ///
    /// # Errors
    ///
    /// See [DfdnConfig::init] and [Dfdn::load_checkpoint].
    pub fn load_for_modality(
        config: &DfdnConfig,
        dir: impl AsRef<Path>,
        device: &B::Device,
    ) -> DfdnResult<Self> {
        let path = checkpoint_path(dir, &config.modality);
        let record_path = path.with_extension(RECORD_EXTENSION);
        if !record_path.is_file() {
            return Err(DfdnError::CheckpointNotFound { path: record_path });
        }

        let mut model = config.init(device)?;
        model.load_checkpoint(&path, device)?;
        Ok(model)
    }

    fn check_compatible(&self, stored: &DfdnConfig) -> DfdnResult<()> {
        let config = self.config();
        if stored.modality != config.modality {
            return Err(DfdnError::ModalityMismatch {
                expected: config.modality.name().to_owned(),
                found: stored.modality.name().to_owned(),
            });
        }
        if !config.same_architecture(stored) {
            return Err(DfdnError::InvalidConfiguration {
                reason: "checkpoint was trained with a different architecture".to_owned(),
            });
        }
        Ok(())
    }
}
