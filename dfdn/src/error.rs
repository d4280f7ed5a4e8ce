use std::path::PathBuf;

use thiserror::Error;

/// The error type for DFDN operations.
///
/// Construction and shape errors surface before any tensor work is done.
/// Numerical problems inside a training step are not errors; they are masked
/// in the loss and only show up in the returned training history.
#[derive(Error, Debug)]
pub enum DfdnError {
    /// Hyper-parameters that cannot describe a valid network.
    #[error("Invalid model configuration: {reason}")]
    InvalidConfiguration {
        /// Why the configuration was rejected.
        reason: String,
    },

    /// An input tensor does not have the configured shape.
    #[error("Invalid input tensor shape: expected {expected}, got {actual}")]
    InvalidTensorShape {
        /// The expected tensor shape.
        expected: String,
        /// The actual tensor shape.
        actual: String,
    },

    /// No checkpoint exists at the requested location.
    #[error("Checkpoint not found: {}", path.display())]
    CheckpointNotFound {
        /// The checkpoint file that was looked up.
        path: PathBuf,
    },

    /// A checkpoint trained for one modality was loaded into a model for another.
    #[error("Checkpoint modality mismatch: model expects {expected}, checkpoint holds {found}")]
    ModalityMismatch {
        /// Modality of the receiving model.
        expected: String,
        /// Modality recorded next to the checkpoint.
        found: String,
    },

    /// The recorder failed to write or read a checkpoint.
    #[error("Checkpoint error: {reason}")]
    Checkpoint {
        /// Recorder failure description.
        reason: String,
    },

    /// Dataset construction or image decoding failed.
    #[error("Dataset error: {message}")]
    Dataset {
        /// The error message.
        message: String,
    },

    /// Feature analysis received unusable input.
    #[error("Feature analysis error: {reason}")]
    Analysis {
        /// Why the analysis could not run.
        reason: String,
    },

    /// File system failure.
    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

/// A specialized `Result` type for DFDN operations.
pub type DfdnResult<T> = Result<T, DfdnError>;
