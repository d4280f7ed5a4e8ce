//! Enumeration types for DFDN configuration.

use std::str::FromStr;

use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::DfdnError;

pub use resnet::ResNetVariant;

/// Imaging source. Each modality owns an independently trained parameter set.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum Modality {
    /// Computed tomography.
    Ct,
    /// Magnetic resonance imaging.
    Mri,
}

impl Modality {
    /// Lower-case tag used in checkpoint file names.
    #[must_use]
    pub const fn slug(&self) -> &'static str {
        match self {
            Self::Ct => "ct",
            Self::Mri => "mri",
        }
    }

    /// Human readable name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Ct => "CT",
            Self::Mri => "MRI",
        }
    }
}

impl FromStr for Modality {
    type Err = DfdnError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "ct" => Ok(Self::Ct),
            "mri" => Ok(Self::Mri),
            other => Err(DfdnError::InvalidConfiguration {
                reason: format!("unknown modality '{other}', expected 'ct' or 'mri'"),
            }),
        }
    }
}

/// Numeric precision of stored checkpoints.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum Precision {
    /// 32-bit floats.
    F32,
    /// 16-bit floats.
    F16,
}

/// Diagnostic classes, in output-logit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrokeClass {
    Normal,
    Ischemic,
    Hemorrhagic,
}

impl StrokeClass {
    /// All classes by logit index.
    pub const ALL: [Self; 3] = [Self::Normal, Self::Ischemic, Self::Hemorrhagic];

    /// Class for a logit index.
    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    #[must_use]
    pub const fn index(&self) -> usize {
        match self {
            Self::Normal => 0,
            Self::Ischemic => 1,
            Self::Hemorrhagic => 2,
        }
    }

    /// Name as shown in reports.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Ischemic => "Ischemic stroke",
            Self::Hemorrhagic => "Hemorrhagic stroke",
        }
    }

    /// Sub-directory name used by image-folder datasets.
    #[must_use]
    pub const fn folder(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Ischemic => "ischemic",
            Self::Hemorrhagic => "hemorrhagic",
        }
    }
}
