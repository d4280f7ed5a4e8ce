//! Per-image diagnostic reports.

use std::fmt;

use burn::{prelude::*, tensor::activation::softmax};
use serde::Serialize;

use super::{
    heatmap::{pathology_heatmap, HeatmapConfig},
    stats::{tensor_rows, FeatureAnalysis},
};
use crate::{config::StrokeClass, error::DfdnResult, models::Dfdn};

/// Confidence above which a diagnosis is considered reliable.
pub const HIGH_CONFIDENCE: f64 = 0.9;
/// Confidence above which a diagnosis is considered likely.
pub const MODERATE_CONFIDENCE: f64 = 0.7;

/// Verbal grading of the top class probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConfidenceLevel {
    /// Above 0.9.
    High,
    /// Above 0.7.
    Moderate,
    Low,
}

impl ConfidenceLevel {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence > HIGH_CONFIDENCE {
            Self::High
        } else if confidence > MODERATE_CONFIDENCE {
            Self::Moderate
        } else {
            Self::Low
        }
    }

    pub const fn describe(&self) -> &'static str {
        match self {
            Self::High => "highly likely",
            Self::Moderate => "moderately likely",
            Self::Low => "possibly",
        }
    }
}

/// Predicted class of one image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnosis {
    /// Arg-max of the probabilities.
    pub class_index: usize,
    /// `None` when the model has more classes than [StrokeClass] names.
    pub class: Option<StrokeClass>,
    /// Probability of the predicted class.
    pub confidence: f64,
    pub probabilities: Vec<f32>,
    pub confidence_level: ConfidenceLevel,
    /// Set below 0.9 confidence.
    pub needs_clinical_confirmation: bool,
}

impl Diagnosis {
    /// Diagnosis for one row of class probabilities. Ties go to the lower index.
    pub fn from_probabilities(probabilities: Vec<f32>) -> Self {
        let (class_index, confidence) = probabilities
            .iter()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |best, (index, &p)| {
                if p > best.1 {
                    (index, p)
                } else {
                    best
                }
            });
        let confidence = f64::from(confidence.max(0.0));

        Self {
            class_index,
            class: StrokeClass::from_index(class_index),
            confidence,
            probabilities,
            confidence_level: ConfidenceLevel::from_confidence(confidence),
            needs_clinical_confirmation: confidence < HIGH_CONFIDENCE,
        }
    }

    /// Display name of the predicted class.
    pub fn label(&self) -> String {
        self.class
            .map_or_else(|| format!("class {}", self.class_index), |class| class.label().to_owned())
    }
}

/// Everything derived from one image.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticReport {
    pub diagnosis: Diagnosis,
    pub pathology: Vec<f32>,
    pub physiology: Vec<f32>,
    /// Row-major heat-map of `heatmap_size`.
    pub heatmap: Vec<f32>,
    /// `[height, width]`
    pub heatmap_size: [usize; 2],
    pub features: FeatureAnalysis,
}

impl<B: Backend> Dfdn<B> {
    /// Classify a batch and attach embeddings, heat-maps and feature statistics.
    ///
    /// `original_size` is the `[height, width]` of the images before
    /// preprocessing; heat-maps are produced at that size.
    ///
    /// # Errors
    ///
    /// Returns `Err(DfdnError::InvalidTensorShape)` for a badly shaped batch
    /// and the errors of [pathology_heatmap] for an unusable heat-map setup.
    pub fn diagnose(
        &self,
        images: Tensor<B, 4>,
        original_size: [usize; 2],
        heatmap: &HeatmapConfig,
    ) -> DfdnResult<Vec<DiagnosticReport>> {
        let output = self.forward(images)?;
        let [batch_size, _] = output.logits.dims();
        let [height, width] = original_size;

        let maps = pathology_heatmap(output.pathology.clone(), original_size, heatmap)?;
        let maps = tensor_rows(maps.reshape([batch_size, height * width]))?;
        let probabilities = tensor_rows(softmax(output.logits, 1))?;
        let pathology = tensor_rows(output.pathology)?;
        let physiology = tensor_rows(output.physiology)?;

        probabilities
            .into_iter()
            .zip(maps)
            .zip(pathology.into_iter().zip(physiology))
            .map(|((probabilities, heatmap), (pathology, physiology))| {
                let features = FeatureAnalysis::from_vectors(&pathology, &physiology)?;
                let diagnosis = Diagnosis::from_probabilities(probabilities);
                tracing::debug!(
                    class = %diagnosis.label(),
                    confidence = diagnosis.confidence,
                    "diagnosis"
                );

                Ok(DiagnosticReport {
                    diagnosis,
                    pathology,
                    physiology,
                    heatmap,
                    heatmap_size: original_size,
                    features,
                })
            })
            .collect()
    }
}

impl fmt::Display for DiagnosticReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let diagnosis = &self.diagnosis;
        let rule = "-".repeat(40);

        writeln!(f, "{rule}\nDiagnosis\n{rule}")?;
        writeln!(f, "Class: {}", diagnosis.label())?;
        writeln!(f, "Confidence: {:.4}\n", diagnosis.confidence)?;
        writeln!(f, "Class probabilities:")?;
        for (index, probability) in diagnosis.probabilities.iter().enumerate() {
            let name = StrokeClass::from_index(index)
                .map_or_else(|| format!("class {index}"), |class| class.label().to_owned());
            writeln!(f, "  {name}: {probability:.4}")?;
        }

        writeln!(f, "\n{rule}\nFeature analysis\n{rule}")?;
        for (title, stats) in [
            ("Pathology", &self.features.pathology),
            ("Physiology", &self.features.physiology),
        ] {
            writeln!(f, "{title} features:")?;
            writeln!(f, "  mean: {:.6}", stats.mean)?;
            writeln!(f, "  std: {:.6}", stats.std)?;
            writeln!(f, "  max: {:.6}", stats.max)?;
            writeln!(f, "  min: {:.6}", stats.min)?;
            writeln!(f, "  median: {:.6}", stats.median)?;
            writeln!(f, "  nonzero fraction: {:.6}", stats.nonzero_fraction)?;
        }
        let similarity = &self.features.similarity;
        writeln!(f, "Similarity:")?;
        writeln!(f, "  cosine: {:.6}", similarity.cosine_similarity)?;
        match similarity.pearson_correlation {
            Some(r) => writeln!(f, "  correlation: {r:.6}")?,
            None => writeln!(f, "  correlation: undefined")?,
        }

        writeln!(f, "\n{rule}\nRecommendation\n{rule}")?;
        writeln!(
            f,
            "- {} {}",
            capitalize(diagnosis.confidence_level.describe()),
            diagnosis.label().to_lowercase()
        )?;
        if diagnosis.needs_clinical_confirmation {
            writeln!(f, "- Further clinical confirmation is advised")
        } else {
            writeln!(f, "- High diagnostic confidence")
        }
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}
