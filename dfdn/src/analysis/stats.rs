//! Descriptive statistics of the pathology and physiology embeddings.

use burn::prelude::*;
use serde::Serialize;

use crate::error::{DfdnError, DfdnResult};

/// Summary statistics of one embedding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureStatistics {
    pub mean: f64,
    /// Population standard deviation.
    pub std: f64,
    pub max: f64,
    pub min: f64,
    pub median: f64,
    /// Share of entries that are not zero.
    pub nonzero_fraction: f64,
}

impl FeatureStatistics {
    /// # Errors
    ///
    /// Returns `Err(DfdnError::Analysis)` for an empty slice.
    pub fn from_values(values: &[f32]) -> DfdnResult<Self> {
        if values.is_empty() {
            return Err(DfdnError::Analysis {
                reason: "cannot summarise an empty feature vector".to_owned(),
            });
        }

        let count = values.len() as f64;
        let mean = values.iter().map(|&v| f64::from(v)).sum::<f64>() / count;
        let variance = values
            .iter()
            .map(|&v| (f64::from(v) - mean).powi(2))
            .sum::<f64>()
            / count;

        let mut sorted: Vec<f64> = values.iter().map(|&v| f64::from(v)).collect();
        sorted.sort_by(f64::total_cmp);
        let middle = sorted.len() / 2;
        let median = if sorted.len() % 2 == 0 {
            (sorted[middle - 1] + sorted[middle]) / 2.0
        } else {
            sorted[middle]
        };

        Ok(Self {
            mean,
            std: variance.sqrt(),
            max: sorted[sorted.len() - 1],
            min: sorted[0],
            median,
            nonzero_fraction: values.iter().filter(|&&v| v != 0.0).count() as f64 / count,
        })
    }
}

/// Similarity between the pathology and physiology embeddings of one sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureSimilarity {
    /// Zero when either vector has zero norm.
    pub cosine_similarity: f64,
    /// `None` when either vector is constant.
    pub pearson_correlation: Option<f64>,
}

impl FeatureSimilarity {
    /// # Errors
    ///
    /// Returns `Err(DfdnError::Analysis)` for empty or unequal-length vectors.
    pub fn between(pathology: &[f32], physiology: &[f32]) -> DfdnResult<Self> {
        if pathology.is_empty() || pathology.len() != physiology.len() {
            return Err(DfdnError::Analysis {
                reason: format!(
                    "feature vectors must be non-empty and of equal length, got {} and {}",
                    pathology.len(),
                    physiology.len()
                ),
            });
        }

        let p: Vec<f64> = pathology.iter().map(|&v| f64::from(v)).collect();
        let q: Vec<f64> = physiology.iter().map(|&v| f64::from(v)).collect();

        let dot = p.iter().zip(&q).map(|(a, b)| a * b).sum::<f64>();
        let norm_p = p.iter().map(|a| a * a).sum::<f64>().sqrt();
        let norm_q = q.iter().map(|b| b * b).sum::<f64>().sqrt();
        let cosine_similarity = if norm_p == 0.0 || norm_q == 0.0 {
            0.0
        } else {
            (dot / (norm_p * norm_q)).clamp(-1.0, 1.0)
        };

        Ok(Self {
            cosine_similarity,
            pearson_correlation: pearson(&p, &q),
        })
    }
}

fn pearson(p: &[f64], q: &[f64]) -> Option<f64> {
    let count = p.len() as f64;
    let mean_p = p.iter().sum::<f64>() / count;
    let mean_q = q.iter().sum::<f64>() / count;

    let (mut covariance, mut var_p, mut var_q) = (0.0, 0.0, 0.0);
    for (a, b) in p.iter().zip(q) {
        let (da, db) = (a - mean_p, b - mean_q);
        covariance += da * db;
        var_p += da * da;
        var_q += db * db;
    }

    if var_p == 0.0 || var_q == 0.0 {
        return None;
    }
    Some((covariance / (var_p * var_q).sqrt()).clamp(-1.0, 1.0))
}

/// Statistics of both embeddings and their similarity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureAnalysis {
    pub pathology: FeatureStatistics,
    pub physiology: FeatureStatistics,
    pub similarity: FeatureSimilarity,
}

impl FeatureAnalysis {
    /// # Errors
    ///
    /// Returns `Err(DfdnError::Analysis)` for empty or unequal-length vectors.
    pub fn from_vectors(pathology: &[f32], physiology: &[f32]) -> DfdnResult<Self> {
        Ok(Self {
            similarity: FeatureSimilarity::between(pathology, physiology)?,
            pathology: FeatureStatistics::from_values(pathology)?,
            physiology: FeatureStatistics::from_values(physiology)?,
        })
    }
}

/// One [FeatureAnalysis] per sample.
///
/// # Errors
///
/// Returns `Err(DfdnError::Analysis)` if the embeddings differ in shape or are empty.
pub fn analyze_features<B: Backend>(
    pathology: Tensor<B, 2>,
    physiology: Tensor<B, 2>,
) -> DfdnResult<Vec<FeatureAnalysis>> {
    if pathology.dims() != physiology.dims() {
        return Err(DfdnError::Analysis {
            reason: format!(
                "embedding shapes differ: {:?} and {:?}",
                pathology.dims(),
                physiology.dims()
            ),
        });
    }

    let pathology = tensor_rows(pathology)?;
    let physiology = tensor_rows(physiology)?;
    pathology
        .iter()
        .zip(&physiology)
        .map(|(p, q)| FeatureAnalysis::from_vectors(p, q))
        .collect()
}

/// Copy a `[rows, cols]` tensor to the host, one vector per row.
///
/// # Errors
///
/// Returns `Err(DfdnError::Analysis)` for a tensor without columns or data
/// that cannot be read as `f32`.
pub fn tensor_rows<B: Backend>(tensor: Tensor<B, 2>) -> DfdnResult<Vec<Vec<f32>>> {
    let [_, cols] = tensor.dims();
    if cols == 0 {
        return Err(DfdnError::Analysis {
            reason: "tensor has no columns".to_owned(),
        });
    }

    let values = tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| DfdnError::Analysis {
            reason: format!("failed to read tensor data: {e:?}"),
        })?;
    Ok(values.chunks(cols).map(<[f32]>::to_vec).collect())
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::tests::TestBackend;

    #[test]
    fn statistics_of_known_vector() {
        let stats = FeatureStatistics::from_values(&[0.0, 1.0, 2.0, 3.0]).unwrap();

        assert!((stats.mean - 1.5).abs() < 1e-12);
        assert!((stats.std - 1.25f64.sqrt()).abs() < 1e-12);
        assert_eq!(stats.max, 3.0);
        assert_eq!(stats.min, 0.0);
        assert!((stats.median - 1.5).abs() < 1e-12);
        assert!((stats.nonzero_fraction - 0.75).abs() < 1e-12);
    }

    #[test]
    fn median_of_odd_length_is_middle_value() {
        let stats = FeatureStatistics::from_values(&[5.0, -1.0, 2.0]).unwrap();

        assert_eq!(stats.median, 2.0);
    }

    #[test]
    fn empty_vectors_are_rejected() {
        assert!(FeatureStatistics::from_values(&[]).is_err());
        assert!(FeatureSimilarity::between(&[], &[]).is_err());
        assert!(matches!(
            FeatureSimilarity::between(&[1.0], &[1.0, 2.0]),
            Err(DfdnError::Analysis { .. })
        ));
    }

    #[test]
    fn zero_vector_has_zero_cosine_and_no_correlation() {
        let similarity = FeatureSimilarity::between(&[0.0, 0.0, 0.0], &[1.0, 2.0, 3.0]).unwrap();

        assert_eq!(similarity.cosine_similarity, 0.0);
        assert_eq!(similarity.pearson_correlation, None);
    }

    #[test]
    fn linearly_related_vectors_are_fully_correlated() {
        let similarity = FeatureSimilarity::between(&[1.0, 2.0, 3.0], &[-2.0, -4.0, -6.0]).unwrap();

        assert!((similarity.cosine_similarity + 1.0).abs() < 1e-12);
        assert!((similarity.pearson_correlation.unwrap() + 1.0).abs() < 1e-12);
    }

    #[test]
    fn analyze_features_returns_one_entry_per_row() {
        let device = Default::default();
        let pathology = Tensor::<TestBackend, 2>::from_data(
            TensorData::from([[1.0, 0.0, 2.0], [0.5, 0.5, 0.5]]),
            &device,
        );
        let physiology = Tensor::<TestBackend, 2>::from_data(
            TensorData::from([[0.0, 1.0, 0.0], [1.0, 2.0, 3.0]]),
            &device,
        );

        let analysis = analyze_features(pathology, physiology).unwrap();

        assert_eq!(analysis.len(), 2);
        assert_eq!(analysis[0].similarity.cosine_similarity, 0.0);
        assert_eq!(analysis[1].similarity.pearson_correlation, None);
        assert!((analysis[1].pathology.mean - 0.5).abs() < 1e-7);
    }

    #[test]
    fn analyze_features_rejects_shape_mismatch() {
        let device = Default::default();
        let pathology = Tensor::<TestBackend, 2>::zeros([2, 4], &device);
        let physiology = Tensor::<TestBackend, 2>::zeros([2, 3], &device);

        assert!(analyze_features(pathology, physiology).is_err());
    }

    fn paired_vectors() -> impl Strategy<Value = (Vec<f32>, Vec<f32>)> {
        (1usize..64).prop_flat_map(|len| {
            (
                prop::collection::vec(-1e3f32..1e3, len),
                prop::collection::vec(-1e3f32..1e3, len),
            )
        })
    }

    proptest! {
        #[test]
        fn similarity_measures_are_bounded((p, q) in paired_vectors()) {
            let similarity = FeatureSimilarity::between(&p, &q).unwrap();

            prop_assert!((-1.0..=1.0).contains(&similarity.cosine_similarity));
            if let Some(r) = similarity.pearson_correlation {
                prop_assert!((-1.0..=1.0).contains(&r));
            }
        }

        #[test]
        fn statistics_are_ordered(values in prop::collection::vec(-1e3f32..1e3, 1..64)) {
            let stats = FeatureStatistics::from_values(&values).unwrap();

            prop_assert!(stats.min <= stats.median);
            prop_assert!(stats.median <= stats.max);
            prop_assert!(stats.min <= stats.mean + 1e-9 && stats.mean <= stats.max + 1e-9);
            prop_assert!(stats.std >= 0.0);
            prop_assert!((0.0..=1.0).contains(&stats.nonzero_fraction));
        }
    }
}
