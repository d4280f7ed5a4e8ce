//! Exact t-SNE projection of the decoupled embeddings.
//!
//! Input affinities are computed on the host with a per-point binary search
//! for the target perplexity. The embedding is then optimised with Burn
//! tensors: gradient descent with momentum and per-coordinate adaptive gains,
//! starting with an early exaggeration phase.

use burn::{prelude::*, tensor::Distribution};
use serde::Serialize;

use super::stats::tensor_rows;
use crate::error::{DfdnError, DfdnResult};

const OUTPUT_DIMS: usize = 2;
const AFFINITY_FLOOR: f64 = 1e-12;
const SEARCH_STEPS: usize = 100;
const SEARCH_TOLERANCE: f64 = 1e-5;

/// Configuration of [project_features].
#[derive(Config, Debug)]
pub struct TsneConfig {
    /// Upper bound; small inputs use `(N - 1) / 3` instead.
    #[config(default = 30.0)]
    pub perplexity: f64,
    #[config(default = 12.0)]
    pub early_exaggeration: f64,
    /// Iterations run with exaggerated affinities and initial momentum.
    #[config(default = 250)]
    pub exaggeration_iterations: usize,
    #[config(default = 1000)]
    pub max_iterations: usize,
    /// `None` selects `max(N / early_exaggeration / 4, 50)`.
    #[config(default = "None")]
    pub learning_rate: Option<f64>,
    #[config(default = 42)]
    pub seed: u64,
    #[config(default = 0.5)]
    pub initial_momentum: f64,
    #[config(default = 0.8)]
    pub final_momentum: f64,
    #[config(default = 0.01)]
    pub min_gain: f64,
}

/// Origin of a projected point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FeatureKind {
    Pathology,
    Physiology,
}

/// 2-D coordinates of every pathology vector followed by every physiology vector.
#[derive(Debug, Clone, Serialize)]
pub struct TsneProjection {
    pub points: Vec<[f32; 2]>,
    pub kinds: Vec<FeatureKind>,
    /// Class of the sample each point came from, when known.
    pub labels: Option<Vec<usize>>,
}

impl TsneProjection {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Project the `2B` embeddings of a batch to two dimensions.
///
/// # Shapes
///
/// - pathology, physiology: `[batch_size, feature_dim]`
/// - labels: `batch_size` class indices
///
/// # Errors
///
/// Returns `Err(DfdnError::Analysis)` for mismatched shapes, an empty batch,
/// or a label count that differs from the batch size.
pub fn project_features<B: Backend>(
    pathology: Tensor<B, 2>,
    physiology: Tensor<B, 2>,
    labels: Option<&[usize]>,
    config: &TsneConfig,
) -> DfdnResult<TsneProjection> {
    let [batch_size, _] = pathology.dims();
    if pathology.dims() != physiology.dims() || batch_size == 0 {
        return Err(DfdnError::Analysis {
            reason: format!(
                "t-SNE needs two equally shaped, non-empty embeddings, got {:?} and {:?}",
                pathology.dims(),
                physiology.dims()
            ),
        });
    }
    if let Some(labels) = labels {
        if labels.len() != batch_size {
            return Err(DfdnError::Analysis {
                reason: format!("{} labels for {batch_size} samples", labels.len()),
            });
        }
    }

    let device = pathology.device();
    let mut rows = tensor_rows(pathology)?;
    rows.extend(tensor_rows(physiology)?);

    let points = embed::<B>(&rows, config, &device)?;

    let kinds = [FeatureKind::Pathology, FeatureKind::Physiology]
        .into_iter()
        .flat_map(|kind| std::iter::repeat(kind).take(batch_size))
        .collect();
    let labels = labels.map(|labels| labels.iter().chain(labels).copied().collect());

    Ok(TsneProjection {
        points,
        kinds,
        labels,
    })
}

fn squared_distances(rows: &[Vec<f32>]) -> Vec<f64> {
    let n = rows.len();
    let mut distances = vec![0.0; n * n];
    for i in 0..n {
        for j in (i + 1)..n {
            let d = rows[i]
                .iter()
                .zip(&rows[j])
                .map(|(&a, &b)| (f64::from(a) - f64::from(b)).powi(2))
                .sum::<f64>();
            distances[i * n + j] = d;
            distances[j * n + i] = d;
        }
    }
    distances
}

/// Conditional affinities of row `i` for the precision found by binary search.
fn conditional_row(distances: &[f64], i: usize, n: usize, log_perplexity: f64) -> Vec<f64> {
    let row = &distances[i * n..(i + 1) * n];
    let nearest = (0..n)
        .filter(|&j| j != i)
        .map(|j| row[j])
        .fold(f64::INFINITY, f64::min);

    let mut beta = 1.0;
    let (mut beta_min, mut beta_max) = (f64::NEG_INFINITY, f64::INFINITY);
    let mut affinities = vec![0.0; n];

    for _ in 0..SEARCH_STEPS {
        let mut sum = 0.0;
        let mut weighted = 0.0;
        for j in 0..n {
            affinities[j] = if j == i {
                0.0
            } else {
                (-(row[j] - nearest) * beta).exp()
            };
            sum += affinities[j];
            weighted += (row[j] - nearest) * affinities[j];
        }

        let entropy = sum.ln() + beta * weighted / sum;
        for value in &mut affinities {
            *value /= sum;
        }

        let diff = entropy - log_perplexity;
        if diff.abs() < SEARCH_TOLERANCE {
            break;
        }
        if diff > 0.0 {
            beta_min = beta;
            beta = if beta_max.is_infinite() {
                beta * 2.0
            } else {
                (beta + beta_max) / 2.0
            };
        } else {
            beta_max = beta;
            beta = if beta_min.is_infinite() {
                beta / 2.0
            } else {
                (beta + beta_min) / 2.0
            };
        }
    }
    affinities
}

/// Symmetrised joint affinities `P`, row-major `n × n`.
fn joint_affinities(rows: &[Vec<f32>], perplexity: f64) -> Vec<f64> {
    let n = rows.len();
    let distances = squared_distances(rows);
    let perplexity = perplexity.min((((n - 1) as f64) / 3.0).max(1.0));
    let log_perplexity = perplexity.ln();

    let conditional: Vec<Vec<f64>> = (0..n)
        .map(|i| conditional_row(&distances, i, n, log_perplexity))
        .collect();

    let mut joint = vec![0.0; n * n];
    for i in 0..n {
        for j in 0..n {
            if i != j {
                joint[i * n + j] =
                    ((conditional[i][j] + conditional[j][i]) / (2.0 * n as f64)).max(AFFINITY_FLOOR);
            }
        }
    }
    joint
}

fn embed<B: Backend>(
    rows: &[Vec<f32>],
    config: &TsneConfig,
    device: &B::Device,
) -> DfdnResult<Vec<[f32; 2]>> {
    let n = rows.len();
    if n < 2 {
        return Ok(vec![[0.0; 2]; n]);
    }

    let affinities = joint_affinities(rows, config.perplexity);
    let affinities = Tensor::<B, 2>::from_data(
        TensorData::new(
            affinities.into_iter().map(|v| v as f32).collect::<Vec<_>>(),
            [n, n],
        )
        .convert::<B::FloatElem>(),
        device,
    );
    let off_diagonal = Tensor::<B, 2>::ones([n, n], device)
        - Tensor::<B, 2>::from_data(identity(n).convert::<B::FloatElem>(), device);

    let learning_rate = config
        .learning_rate
        .unwrap_or_else(|| (n as f64 / config.early_exaggeration / 4.0).max(50.0));

    B::seed(config.seed);
    let mut points =
        Tensor::<B, 2>::random([n, OUTPUT_DIMS], Distribution::Normal(0.0, 1e-4), device);
    let mut update = Tensor::<B, 2>::zeros([n, OUTPUT_DIMS], device);
    let mut gains = Tensor::<B, 2>::ones([n, OUTPUT_DIMS], device);

    for iteration in 0..config.max_iterations {
        let (exaggeration, momentum) = if iteration < config.exaggeration_iterations {
            (config.early_exaggeration, config.initial_momentum)
        } else {
            (1.0, config.final_momentum)
        };

        // Student-t kernel between every pair of embedded points.
        let norms = points.clone().powf_scalar(2.0).sum_dim(1);
        let kernel = (norms.clone() + norms.transpose()
            - points.clone().matmul(points.clone().transpose()).mul_scalar(2.0))
        .add_scalar(1.0)
        .recip()
            * off_diagonal.clone();
        let similarities = (kernel.clone() / kernel.clone().sum().reshape([1, 1]))
            .clamp_min(AFFINITY_FLOOR);

        let weights = (affinities.clone().mul_scalar(exaggeration) - similarities) * kernel;
        let gradient = (weights.clone().sum_dim(1) * points.clone()
            - weights.matmul(points.clone()))
        .mul_scalar(4.0);

        let same_sign = (update.clone() * gradient.clone()).greater_equal_elem(0.0);
        gains = gains
            .clone()
            .add_scalar(0.2)
            .mask_where(same_sign, gains.mul_scalar(0.8))
            .clamp_min(config.min_gain);

        update = update.mul_scalar(momentum) - (gains.clone() * gradient).mul_scalar(learning_rate);
        points = points + update.clone();
    }

    let mean = points.clone().mean_dim(0);
    let values = (points - mean)
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| DfdnError::Analysis {
            reason: format!("failed to read t-SNE embedding: {e:?}"),
        })?;

    Ok(values
        .chunks(OUTPUT_DIMS)
        .map(|pair| [pair[0], pair[1]])
        .collect())
}

fn identity(n: usize) -> TensorData {
    let mut values = vec![0.0f32; n * n];
    for i in 0..n {
        values[i * n + i] = 1.0;
    }
    TensorData::new(values, [n, n])
}
