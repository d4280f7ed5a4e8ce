//! Post-processing of the decoupled embeddings.
//!
//! - `heatmap`: pathology heat-maps at the original image size
//! - `stats`: descriptive statistics and pathology/physiology similarity
//! - `tsne`: 2-D t-SNE projection of both embeddings
//! - `report`: per-image diagnosis with confidence grading

mod heatmap;
mod report;
mod stats;
mod tsne;

pub use heatmap::{pathology_heatmap, HeatmapConfig};
pub use report::{
    ConfidenceLevel, Diagnosis, DiagnosticReport, HIGH_CONFIDENCE, MODERATE_CONFIDENCE,
};
pub use stats::{
    analyze_features, tensor_rows, FeatureAnalysis, FeatureSimilarity, FeatureStatistics,
};
pub use tsne::{project_features, FeatureKind, TsneConfig, TsneProjection};
