use burn::tensor::{backend::Backend, Tensor};
use burn_extra_ops::l2_normalize;

/// Penalises alignment between each sample's pathology and physiology
/// embeddings: `mean((norm(p) · norm(q))²)`.
///
/// The per-sample dot product is the cosine similarity of the pair, so the
/// loss is zero for orthogonal pairs and one for collinear pairs.
#[derive(Clone, Debug, Default)]
pub struct OrthogonalityLoss;

impl OrthogonalityLoss {
    /// Create the criterion.
    pub const fn new() -> Self {
        Self
    }

    /// # Shapes
    ///
    /// - pathology: `[batch_size, feature_dim]`
    /// - physiology: `[batch_size, feature_dim]`
    /// - output: `[1]`
    pub fn forward<B: Backend>(
        &self,
        pathology: Tensor<B, 2>,
        physiology: Tensor<B, 2>,
    ) -> Tensor<B, 1> {
        self.cosine(pathology, physiology).powf_scalar(2.0).mean()
    }

    /// Per-sample cosine similarity, `[batch_size]`.
    pub fn cosine<B: Backend>(
        &self,
        pathology: Tensor<B, 2>,
        physiology: Tensor<B, 2>,
    ) -> Tensor<B, 1> {
        let [batch_size, _] = pathology.dims();
        assert_eq!(
            pathology.dims(),
            physiology.dims(),
            "Pathology and physiology embeddings must have the same shape"
        );

        (l2_normalize(pathology, 1) * l2_normalize(physiology, 1))
            .sum_dim(1)
            .reshape([batch_size])
    }
}
