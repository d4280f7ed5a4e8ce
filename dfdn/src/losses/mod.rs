//! Loss functions for DFDN training.
//!
//! - `classification`: label-smoothed cross-entropy
//! - `contrastive`: identity-target similarity loss between the two embeddings
//! - `orthogonality`: squared cosine between the two embeddings
//! - `dfdn_loss`: the weighted combination with NaN masking and clipping

mod classification;
mod contrastive;
mod dfdn_loss;
mod orthogonality;

pub use classification::{ClassificationLoss, ClassificationLossConfig};
pub use contrastive::{ContrastiveLoss, ContrastiveLossConfig};
pub use dfdn_loss::{DfdnLoss, DfdnLossOutput};
pub use orthogonality::OrthogonalityLoss;
