//! Model components: the Transformer block, the backbone encoder, the feature
//! decoders, the classifier head and the assembled [Dfdn] network.

mod classifier;
mod decoder;
mod dfdn;
mod encoder;
mod transformer;

pub use classifier::{ClassifierHead, ClassifierHeadConfig};
pub use decoder::{FeatureDecoder, FeatureDecoderConfig};
pub use dfdn::{Dfdn, DfdnOutput, DfdnRecord};
pub use encoder::{BackboneEncoder, BackboneEncoderConfig};
pub use transformer::{forward_stack, TransformerBlock, TransformerBlockConfig};
