//! Configuration module for DFDN.
//!
//! - `core`: model, backbone, loss and execution configuration
//! - `enums`: modality, precision and class enumerations

pub mod core;
pub mod enums;

pub use core::{BackboneConfig, DfdnConfig, DfdnLossConfig, ExecutionConfig};
pub use enums::{Modality, Precision, ResNetVariant, StrokeClass};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DfdnError;

    #[test]
    fn default_configuration_is_valid() {
        let config = DfdnConfig::new();

        assert!(config.validate().is_ok());
        assert_eq!(config.embedding_dim, 256);
        assert_eq!(config.num_heads, 8);
        assert_eq!(config.feature_dim, 128);
        assert_eq!(config.sequence_len(), 64);
        assert_eq!(config.backbone.variant, ResNetVariant::ResNet50);
    }

    #[test]
    fn heads_must_divide_embedding_dim() {
        let config = DfdnConfig::new().with_embedding_dim(100).with_num_heads(8);

        match config.validate() {
            Err(DfdnError::InvalidConfiguration { reason }) => {
                assert!(reason.contains("divisible by num_heads"));
            }
            other => panic!("Expected InvalidConfiguration error, got {other:?}"),
        }
    }

    #[test]
    fn input_smaller_than_backbone_stride_is_rejected() {
        let config = DfdnConfig::new().with_input_size([16, 256]);

        assert!(matches!(
            config.validate(),
            Err(DfdnError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn zero_spatial_size_is_rejected() {
        let config = DfdnConfig::new().with_input_size([0, 0]);

        assert!(config.validate().is_err());
    }

    #[test]
    fn two_channel_input_is_rejected() {
        let config = DfdnConfig::new().with_in_channels(2);

        match config.validate() {
            Err(DfdnError::InvalidConfiguration { reason }) => {
                assert!(reason.contains("in_channels"));
            }
            other => panic!("Expected InvalidConfiguration error, got {other:?}"),
        }
    }

    #[test]
    fn decoders_deeper_than_encoder_are_rejected() {
        let config = DfdnConfig::new()
            .with_num_transformer_blocks(2)
            .with_num_decoder_blocks(3);

        assert!(config.validate().is_err());
    }

    #[test]
    fn non_positive_temperature_is_rejected() {
        let config =
            DfdnConfig::new().with_loss(DfdnLossConfig::new().with_temperature(0.0));

        match config.validate() {
            Err(DfdnError::InvalidConfiguration { reason }) => {
                assert!(reason.contains("temperature"));
            }
            other => panic!("Expected InvalidConfiguration error, got {other:?}"),
        }
    }

    #[test]
    fn architecture_comparison_ignores_modality_and_loss() {
        let ct = DfdnConfig::new();
        let mri = DfdnConfig::new()
            .with_modality(Modality::Mri)
            .with_loss(DfdnLossConfig::new().with_ortho_weight(0.5));
        let wider = DfdnConfig::new().with_embedding_dim(512);

        assert!(ct.same_architecture(&mri));
        assert!(!ct.same_architecture(&wider));
    }

    #[test]
    fn modality_parses_case_insensitively() {
        assert_eq!("CT".parse::<Modality>().ok(), Some(Modality::Ct));
        assert_eq!("mri".parse::<Modality>().ok(), Some(Modality::Mri));
        assert!("pet".parse::<Modality>().is_err());
        assert_eq!(Modality::Mri.slug(), "mri");
    }

    #[test]
    fn stroke_class_indices_round_trip() {
        for class in StrokeClass::ALL {
            assert_eq!(StrokeClass::from_index(class.index()), Some(class));
        }
        assert_eq!(StrokeClass::from_index(3), None);
    }
}
