//! Import of torchvision ImageNet checkpoints.

use std::path::Path;

use burn::{
    prelude::*,
    record::{FullPrecisionSettings, Recorder, RecorderError},
};
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};

use crate::{ResNet, ResNetRecord};

impl<B: Backend> ResNet<B> {
    /// Replace the parameters with a torchvision `resnet*.pth` state dict.
    ///
    /// The classification head (`fc.*`) in the file is ignored.
    pub fn load_torchvision(self, path: &Path, device: &B::Device) -> Result<Self, RecorderError> {
        let args = LoadArgs::new(path.to_path_buf())
            .with_key_remap("^conv1\\.(.+)", "stem.conv.$1")
            .with_key_remap("^bn1\\.(.+)", "stem.norm.$1")
            .with_key_remap("^(layer[1-4])\\.([0-9]+)\\.(.+)", "$1.units.$2.$3")
            .with_key_remap("(.+)\\.downsample\\.0\\.(.+)", "$1.shortcut.conv.$2")
            .with_key_remap("(.+)\\.downsample\\.1\\.(.+)", "$1.shortcut.norm.$2")
            .with_key_remap("(.+\\.units\\.[0-9]+)\\.conv1\\.(.+)", "$1.convs.0.$2")
            .with_key_remap("(.+\\.units\\.[0-9]+)\\.conv2\\.(.+)", "$1.convs.1.$2")
            .with_key_remap("(.+\\.units\\.[0-9]+)\\.conv3\\.(.+)", "$1.convs.2.$2")
            .with_key_remap("(.+\\.units\\.[0-9]+)\\.bn1\\.(.+)", "$1.norms.0.$2")
            .with_key_remap("(.+\\.units\\.[0-9]+)\\.bn2\\.(.+)", "$1.norms.1.$2")
            .with_key_remap("(.+\\.units\\.[0-9]+)\\.bn3\\.(.+)", "$1.norms.2.$2");

        let record: ResNetRecord<B> =
            PyTorchFileRecorder::<FullPrecisionSettings>::default().load(args, device)?;

        Ok(self.load_record(record))
    }
}
