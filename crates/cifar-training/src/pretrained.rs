//! ImageNet VGG16 weights from torchvision's `.pth` checkpoint.

use std::fs;
use std::path::{Path, PathBuf};

use burn::{
    module::Module,
    record::{FullPrecisionSettings, Recorder},
    tensor::backend::Backend,
};
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};
use cifar_core::{Error, Result};
use tracing::info;

use crate::model::{Vgg16, Vgg16BackboneRecord};

/// Indices of the convolutions inside torchvision's `features` sequential.
const FEATURE_CONV_INDICES: [usize; 13] = [0, 2, 5, 7, 10, 12, 14, 17, 19, 21, 24, 26, 28];

/// Return a path to the weights file, fetching it once if it is missing.
///
/// An empty or absent URL means the file must already exist.
pub fn ensure_weights(path: &Path, url: Option<&str>) -> Result<PathBuf> {
    if path.exists() {
        info!("Using cached VGG16 weights at {}", path.display());
        return Ok(path.to_path_buf());
    }

    let url = match url {
        Some(url) if !url.is_empty() => url,
        _ => {
            return Err(Error::NotFound(format!(
                "pretrained weights {} and no download URL configured",
                path.display()
            )))
        }
    };

    info!("Downloading VGG16 weights from {}", url);
    let bytes = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .and_then(|r| r.bytes())
        .map_err(|e| Error::Download(format!("{}: {}", url, e)))?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let partial = path.with_extension("part");
    fs::write(&partial, &bytes)?;
    fs::rename(&partial, path)?;

    info!("Saved {} bytes to {}", bytes.len(), path.display());
    Ok(path.to_path_buf())
}

/// Map torchvision parameter names onto [`crate::model::Vgg16Backbone`].
///
/// `classifier.6` (the 1000-class ImageNet head) has no counterpart and is
/// left unread.
pub fn vgg16_load_args(path: &Path) -> LoadArgs {
    let args = FEATURE_CONV_INDICES
        .iter()
        .enumerate()
        .fold(LoadArgs::new(path.to_path_buf()), |args, (i, feature)| {
            args.with_key_remap(&format!(r"^features\.{}\.", feature), &format!("convs.{}.", i))
        });

    args.with_key_remap(r"^classifier\.0\.", "fc1.")
        .with_key_remap(r"^classifier\.3\.", "fc2.")
}

/// Replace the backbone of `model` with the weights stored at `path`.
pub fn load_vgg16_backbone<B: Backend>(model: Vgg16<B>, path: &Path, device: &B::Device) -> Result<Vgg16<B>> {
    let record: Vgg16BackboneRecord<B> = PyTorchFileRecorder::<FullPrecisionSettings>::default()
        .load(vgg16_load_args(path), device)
        .map_err(|e| Error::Model(format!("Failed to decode {}: {}", path.display(), e)))?;

    info!("Loaded ImageNet weights into the VGG16 backbone");
    Ok(Vgg16 {
        backbone: model.backbone.load_record(record),
        head: model.head,
    })
}
