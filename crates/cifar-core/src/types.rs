//! Core type definitions for CIFAR-10 training.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Number of CIFAR-10 classes.
pub const NUM_CLASSES: usize = 10;

/// Side length of a CIFAR-10 image.
pub const IMAGE_SIZE: usize = 32;

/// Number of channels in a CIFAR-10 image.
pub const IMAGE_CHANNELS: usize = 3;

/// Flattened pixel count of one image (3 x 32 x 32).
pub const IMAGE_PIXELS: usize = IMAGE_CHANNELS * IMAGE_SIZE * IMAGE_SIZE;

/// CIFAR-10 class names, indexed by label.
pub const CLASS_NAMES: [&str; NUM_CLASSES] = [
    "airplane",
    "automobile",
    "bird",
    "cat",
    "deer",
    "dog",
    "frog",
    "horse",
    "ship",
    "truck",
];

/// Data split type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DataSplit {
    /// Training data
    Train,
    /// Validation data (held out from the training batches)
    Validation,
    /// Test data
    Test,
}

impl std::fmt::Display for DataSplit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataSplit::Train => write!(f, "train"),
            DataSplit::Validation => write!(f, "validation"),
            DataSplit::Test => write!(f, "test"),
        }
    }
}

/// The classifier variant trained in a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ModelVariant {
    /// Modified pretrained VGG16
    Convolutional,
    /// Three-layer fully-connected network on flattened pixels
    FullyConnected,
}

impl std::fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelVariant::Convolutional => write!(f, "vgg16"),
            ModelVariant::FullyConnected => write!(f, "fully_connected"),
        }
    }
}

/// Raw variant toggles as they appear in a config file.
///
/// Exactly one toggle must be set; [`ModelSelection::variant`] is the only way
/// to turn a selection into a [`ModelVariant`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelSelection {
    /// Train the convolutional (VGG16) variant
    pub convolutional: bool,
    /// Train the fully-connected variant
    pub fully_connected: bool,
}

impl Default for ModelSelection {
    fn default() -> Self {
        Self {
            convolutional: true,
            fully_connected: false,
        }
    }
}

impl ModelSelection {
    /// Selection with only the given variant enabled
    pub fn only(variant: ModelVariant) -> Self {
        Self {
            convolutional: variant == ModelVariant::Convolutional,
            fully_connected: variant == ModelVariant::FullyConnected,
        }
    }

    /// Resolve the toggles into a single variant
    pub fn variant(&self) -> Result<ModelVariant> {
        match (self.convolutional, self.fully_connected) {
            (true, false) => Ok(ModelVariant::Convolutional),
            (false, true) => Ok(ModelVariant::FullyConnected),
            (true, true) => Err(Error::Config(
                "both model variants are selected; enable exactly one of \
                 `convolutional` and `fully_connected`"
                    .to_string(),
            )),
            (false, false) => Err(Error::Config(
                "no model variant is selected; enable exactly one of \
                 `convolutional` and `fully_connected`"
                    .to_string(),
            )),
        }
    }
}
