//! Configuration structures for CIFAR-10 training.
//!
//! Every section deserializes with defaults, so a TOML file only needs to name
//! the values it changes.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::backend::Device;
use crate::types::{ModelSelection, ModelVariant, NUM_CLASSES};
use crate::{Error, Result};

/// torchvision's ImageNet VGG16 weights
pub const VGG16_WEIGHTS_URL: &str = "https://download.pytorch.org/models/vgg16-397923af.pth";

/// Main configuration for a training run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrainingConfig {
    /// Random seed for the split and the shuffled loader
    pub seed: u64,
    /// Device to train on
    pub device: Device,
    /// Model configuration
    pub model: ModelConfig,
    /// Training hyperparameters
    pub training: TrainingParams,
    /// Data configuration
    pub data: DataConfig,
    /// Checkpoint configuration
    pub checkpoint: CheckpointConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            device: Device::Cpu,
            model: ModelConfig::default(),
            training: TrainingParams::default(),
            data: DataConfig::default(),
            checkpoint: CheckpointConfig::default(),
        }
    }
}

impl TrainingConfig {
    /// Check every section; resolves the model variant on success.
    pub fn validate(&self) -> Result<ModelVariant> {
        let variant = self.model.selection.variant()?;
        self.model.validate().map_err(Error::Config)?;
        self.training.validate().map_err(Error::Config)?;
        self.data.validate().map_err(Error::Config)?;
        Ok(variant)
    }
}

/// Model configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    /// Which classifier to train
    pub selection: ModelSelection,
    /// Number of output classes
    pub num_classes: usize,
    /// Dropout probability used by every dropout layer
    pub dropout: f64,
    /// Load ImageNet weights into the VGG16 backbone
    pub pretrained: bool,
    /// Local cache for the VGG16 `.pth` file
    pub pretrained_path: PathBuf,
    /// Fetched into `pretrained_path` when the file is absent
    pub pretrained_url: Option<String>,
    /// Kaiming-normal initialization for the fully-connected variant
    pub init_weights: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            selection: ModelSelection::default(),
            num_classes: NUM_CLASSES,
            dropout: 0.0,
            pretrained: true,
            pretrained_path: PathBuf::from("checkpoint/vgg16-397923af.pth"),
            pretrained_url: Some(VGG16_WEIGHTS_URL.to_string()),
            init_weights: true,
        }
    }
}

impl ModelConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.num_classes == 0 {
            return Err("Number of classes must be greater than 0".to_string());
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(format!("Dropout must be in [0, 1), got {}", self.dropout));
        }
        Ok(())
    }
}

/// Training hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrainingParams {
    /// Number of training epochs
    pub num_epochs: usize,
    /// Batch size for all three loaders
    pub batch_size: usize,
    /// SGD learning rate
    pub learning_rate: f64,
    /// Weight decay (L2 regularization); 0 disables it
    pub weight_decay: f64,
    /// SGD momentum; 0 disables it
    pub momentum: f64,
    /// Worker threads for the validation and test loaders
    pub num_workers: usize,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            num_epochs: 100_000,
            batch_size: 64,
            learning_rate: 0.001,
            weight_decay: 0.0,
            momentum: 0.0,
            num_workers: 0,
        }
    }
}

impl TrainingParams {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.num_epochs == 0 {
            return Err("Number of epochs must be greater than 0".to_string());
        }
        if self.batch_size == 0 {
            return Err("Batch size must be greater than 0".to_string());
        }
        if self.learning_rate <= 0.0 {
            return Err("Learning rate must be positive".to_string());
        }
        if self.weight_decay < 0.0 {
            return Err("Weight decay must not be negative".to_string());
        }
        if !(0.0..1.0).contains(&self.momentum) {
            return Err(format!("Momentum must be in [0, 1), got {}", self.momentum));
        }
        Ok(())
    }
}

/// Data configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DataConfig {
    /// Root directory; batches live in `cifar-10-batches-bin` below it
    pub data_dir: PathBuf,
    /// Fetch and unpack the dataset when it is missing
    pub download: bool,
    /// Reshuffle the training loader every epoch
    pub shuffle: bool,
    /// Images kept for training out of the 50,000 training records
    pub train_size: usize,
    /// Images held out for validation
    pub validation_size: usize,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./CIFAR10"),
            download: false,
            shuffle: true,
            train_size: 40_000,
            validation_size: 10_000,
        }
    }
}

impl DataConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.train_size == 0 || self.validation_size == 0 {
            return Err("Train and validation sizes must both be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Checkpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CheckpointConfig {
    /// Checkpoint directory; overwritten on every save
    pub path: PathBuf,
    /// Save after every epoch
    pub save: bool,
    /// Restore model and optimizer before training
    pub resume: bool,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("checkpoint/CIFAR10_VGG16"),
            save: false,
            resume: false,
        }
    }
}
