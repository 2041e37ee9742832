//! CIFAR-10 data pipeline.
//!
//! This crate provides:
//! - The binary batch reader and dataset download
//! - A Burn `Dataset` over shared records with a seeded train/validation split
//! - Normalization and batching into tensors
//! - Construction of the train, validation and test loaders

pub mod batcher;
pub mod cifar10;
pub mod dataset;
pub mod loader;
pub mod transform;

pub use batcher::{CifarBatch, CifarBatcher};
pub use cifar10::{download_cifar10, load_test_records, load_training_records};
pub use dataset::{split_train_validation, CifarDataset, CifarItem};
pub use loader::{build_loaders, load_cifar10, make_loader, CifarLoader, CifarLoaders};
pub use transform::{Normalize, EVAL_TRANSFORM, TRAIN_TRANSFORM};
