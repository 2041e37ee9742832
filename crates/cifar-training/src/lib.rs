//! Training infrastructure for CIFAR-10 classification.
//!
//! This crate provides:
//! - Model architectures (modified VGG16, fully-connected network)
//! - ImageNet weight loading for VGG16
//! - The SGD training loop with per-epoch validation
//! - Accuracy evaluation
//! - Checkpoint save and restore

pub mod checkpoint;
pub mod evaluator;
pub mod model;
pub mod pretrained;
pub mod trainer;

pub use checkpoint::{checkpoint_exists, load_model, save_checkpoint, CheckpointState};
pub use evaluator::{evaluate, EvaluationResult};
pub use model::{build_model, init_model, Classifier, FullyNet, FullyNetConfig, Vgg16, Vgg16Config};
pub use trainer::{build_optimizer, EpochSummary, SgdOptimizer, Trainer, TrainingState};
