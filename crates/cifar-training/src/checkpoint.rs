//! Checkpoint persistence.
//!
//! A checkpoint is a directory holding:
//! - `model.bin`: the classifier record
//! - `optimizer.bin`: the optimizer record (momentum buffers)
//! - `state.json`: the next epoch to run plus run metadata
//!
//! Tensors go through `BinFileRecorder` at full precision, so a save/load
//! round trip is bit-identical. Each save overwrites all three files.

use std::fs;
use std::path::{Path, PathBuf};

use burn::{
    module::Module,
    optim::Optimizer,
    record::{BinFileRecorder, FullPrecisionSettings, Recorder},
    tensor::backend::{AutodiffBackend, Backend},
};
use chrono::Utc;
use cifar_core::{Error, ModelVariant, Result, TrainingParams};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::model::Classifier;

/// Recorder used for model and optimizer records
pub type CheckpointRecorder = BinFileRecorder<FullPrecisionSettings>;

const MODEL_STEM: &str = "model";
const OPTIMIZER_STEM: &str = "optimizer";
const STATE_FILE: &str = "state.json";

/// Progress marker and metadata stored beside the records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointState {
    /// Next epoch to run, i.e. the completed epoch index plus one
    pub epoch: usize,
    pub variant: ModelVariant,
    /// Learning rate at save time; informational only
    pub learning_rate: f64,
    /// Weight decay at save time; informational only
    pub weight_decay: f64,
    pub momentum: f64,
    pub timestamp: String,
}

impl CheckpointState {
    /// State after finishing the 0-based epoch `completed_epoch`
    pub fn after_epoch(completed_epoch: usize, variant: ModelVariant, params: &TrainingParams) -> Self {
        Self {
            epoch: completed_epoch + 1,
            variant,
            learning_rate: params.learning_rate,
            weight_decay: params.weight_decay,
            momentum: params.momentum,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Serialization(format!("Failed to serialize checkpoint state: {}", e)))?;
        fs::write(dir.join(STATE_FILE), json)?;
        Ok(())
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(STATE_FILE);
        let json = fs::read_to_string(&path)
            .map_err(|e| Error::Checkpoint(format!("Failed to read {}: {}", path.display(), e)))?;
        serde_json::from_str(&json)
            .map_err(|e| Error::Checkpoint(format!("Corrupt {}: {}", path.display(), e)))
    }
}

/// Paths of the files inside a checkpoint directory
pub fn checkpoint_files(dir: &Path) -> [PathBuf; 3] {
    [
        dir.join(MODEL_STEM).with_extension("bin"),
        dir.join(OPTIMIZER_STEM).with_extension("bin"),
        dir.join(STATE_FILE),
    ]
}

/// Whether `dir` holds a complete checkpoint
pub fn checkpoint_exists(dir: &Path) -> bool {
    checkpoint_files(dir).iter().all(|p| p.is_file())
}

/// Write model, optimizer and state into `dir`, replacing any previous
/// checkpoint there.
pub fn save_checkpoint<B, O>(dir: &Path, model: &Classifier<B>, optimizer: &O, state: &CheckpointState) -> Result<()>
where
    B: AutodiffBackend,
    O: Optimizer<Classifier<B>, B>,
{
    info!("=> Saving current parameters to {}", dir.display());
    fs::create_dir_all(dir)?;

    let recorder = CheckpointRecorder::new();
    model
        .clone()
        .save_file(dir.join(MODEL_STEM), &recorder)
        .map_err(|e| Error::Checkpoint(format!("Failed to save model: {}", e)))?;

    <CheckpointRecorder as Recorder<B>>::record(&recorder, optimizer.to_record(), dir.join(OPTIMIZER_STEM))
        .map_err(|e| Error::Checkpoint(format!("Failed to save optimizer: {}", e)))?;

    state.save(dir)?;
    Ok(())
}

/// Load only the model record into `model`.
///
/// Works for any backend, so an evaluation-only model can read weights
/// saved during training.
pub fn load_model<B: Backend>(dir: &Path, model: Classifier<B>, device: &B::Device) -> Result<Classifier<B>> {
    let path = dir.join(MODEL_STEM).with_extension("bin");
    if !path.is_file() {
        return Err(Error::Checkpoint(format!("missing {}", path.display())));
    }

    model
        .load_file(dir.join(MODEL_STEM), &CheckpointRecorder::new(), device)
        .map_err(|e| Error::Checkpoint(format!("Failed to load {}: {}", path.display(), e)))
}

/// Load the optimizer record into `optimizer`.
pub fn load_optimizer<B, O>(dir: &Path, optimizer: O, device: &B::Device) -> Result<O>
where
    B: AutodiffBackend,
    O: Optimizer<Classifier<B>, B>,
{
    let path = dir.join(OPTIMIZER_STEM).with_extension("bin");
    if !path.is_file() {
        return Err(Error::Checkpoint(format!("missing {}", path.display())));
    }

    let record = <CheckpointRecorder as Recorder<B>>::load::<O::Record>(&CheckpointRecorder::new(), path.clone(), device)
        .map_err(|e| Error::Checkpoint(format!("Failed to load {}: {}", path.display(), e)))?;
    Ok(optimizer.load_record(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_state_round_trip() {
        let dir = TempDir::new().unwrap();
        let state = CheckpointState::after_epoch(4, ModelVariant::FullyConnected, &TrainingParams::default());

        state.save(dir.path()).unwrap();
        let loaded = CheckpointState::load(dir.path()).unwrap();

        assert_eq!(loaded, state);
        assert_eq!(loaded.epoch, 5);
    }

    #[test]
    fn test_missing_state_is_fatal() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(CheckpointState::load(dir.path()), Err(Error::Checkpoint(_))));
        assert!(!checkpoint_exists(dir.path()));
    }

    #[test]
    fn test_corrupt_state_is_fatal() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(STATE_FILE), "{ \"epoch\": ").unwrap();
        assert!(matches!(CheckpointState::load(dir.path()), Err(Error::Checkpoint(_))));
    }
}
