//! Training loop for the CIFAR-10 classifiers.
//!
//! Each epoch runs forward, cross-entropy loss, backward and one SGD step per
//! batch. After the batch loop it optionally checkpoints, logs the mean loss,
//! evaluates on the validation loader and logs training accuracy.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use burn::{
    module::AutodiffModule,
    nn::loss::CrossEntropyLossConfig,
    optim::{
        adaptor::OptimizerAdaptor, decay::WeightDecayConfig, momentum::MomentumConfig, GradientsParams, Optimizer,
        Sgd, SgdConfig,
    },
    tensor::{backend::AutodiffBackend, ElementConversion},
};
use cifar_core::{Error, ModelVariant, Result, TrainingConfig, TrainingParams};
use cifar_dataset::CifarLoader;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::checkpoint::{self, CheckpointState};
use crate::evaluator::{evaluate, EvaluationResult};
use crate::model::Classifier;

/// SGD over a [`Classifier`] on autodiff backend `B`
pub type SgdOptimizer<B> = OptimizerAdaptor<Sgd<<B as AutodiffBackend>::InnerBackend>, Classifier<B>, B>;

/// Build SGD from the current hyperparameters.
///
/// Weight decay and momentum are only attached when non-zero.
pub fn build_optimizer<B: AutodiffBackend>(params: &TrainingParams) -> SgdOptimizer<B> {
    let mut config = SgdConfig::new();
    if params.weight_decay > 0.0 {
        config = config.with_weight_decay(Some(WeightDecayConfig::new(params.weight_decay as f32)));
    }
    if params.momentum > 0.0 {
        config = config.with_momentum(Some(MomentumConfig {
            momentum: params.momentum,
            dampening: 0.0,
            nesterov: false,
        }));
    }
    config.init()
}

/// What one epoch produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochSummary {
    /// 0-based epoch index
    pub epoch: usize,
    pub batches: usize,
    pub mean_loss: f64,
    /// Correct training predictions, counted before each step
    pub correct: usize,
    pub seen: usize,
    pub validation: Option<EvaluationResult>,
}

impl EpochSummary {
    /// Training accuracy as a percentage
    pub fn train_accuracy(&self) -> f64 {
        if self.seen == 0 {
            0.0
        } else {
            100.0 * self.correct as f64 / self.seen as f64
        }
    }
}

/// Progress across epochs
#[derive(Debug, Clone, Default)]
pub struct TrainingState {
    /// Next epoch to run
    pub epoch: usize,
    /// Optimizer steps taken in this process
    pub iteration: usize,
    pub samples_seen: usize,
    pub history: Vec<EpochSummary>,
}

/// Owns the model and optimizer for a run
pub struct Trainer<B: AutodiffBackend> {
    pub model: Classifier<B>,
    optimizer: SgdOptimizer<B>,
    config: TrainingConfig,
    variant: ModelVariant,
    pub state: TrainingState,
    device: B::Device,
}

impl<B: AutodiffBackend> Trainer<B> {
    pub fn new(model: Classifier<B>, config: TrainingConfig, device: B::Device) -> Self {
        let optimizer = build_optimizer::<B>(&config.training);
        let variant = model.variant();

        Self {
            model,
            optimizer,
            config,
            variant,
            state: TrainingState::default(),
            device,
        }
    }

    pub fn learning_rate(&self) -> f64 {
        self.config.training.learning_rate
    }

    pub fn weight_decay(&self) -> f64 {
        self.config.training.weight_decay
    }

    /// One pass over `loader`; errors if it yields no batches.
    pub fn train_epoch(&mut self, loader: &CifarLoader<B>) -> Result<EpochSummary> {
        let loss_fn = CrossEntropyLossConfig::new().init(&self.device);
        let lr = self.config.training.learning_rate;

        let mut total_loss = 0.0;
        let mut correct = 0usize;
        let mut seen = 0usize;
        let mut batches = 0usize;

        for batch in loader.iter() {
            let batch_size = batch.targets.dims()[0];
            let output = self.model.forward(batch.images);
            let loss = loss_fn.forward(output.clone(), batch.targets.clone());

            let loss_value: f64 = loss.clone().into_scalar().elem();
            total_loss += loss_value;

            let predictions = output.argmax(1).squeeze::<1>(1);
            let batch_correct: i64 = predictions.equal(batch.targets).int().sum().into_scalar().elem();
            correct += batch_correct as usize;
            seen += batch_size;

            let grads = GradientsParams::from_grads(loss.backward(), &self.model);
            self.model = self.optimizer.step(lr, self.model.clone(), grads);

            batches += 1;
            self.state.iteration += 1;
            self.state.samples_seen += batch_size;

            if batches % 100 == 0 {
                debug!("  Batch {}: loss = {:.4}", batches, loss_value);
            }
        }

        if batches == 0 {
            return Err(Error::Training("training loader produced no batches".to_string()));
        }

        Ok(EpochSummary {
            epoch: self.state.epoch,
            batches,
            mean_loss: total_loss / batches as f64,
            correct,
            seen,
            validation: None,
        })
    }

    /// Train from the current epoch up to `num_epochs`.
    ///
    /// `on_epoch` sees every finished summary, validation included.
    pub fn fit<F>(
        &mut self,
        train: &CifarLoader<B>,
        validation: &CifarLoader<B::InnerBackend>,
        mut on_epoch: F,
    ) -> Result<()>
    where
        F: FnMut(&EpochSummary),
    {
        let num_epochs = self.config.training.num_epochs;
        if self.state.epoch >= num_epochs {
            info!("Already trained {} of {} epochs, nothing to do", self.state.epoch, num_epochs);
            return Ok(());
        }

        info!(
            "Training {} from epoch {} to {}",
            self.variant,
            self.state.epoch + 1,
            num_epochs
        );

        for epoch in self.state.epoch..num_epochs {
            self.state.epoch = epoch;
            let mut summary = self.train_epoch(train)?;

            if self.config.checkpoint.save {
                self.save_checkpoint(epoch)?;
            }

            info!("Epoch {}/{}: mean loss this epoch: {:.4}", epoch + 1, num_epochs, summary.mean_loss);

            info!("VALIDATION:");
            summary.validation = Some(evaluate(&self.model.valid(), validation)?);

            info!("Accuracy Training: {:.2}%", summary.train_accuracy());

            self.state.epoch = epoch + 1;
            on_epoch(&summary);
            self.state.history.push(summary);
        }

        Ok(())
    }

    /// Checkpoint the state at the end of 0-based epoch `completed_epoch`.
    pub fn save_checkpoint(&self, completed_epoch: usize) -> Result<()> {
        let state = CheckpointState::after_epoch(completed_epoch, self.variant, &self.config.training);
        checkpoint::save_checkpoint(&self.config.checkpoint.path, &self.model, &self.optimizer, &state)
    }

    /// Restore model, optimizer and epoch counter from `dir`.
    ///
    /// The optimizer is rebuilt from the current config before its record is
    /// loaded, so the current learning rate and weight decay apply.
    pub fn load_checkpoint(&mut self, dir: &Path) -> Result<()> {
        let state = CheckpointState::load(dir)?;
        if state.variant != self.variant {
            return Err(Error::Checkpoint(format!(
                "checkpoint holds a {} model but this run trains {}",
                state.variant, self.variant
            )));
        }

        self.model = checkpoint::load_model(dir, self.model.clone(), &self.device)?;
        let optimizer = build_optimizer::<B>(&self.config.training);
        self.optimizer = checkpoint::load_optimizer::<B, _>(dir, optimizer, &self.device)?;
        self.state.epoch = state.epoch;

        info!("=> loaded checkpoint from {} (next epoch {})", dir.display(), state.epoch + 1);
        if state.learning_rate != self.learning_rate() || state.weight_decay != self.weight_decay() {
            info!(
                "Using lr = {}, weight decay = {} from the current config (checkpoint had {}, {})",
                self.learning_rate(),
                self.weight_decay(),
                state.learning_rate,
                state.weight_decay
            );
        }
        Ok(())
    }

    /// Load from the configured checkpoint path
    pub fn resume(&mut self) -> Result<()> {
        let dir = self.config.checkpoint.path.clone();
        self.load_checkpoint(&dir)
    }

    /// Write one CSV row per finished epoch
    pub fn export_history_csv(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = File::create(path)?;
        writeln!(file, "epoch,mean_loss,train_accuracy,validation_accuracy")?;
        for summary in &self.state.history {
            let validation = summary
                .validation
                .as_ref()
                .map(|v| format!("{:.4}", v.accuracy))
                .unwrap_or_default();
            writeln!(
                file,
                "{},{:.6},{:.4},{}",
                summary.epoch + 1,
                summary.mean_loss,
                summary.train_accuracy(),
                validation
            )?;
        }

        info!("Training history exported to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::init_model;
    use burn::backend::Autodiff;
    use burn_ndarray::NdArray;
    use cifar_core::{DataSplit, IMAGE_PIXELS};
    use cifar_dataset::{make_loader, CifarDataset, CifarItem, EVAL_TRANSFORM, TRAIN_TRANSFORM};
    use std::sync::Arc;
    use tempfile::TempDir;

    type B = Autodiff<NdArray>;
    type Inner = NdArray;

    fn dataset(n: usize, split: DataSplit) -> CifarDataset {
        let records: Vec<CifarItem> = (0..n)
            .map(|i| CifarItem::new(vec![(i * 61 % 256) as u8; IMAGE_PIXELS], i % 10))
            .collect();
        CifarDataset::new(Arc::new(records), split)
    }

    fn config(dir: &Path) -> TrainingConfig {
        let mut config = TrainingConfig::default();
        config.model.selection = cifar_core::ModelSelection::only(ModelVariant::FullyConnected);
        config.model.pretrained = false;
        config.training.batch_size = 2;
        config.training.num_epochs = 1;
        config.training.learning_rate = 0.01;
        config.training.momentum = 0.9;
        config.data.shuffle = false;
        config.checkpoint.path = dir.join("ckpt");
        config
    }

    fn trainer(config: &TrainingConfig) -> Trainer<B> {
        let device = Default::default();
        let model = init_model::<B>(ModelVariant::FullyConnected, &config.model, &device);
        Trainer::new(model, config.clone(), device)
    }

    fn loaders(config: &TrainingConfig, train: usize) -> (CifarLoader<B>, CifarLoader<Inner>) {
        let device = Default::default();
        (
            make_loader::<B>(dataset(train, DataSplit::Train), TRAIN_TRANSFORM, config, None, &device),
            make_loader::<Inner>(dataset(2, DataSplit::Validation), EVAL_TRANSFORM, config, None, &device),
        )
    }

    fn weights(model: &Classifier<B>) -> Vec<f32> {
        match model {
            Classifier::FullyConnected(net) => [&net.fc1, &net.fc2, &net.fc3]
                .iter()
                .flat_map(|layer| {
                    let mut values: Vec<f32> = layer.weight.val().into_data().to_vec().unwrap();
                    if let Some(bias) = &layer.bias {
                        values.extend(bias.val().into_data().to_vec::<f32>().unwrap());
                    }
                    values
                })
                .collect(),
            Classifier::Vgg16(_) => unreachable!("tests train the fully-connected variant"),
        }
    }

    #[test]
    fn test_four_images_batch_two_runs_two_batches() {
        let dir = TempDir::new().unwrap();
        let config = config(dir.path());
        let (train, _) = loaders(&config, 4);
        let mut trainer = trainer(&config);

        let summary = trainer.train_epoch(&train).unwrap();
        assert_eq!(summary.batches, 2);
        assert_eq!(summary.seen, 4);
        assert!(summary.mean_loss.is_finite());
        assert!((0.0..=100.0).contains(&summary.train_accuracy()));
        assert_eq!(trainer.state.iteration, 2);
    }

    #[test]
    fn test_empty_training_loader_is_an_error() {
        let dir = TempDir::new().unwrap();
        let config = config(dir.path());
        let (train, _) = loaders(&config, 0);
        let mut trainer = trainer(&config);

        assert!(matches!(trainer.train_epoch(&train), Err(Error::Training(_))));
    }

    #[test]
    fn test_fit_evaluates_and_saves_every_epoch() {
        let dir = TempDir::new().unwrap();
        let mut config = config(dir.path());
        config.training.num_epochs = 2;
        config.checkpoint.save = true;
        let (train, validation) = loaders(&config, 4);
        let mut trainer = trainer(&config);

        let mut seen = Vec::new();
        trainer.fit(&train, &validation, |s| seen.push(s.epoch)).unwrap();

        assert_eq!(seen, vec![0, 1]);
        assert_eq!(trainer.state.epoch, 2);
        assert!(trainer.state.history.iter().all(|s| s.validation.as_ref().unwrap().total == 2));
        assert!(checkpoint::checkpoint_exists(&config.checkpoint.path));
        assert_eq!(CheckpointState::load(&config.checkpoint.path).unwrap().epoch, 2);

        let csv = dir.path().join("history.csv");
        trainer.export_history_csv(&csv).unwrap();
        assert_eq!(std::fs::read_to_string(csv).unwrap().lines().count(), 3);
    }

    #[test]
    fn test_checkpoint_round_trip_is_bit_identical() {
        let dir = TempDir::new().unwrap();
        let config = config(dir.path());
        let (train, _) = loaders(&config, 4);

        let mut original = trainer(&config);
        original.train_epoch(&train).unwrap();
        original.save_checkpoint(0).unwrap();

        let mut restored = trainer(&config);
        assert_ne!(weights(&restored.model), weights(&original.model));
        restored.resume().unwrap();

        assert_eq!(weights(&restored.model), weights(&original.model));
        assert_eq!(restored.state.epoch, 1);

        // both continue identically from the restored momentum buffers
        original.train_epoch(&train).unwrap();
        restored.train_epoch(&train).unwrap();
        assert_eq!(weights(&restored.model), weights(&original.model));
    }

    #[test]
    fn test_resume_applies_current_hyperparameters() {
        let dir = TempDir::new().unwrap();
        let config = config(dir.path());
        let (train, _) = loaders(&config, 4);

        let mut original = trainer(&config);
        original.train_epoch(&train).unwrap();
        original.save_checkpoint(0).unwrap();

        let resumed_with = |config: &TrainingConfig| {
            let mut trainer = trainer(config);
            trainer.resume().unwrap();
            trainer.train_epoch(&train).unwrap();
            weights(&trainer.model)
        };

        let unchanged = resumed_with(&config);

        let mut decayed = config.clone();
        decayed.training.weight_decay = 0.5;
        assert_ne!(resumed_with(&decayed), unchanged);

        let mut faster = config.clone();
        faster.training.learning_rate = 0.05;
        assert_ne!(resumed_with(&faster), unchanged);

        // stored values stay as saved
        let stored = CheckpointState::load(&config.checkpoint.path).unwrap();
        assert_eq!(stored.learning_rate, 0.01);
        assert_eq!(stored.weight_decay, 0.0);
    }

    #[test]
    fn test_resume_matches_fresh_optimizer_from_current_config() {
        let dir = TempDir::new().unwrap();
        let config = config(dir.path());
        let (train, _) = loaders(&config, 4);

        let mut original = trainer(&config);
        original.train_epoch(&train).unwrap();
        original.save_checkpoint(0).unwrap();

        let mut changed = config.clone();
        changed.training.learning_rate = 0.05;
        changed.training.weight_decay = 0.01;

        let mut resumed = trainer(&changed);
        resumed.resume().unwrap();
        resumed.train_epoch(&train).unwrap();

        let dir = &config.checkpoint.path;
        let device = Default::default();
        let mut manual = trainer(&changed);
        manual.model = checkpoint::load_model(dir, manual.model.clone(), &device).unwrap();
        manual.optimizer =
            checkpoint::load_optimizer::<B, _>(dir, build_optimizer::<B>(&changed.training), &device).unwrap();
        manual.train_epoch(&train).unwrap();

        assert_eq!(weights(&resumed.model), weights(&manual.model));
    }

    #[test]
    fn test_resume_continues_from_stored_epoch() {
        let dir = TempDir::new().unwrap();
        let mut config = config(dir.path());
        config.training.num_epochs = 2;
        config.checkpoint.save = true;
        let (train, validation) = loaders(&config, 4);

        trainer(&config).fit(&train, &validation, |_| {}).unwrap();

        config.training.num_epochs = 3;
        let mut resumed = trainer(&config);
        resumed.resume().unwrap();

        let mut epochs = Vec::new();
        resumed.fit(&train, &validation, |s| epochs.push(s.epoch)).unwrap();
        assert_eq!(epochs, vec![2]);
    }

    #[test]
    fn test_missing_checkpoint_is_fatal() {
        let dir = TempDir::new().unwrap();
        let config = config(dir.path());
        let mut trainer = trainer(&config);
        assert!(matches!(trainer.resume(), Err(Error::Checkpoint(_))));
    }

    #[test]
    fn test_variant_mismatch_is_rejected() {
        let dir = TempDir::new().unwrap();
        let config = config(dir.path());
        std::fs::create_dir_all(&config.checkpoint.path).unwrap();
        CheckpointState::after_epoch(0, ModelVariant::Convolutional, &config.training)
            .save(&config.checkpoint.path)
            .unwrap();

        let mut trainer = trainer(&config);
        assert!(matches!(trainer.resume(), Err(Error::Checkpoint(_))));
    }
}
