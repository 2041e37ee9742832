//! Builds the train, validation and test data loaders.

use std::sync::Arc;

use burn::data::dataloader::{DataLoader, DataLoaderBuilder};
use burn::tensor::backend::{AutodiffBackend, Backend};
use cifar_core::{DataSplit, Result, TrainingConfig};
use tracing::{debug, info};

use crate::batcher::{CifarBatch, CifarBatcher};
use crate::cifar10;
use crate::dataset::{split_train_validation, CifarDataset, CifarItem};
use crate::transform::{Normalize, EVAL_TRANSFORM, TRAIN_TRANSFORM};

/// Loader yielding batches on backend `B`
pub type CifarLoader<B> = Arc<dyn DataLoader<B, CifarBatch<B>>>;

/// The three loaders of a run.
///
/// Training batches live on the autodiff backend; validation and test batches
/// on its inner backend, where the evaluator runs.
pub struct CifarLoaders<B: AutodiffBackend> {
    pub train: CifarLoader<B>,
    pub validation: CifarLoader<B::InnerBackend>,
    pub test: CifarLoader<B::InnerBackend>,
}

/// Read CIFAR-10 from `config.data.data_dir` (downloading first when enabled)
/// and build all three loaders.
pub fn load_cifar10<B: AutodiffBackend>(config: &TrainingConfig, device: &B::Device) -> Result<CifarLoaders<B>> {
    let data_dir = &config.data.data_dir;
    if config.data.download && !cifar10::is_present(data_dir) {
        cifar10::download_cifar10(data_dir)?;
    }

    let training = cifar10::load_training_records(data_dir)?;
    let test = cifar10::load_test_records(data_dir)?;
    build_loaders(training, test, config, device)
}

/// Split the training records and wrap every split in a loader.
pub fn build_loaders<B: AutodiffBackend>(
    training_records: Vec<CifarItem>,
    test_records: Vec<CifarItem>,
    config: &TrainingConfig,
    device: &B::Device,
) -> Result<CifarLoaders<B>> {
    let (train_indices, validation_indices) = split_train_validation(
        training_records.len(),
        config.data.train_size,
        config.data.validation_size,
        config.seed,
    )?;

    let records = Arc::new(training_records);
    let train = CifarDataset::subset(records.clone(), train_indices, DataSplit::Train)?;
    let validation = CifarDataset::subset(records, validation_indices, DataSplit::Validation)?;
    let test = CifarDataset::new(Arc::new(test_records), DataSplit::Test);

    info!(
        "Dataset splits: {} train, {} validation, {} test",
        train.indices().len(),
        validation.indices().len(),
        test.indices().len()
    );
    debug!("Train class distribution: {:?}", train.class_distribution());
    debug!("Validation class distribution: {:?}", validation.class_distribution());

    let shuffle_seed = config.data.shuffle.then_some(config.seed);
    Ok(CifarLoaders {
        train: make_loader::<B>(train, TRAIN_TRANSFORM, config, shuffle_seed, device),
        validation: make_loader::<B::InnerBackend>(validation, EVAL_TRANSFORM, config, None, device),
        test: make_loader::<B::InnerBackend>(test, EVAL_TRANSFORM, config, None, device),
    })
}

/// Loader over one split; only the training split is ever shuffled.
///
/// Worker threads deliver batches in completion order, so they are only
/// used for the validation and test splits. The training loader always
/// yields batches in dataset (or seeded shuffle) order.
pub fn make_loader<B: Backend>(
    dataset: CifarDataset,
    transform: Normalize,
    config: &TrainingConfig,
    shuffle_seed: Option<u64>,
    device: &B::Device,
) -> CifarLoader<B> {
    let mut builder = DataLoaderBuilder::new(CifarBatcher::new(transform))
        .batch_size(config.training.batch_size)
        .set_device(device.clone());

    if let Some(seed) = shuffle_seed {
        builder = builder.shuffle(seed);
    }
    if config.training.num_workers > 1 && dataset.split() != DataSplit::Train {
        builder = builder.num_workers(config.training.num_workers);
    }

    builder.build(dataset)
}
