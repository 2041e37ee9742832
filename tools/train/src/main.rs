//! Training CLI Tool
//!
//! Trains the modified VGG16 or the fully-connected network on CIFAR-10, and
//! evaluates saved checkpoints on the test set.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use cifar_core::{
    backend_name, load_toml_config, save_toml_config, select_device, setup_cli_logging, DataSplit, DefaultBackend,
    ModelSelection, ModelVariant, TrainingBackend, TrainingConfig,
};
use cifar_dataset::{load_cifar10, load_test_records, make_loader, CifarDataset, EVAL_TRANSFORM};
use cifar_training::{build_model, checkpoint, evaluate, init_model, CheckpointState, Trainer};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum VariantArg {
    /// Modified VGG16
    Cnn,
    /// Fully-connected network
    Fc,
}

impl From<VariantArg> for ModelVariant {
    fn from(arg: VariantArg) -> Self {
        match arg {
            VariantArg::Cnn => ModelVariant::Convolutional,
            VariantArg::Fc => ModelVariant::FullyConnected,
        }
    }
}

/// CIFAR-10 Training Tool
#[derive(Parser, Debug)]
#[command(
    name = "cifar-train",
    about = "Train and evaluate CIFAR-10 classifiers",
    long_about = "Train a modified VGG16 or a fully-connected network on CIFAR-10 with SGD, \
                  validating after every epoch, and evaluate saved checkpoints on the test set."
)]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train a model
    Train(TrainArgs),
    /// Report test-set accuracy of a saved checkpoint
    Evaluate(EvaluateArgs),
}

#[derive(Args, Debug)]
struct TrainArgs {
    /// Path to training configuration file (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override number of epochs
    #[arg(short, long, value_name = "N")]
    epochs: Option<usize>,

    /// Override learning rate
    #[arg(short, long, value_name = "LR")]
    lr: Option<f64>,

    /// Override batch size
    #[arg(short, long, value_name = "SIZE")]
    batch_size: Option<usize>,

    /// Train this variant instead of the configured one
    #[arg(long, value_enum)]
    variant: Option<VariantArg>,

    /// Resume from the configured checkpoint
    #[arg(short, long)]
    resume: bool,

    /// Save a checkpoint after every epoch
    #[arg(short, long)]
    save: bool,

    /// Write per-epoch history to this CSV file
    #[arg(long, value_name = "FILE")]
    history: Option<PathBuf>,

    /// Dry run (validate config without training)
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args, Debug)]
struct EvaluateArgs {
    /// Checkpoint directory to evaluate
    #[arg(long, value_name = "DIR")]
    checkpoint: PathBuf,

    /// Configuration file for data location and batch size
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_cli_logging(cli.verbose)?;

    info!("CIFAR-10 Classification - Training Tool");
    info!("=======================================");

    match cli.command {
        Command::Train(args) => run_training(&args),
        Command::Evaluate(args) => run_evaluation(&args),
    }
}

fn load_config(path: Option<&Path>) -> Result<TrainingConfig> {
    match path {
        Some(path) => load_toml_config(path)
            .with_context(|| format!("Failed to load configuration file: {}", path.display())),
        None => {
            info!("No configuration file given, using defaults");
            Ok(TrainingConfig::default())
        }
    }
}

fn apply_overrides(config: &mut TrainingConfig, args: &TrainArgs) {
    if let Some(epochs) = args.epochs {
        config.training.num_epochs = epochs;
    }
    if let Some(lr) = args.lr {
        config.training.learning_rate = lr;
    }
    if let Some(batch_size) = args.batch_size {
        config.training.batch_size = batch_size;
    }
    if let Some(variant) = args.variant {
        config.model.selection = ModelSelection::only(variant.into());
    }
    if args.resume {
        config.checkpoint.resume = true;
    }
    if args.save {
        config.checkpoint.save = true;
    }
}

fn print_config_summary(config: &TrainingConfig, variant: ModelVariant) {
    info!("");
    info!("Configuration Summary:");
    info!("  Model: {}", variant);
    info!("  Pretrained: {}", config.model.pretrained);
    info!("  Dropout: {}", config.model.dropout);
    info!("  Epochs: {}", config.training.num_epochs);
    info!("  Batch size: {}", config.training.batch_size);
    info!("  Learning rate: {}", config.training.learning_rate);
    info!("  Weight decay: {}", config.training.weight_decay);
    info!("  Momentum: {}", config.training.momentum);
    info!("  Device: {} ({})", config.device, backend_name());
    info!("  Data dir: {}", config.data.data_dir.display());
    info!(
        "  Split: {} train / {} validation",
        config.data.train_size, config.data.validation_size
    );
    info!("  Checkpoint: {}", config.checkpoint.path.display());
    info!("  Save / resume: {} / {}", config.checkpoint.save, config.checkpoint.resume);
    info!("");
}

fn run_training(args: &TrainArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    apply_overrides(&mut config, args);

    let variant = config.validate().context("Invalid configuration")?;
    print_config_summary(&config, variant);

    if args.dry_run {
        info!("Configuration validated successfully (dry run)");
        return Ok(());
    }

    if config.checkpoint.save {
        let config_path = config.checkpoint.path.join("config.toml");
        save_toml_config(&config, &config_path).context("Failed to save configuration")?;
        info!("Configuration saved to: {}", config_path.display());
    }

    let device = select_device(config.device);

    info!("Loading dataset...");
    let loaders = load_cifar10::<TrainingBackend>(&config, &device).context("Failed to load CIFAR-10")?;

    let model = build_model::<TrainingBackend>(variant, &config.model, &device).context("Failed to build model")?;
    let mut trainer = Trainer::new(model, config.clone(), device);

    if config.checkpoint.resume {
        trainer.resume().with_context(|| {
            format!("Failed to resume from checkpoint: {}", config.checkpoint.path.display())
        })?;
    }

    let total_epochs = config.training.num_epochs;
    let progress = ProgressBar::new(total_epochs as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} epochs ({eta})")?
            .progress_chars("=>-"),
    );
    progress.set_position(trainer.state.epoch as u64);

    info!("Starting training");
    trainer.fit(&loaders.train, &loaders.validation, |summary| {
        progress.set_position(summary.epoch as u64 + 1);
        if let Some(validation) = &summary.validation {
            progress.set_message(format!("val {:.2}%", validation.accuracy));
        }
    })?;
    progress.finish_with_message("Training completed");

    let history_path = args
        .history
        .clone()
        .or_else(|| config.checkpoint.save.then(|| config.checkpoint.path.join("history.csv")));
    if let Some(path) = history_path {
        trainer
            .export_history_csv(&path)
            .with_context(|| format!("Failed to export history to {}", path.display()))?;
    }

    match trainer.state.history.last() {
        Some(last) => {
            info!("");
            info!("Training Summary:");
            info!("  Epochs run: {}", trainer.state.history.len());
            info!("  Final mean loss: {:.4}", last.mean_loss);
            info!("  Final training accuracy: {:.2}%", last.train_accuracy());
            if let Some(validation) = &last.validation {
                info!("  Final validation accuracy: {:.2}%", validation.accuracy);
            }
        }
        None => warn!("No epochs were run"),
    }

    info!("Training completed successfully!");
    Ok(())
}

fn run_evaluation(args: &EvaluateArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let state = CheckpointState::load(&args.checkpoint)
        .with_context(|| format!("Failed to read checkpoint: {}", args.checkpoint.display()))?;
    info!("Checkpoint holds a {} model after {} epochs", state.variant, state.epoch);

    let device = select_device(config.device);
    let model = init_model::<DefaultBackend>(state.variant, &config.model, &device);
    let model = checkpoint::load_model(&args.checkpoint, model, &device).context("Failed to load model weights")?;

    info!("Loading test set from {}", config.data.data_dir.display());
    let records = load_test_records(&config.data.data_dir).context("Failed to load CIFAR-10 test set")?;
    let dataset = CifarDataset::new(Arc::new(records), DataSplit::Test);
    let loader = make_loader::<DefaultBackend>(dataset, EVAL_TRANSFORM, &config, None, &device);

    let result = evaluate(&model, &loader).context("Evaluation failed")?;
    result.print_results();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn train_args(argv: &[&str]) -> TrainArgs {
        let cli = Cli::try_parse_from(argv).unwrap();
        match cli.command {
            Command::Train(args) => args,
            Command::Evaluate(_) => panic!("expected train subcommand"),
        }
    }

    #[test]
    fn test_overrides_applied() {
        let args = train_args(&[
            "cifar-train", "train", "--epochs", "3", "--lr", "0.01", "--batch-size", "16", "--variant", "fc", "--save",
        ]);
        let mut config = TrainingConfig::default();
        apply_overrides(&mut config, &args);

        assert_eq!(config.training.num_epochs, 3);
        assert_eq!(config.training.learning_rate, 0.01);
        assert_eq!(config.training.batch_size, 16);
        assert_eq!(config.validate().unwrap(), ModelVariant::FullyConnected);
        assert!(config.checkpoint.save);
        assert!(!config.checkpoint.resume);
    }

    #[test]
    fn test_config_file_then_overrides() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("train.toml");
        std::fs::write(&path, "[training]\nnum_epochs = 20\nweight_decay = 0.0005\n").unwrap();

        let args = train_args(&["cifar-train", "train", "--epochs", "5"]);
        let mut config = load_config(Some(&path)).unwrap();
        apply_overrides(&mut config, &args);

        assert_eq!(config.training.num_epochs, 5);
        assert_eq!(config.training.weight_decay, 0.0005);
        assert_eq!(config.validate().unwrap(), ModelVariant::Convolutional);
    }

    #[test]
    fn test_evaluate_requires_checkpoint() {
        assert!(Cli::try_parse_from(["cifar-train", "evaluate"]).is_err());
    }
}
