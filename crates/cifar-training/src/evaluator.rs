//! Accuracy evaluation in inference mode.
//!
//! Callers pass a model on the inner backend (`AutodiffModule::valid()`), so
//! dropout is off and no gradients are tracked. The training model is never
//! touched.

use burn::tensor::backend::Backend;
use cifar_core::{Error, Result, CLASS_NAMES, NUM_CLASSES};
use cifar_dataset::CifarLoader;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::model::Classifier;

/// Result of evaluating a model over one loader
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub correct: usize,
    pub total: usize,
    /// Percentage in [0, 100]
    pub accuracy: f64,
    /// Correct predictions per true class
    pub class_correct: [usize; NUM_CLASSES],
    /// Samples per true class
    pub class_total: [usize; NUM_CLASSES],
}

impl EvaluationResult {
    /// Build from per-class tallies; errors when no samples were seen.
    pub fn from_counts(class_correct: [usize; NUM_CLASSES], class_total: [usize; NUM_CLASSES]) -> Result<Self> {
        let correct: usize = class_correct.iter().sum();
        let total: usize = class_total.iter().sum();
        if total == 0 {
            return Err(Error::EmptyEvaluation);
        }

        Ok(Self {
            correct,
            total,
            accuracy: 100.0 * correct as f64 / total as f64,
            class_correct,
            class_total,
        })
    }

    /// Accuracy of one class as a percentage, `None` if it had no samples
    pub fn class_accuracy(&self, class: usize) -> Option<f64> {
        match self.class_total[class] {
            0 => None,
            n => Some(100.0 * self.class_correct[class] as f64 / n as f64),
        }
    }

    /// Print a per-class table
    pub fn print_results(&self) {
        println!("\n{}", "=".repeat(48));
        println!("Got {} / {} correct ({:.2})", self.correct, self.total, self.accuracy);
        println!("{}", "-".repeat(48));
        println!("{:<12} {:>10} {:>10} {:>10}", "Class", "Correct", "Total", "Acc (%)");
        for (class, name) in CLASS_NAMES.iter().enumerate() {
            let acc = self
                .class_accuracy(class)
                .map(|a| format!("{:.2}", a))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "{:<12} {:>10} {:>10} {:>10}",
                name, self.class_correct[class], self.class_total[class], acc
            );
        }
        println!("{}", "=".repeat(48));
    }
}

/// Count argmax matches of `model` over every batch of `loader`.
pub fn evaluate<B: Backend>(model: &Classifier<B>, loader: &CifarLoader<B>) -> Result<EvaluationResult> {
    let mut class_correct = [0usize; NUM_CLASSES];
    let mut class_total = [0usize; NUM_CLASSES];

    for batch in loader.iter() {
        let predictions = model.forward(batch.images).argmax(1).squeeze::<1>(1);

        let predictions = predictions.into_data();
        let targets = batch.targets.into_data();
        for (pred, target) in predictions.iter::<i64>().zip(targets.iter::<i64>()) {
            let target = target as usize;
            if target >= NUM_CLASSES {
                return Err(Error::Dataset(format!("target label {} out of range", target)));
            }
            class_total[target] += 1;
            if pred as usize == target {
                class_correct[target] += 1;
            }
        }
    }

    let result = EvaluationResult::from_counts(class_correct, class_total)?;
    debug!("Per-class totals: {:?}", result.class_total);
    info!("Got {} / {} correct ({:.2})", result.correct, result.total, result.accuracy);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::init_model;
    use burn_ndarray::NdArray;
    use cifar_core::{DataSplit, ModelConfig, ModelVariant, TrainingConfig, IMAGE_PIXELS};
    use cifar_dataset::{make_loader, CifarDataset, CifarItem, EVAL_TRANSFORM};
    use std::sync::Arc;

    type B = NdArray;

    fn loader(n: usize) -> CifarLoader<B> {
        let records: Vec<CifarItem> = (0..n)
            .map(|i| CifarItem::new(vec![(i * 37 % 256) as u8; IMAGE_PIXELS], i % 10))
            .collect();
        let dataset = CifarDataset::new(Arc::new(records), DataSplit::Test);

        let mut config = TrainingConfig::default();
        config.training.batch_size = 4;
        make_loader::<B>(dataset, EVAL_TRANSFORM, &config, None, &Default::default())
    }

    #[test]
    fn test_accuracy_in_range() {
        let device = Default::default();
        let model = init_model::<B>(ModelVariant::FullyConnected, &ModelConfig::default(), &device);

        let result = evaluate(&model, &loader(10)).unwrap();
        assert_eq!(result.total, 10);
        assert!(result.correct <= result.total);
        assert!((0.0..=100.0).contains(&result.accuracy));
        assert_eq!(result.class_total, [1; 10]);
    }

    #[test]
    fn test_empty_loader_is_an_error() {
        let device = Default::default();
        let model = init_model::<B>(ModelVariant::FullyConnected, &ModelConfig::default(), &device);

        let err = evaluate(&model, &loader(0)).unwrap_err();
        assert!(matches!(err, Error::EmptyEvaluation));
    }

    #[test]
    fn test_from_counts() {
        let mut correct = [0; NUM_CLASSES];
        let mut total = [0; NUM_CLASSES];
        correct[0] = 3;
        total[0] = 4;
        total[1] = 4;

        let result = EvaluationResult::from_counts(correct, total).unwrap();
        assert_eq!(result.correct, 3);
        assert_eq!(result.total, 8);
        assert_eq!(result.accuracy, 37.5);
        assert_eq!(result.class_accuracy(0), Some(75.0));
        assert_eq!(result.class_accuracy(1), Some(0.0));
        assert_eq!(result.class_accuracy(2), None);
    }
}
