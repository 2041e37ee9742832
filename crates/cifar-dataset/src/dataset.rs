//! Burn dataset over decoded CIFAR-10 records, and the seeded
//! train/validation split.

use std::sync::Arc;

use burn::data::dataset::Dataset;
use cifar_core::{DataSplit, Error, Result, IMAGE_PIXELS, NUM_CLASSES};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// A single CIFAR-10 record
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CifarItem {
    /// Channel-planar RGB bytes [3 * 32 * 32]
    pub pixels: Vec<u8>,
    /// Class label (0-9)
    pub label: usize,
}

impl CifarItem {
    pub fn new(pixels: Vec<u8>, label: usize) -> Self {
        debug_assert_eq!(pixels.len(), IMAGE_PIXELS);
        Self { pixels, label }
    }
}

/// A view into shared records through an index list.
///
/// The train and validation datasets share one allocation of the 50,000
/// training records.
#[derive(Debug, Clone)]
pub struct CifarDataset {
    records: Arc<Vec<CifarItem>>,
    indices: Vec<usize>,
    split: DataSplit,
}

impl CifarDataset {
    /// Dataset over every record, in order
    pub fn new(records: Arc<Vec<CifarItem>>, split: DataSplit) -> Self {
        let indices = (0..records.len()).collect();
        Self {
            records,
            indices,
            split,
        }
    }

    /// Dataset over the given record indices
    pub fn subset(records: Arc<Vec<CifarItem>>, indices: Vec<usize>, split: DataSplit) -> Result<Self> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= records.len()) {
            return Err(Error::Dataset(format!(
                "index {} out of range for {} records",
                bad,
                records.len()
            )));
        }
        Ok(Self {
            records,
            indices,
            split,
        })
    }

    pub fn split(&self) -> DataSplit {
        self.split
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Samples per class
    pub fn class_distribution(&self) -> [usize; NUM_CLASSES] {
        let mut counts = [0usize; NUM_CLASSES];
        for &i in &self.indices {
            counts[self.records[i].label] += 1;
        }
        counts
    }
}

impl Dataset<CifarItem> for CifarDataset {
    fn get(&self, index: usize) -> Option<CifarItem> {
        self.indices
            .get(index)
            .and_then(|&i| self.records.get(i))
            .cloned()
    }

    fn len(&self) -> usize {
        self.indices.len()
    }
}

/// Randomly partition `0..len` into train and validation index lists.
///
/// The sizes must add up to `len`; the same seed always gives the same split.
pub fn split_train_validation(
    len: usize,
    train_size: usize,
    validation_size: usize,
    seed: u64,
) -> Result<(Vec<usize>, Vec<usize>)> {
    if train_size + validation_size != len {
        return Err(Error::Dataset(format!(
            "split sizes {} + {} do not add up to {} records",
            train_size, validation_size, len
        )));
    }

    let mut indices: Vec<usize> = (0..len).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let validation = indices.split_off(train_size);
    Ok((indices, validation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn items(n: usize) -> Arc<Vec<CifarItem>> {
        Arc::new(
            (0..n)
                .map(|i| CifarItem::new(vec![i as u8; IMAGE_PIXELS], i % 10))
                .collect(),
        )
    }

    #[test]
    fn test_split_sizes_and_disjointness() {
        let (train, validation) = split_train_validation(50_000, 40_000, 10_000, 42).unwrap();
        assert_eq!(train.len(), 40_000);
        assert_eq!(validation.len(), 10_000);

        let train_set: HashSet<_> = train.iter().copied().collect();
        let validation_set: HashSet<_> = validation.iter().copied().collect();
        assert_eq!(train_set.len(), 40_000);
        assert_eq!(validation_set.len(), 10_000);
        assert!(train_set.is_disjoint(&validation_set));
        assert!(train_set.union(&validation_set).all(|&i| i < 50_000));
    }

    #[test]
    fn test_split_is_seeded() {
        let a = split_train_validation(100, 80, 20, 7).unwrap();
        let b = split_train_validation(100, 80, 20, 7).unwrap();
        let c = split_train_validation(100, 80, 20, 8).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_split_sizes_must_cover_source() {
        assert!(split_train_validation(50_000, 40_000, 9_999, 0).is_err());
        assert!(split_train_validation(10, 8, 4, 0).is_err());
    }

    #[test]
    fn test_subset_get_and_len() {
        let records = items(20);
        let dataset = CifarDataset::subset(records, vec![3, 15, 0], DataSplit::Validation).unwrap();

        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.get(1).unwrap().label, 5);
        assert_eq!(dataset.get(1).unwrap().pixels[0], 15);
        assert!(dataset.get(3).is_none());
        assert_eq!(dataset.split(), DataSplit::Validation);
    }

    #[test]
    fn test_subset_rejects_out_of_range() {
        assert!(CifarDataset::subset(items(4), vec![4], DataSplit::Train).is_err());
    }

    #[test]
    fn test_class_distribution() {
        let dataset = CifarDataset::new(items(20), DataSplit::Train);
        assert_eq!(dataset.class_distribution(), [2; 10]);
    }
}
