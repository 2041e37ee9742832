//! Batcher turning CIFAR-10 records into normalized tensors.

use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;
use cifar_core::{IMAGE_CHANNELS, IMAGE_SIZE};

use crate::dataset::CifarItem;
use crate::transform::Normalize;

/// A batch of CIFAR-10 images for training or evaluation
#[derive(Clone, Debug)]
pub struct CifarBatch<B: Backend> {
    /// Normalized images with shape [batch_size, 3, 32, 32]
    pub images: Tensor<B, 4>,
    /// Labels with shape [batch_size], aligned with `images`
    pub targets: Tensor<B, 1, Int>,
}

/// Stacks records and applies a [`Normalize`] transform
#[derive(Clone, Debug)]
pub struct CifarBatcher {
    transform: Normalize,
}

impl CifarBatcher {
    pub fn new(transform: Normalize) -> Self {
        Self { transform }
    }
}

impl<B: Backend> Batcher<B, CifarItem, CifarBatch<B>> for CifarBatcher {
    fn batch(&self, items: Vec<CifarItem>, device: &B::Device) -> CifarBatch<B> {
        let batch_size = items.len();

        // Records are already channel-planar, so they stack straight into NCHW
        let pixels: Vec<f32> = items
            .iter()
            .flat_map(|item| item.pixels.iter().map(|&p| p as f32))
            .collect();
        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(pixels, [batch_size, IMAGE_CHANNELS, IMAGE_SIZE, IMAGE_SIZE]),
            device,
        );
        let images = self.transform.apply(images);

        let labels: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let targets = Tensor::<B, 1, Int>::from_data(TensorData::new(labels, [batch_size]), device);

        CifarBatch { images, targets }
    }
}
