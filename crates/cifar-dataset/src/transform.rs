//! Pixel transforms applied while batching.

use burn::prelude::*;

/// Per-channel CIFAR-10 mean, after scaling to [0, 1]
pub const CIFAR10_MEAN: [f32; 3] = [0.4914, 0.4822, 0.4465];

/// Per-channel CIFAR-10 standard deviation, after scaling to [0, 1]
pub const CIFAR10_STD: [f32; 3] = [0.247, 0.243, 0.261];

/// Scale bytes to [0, 1], then normalize each channel: `(x - mean) / std`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalize {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Normalize {
    pub const fn new(mean: [f32; 3], std: [f32; 3]) -> Self {
        Self { mean, std }
    }

    /// Apply to a batch of raw byte values shaped [batch, 3, height, width].
    pub fn apply<B: Backend>(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        let device = images.device();
        let mean = Tensor::<B, 4>::from_floats(TensorData::new(self.mean.to_vec(), [1, 3, 1, 1]), &device);
        let std = Tensor::<B, 4>::from_floats(TensorData::new(self.std.to_vec(), [1, 3, 1, 1]), &device);

        (images / 255.0 - mean) / std
    }
}

/// Transform used for the training split
pub const TRAIN_TRANSFORM: Normalize = Normalize::new(CIFAR10_MEAN, CIFAR10_STD);

/// Transform used for the validation and test splits
pub const EVAL_TRANSFORM: Normalize = Normalize::new(CIFAR10_MEAN, CIFAR10_STD);
