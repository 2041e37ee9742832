//! Classifier architectures for CIFAR-10.
//!
//! - [`Vgg16`]: VGG16 with three of its five max-pools removed, so a 32x32
//!   input reaches the classifier at 8x8 before the 7x7 adaptive pool.
//! - [`FullyNet`]: three linear layers over the flattened 3072 pixels.
//!
//! [`Classifier`] wraps whichever variant a run selected.

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        Dropout, DropoutConfig, Initializer, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};
use cifar_core::{ModelConfig, ModelVariant, IMAGE_PIXELS};
use tracing::info;

use crate::pretrained;

/// Output channels of the 13 VGG16 convolutions
const VGG16_CHANNELS: [usize; 13] = [64, 64, 128, 128, 256, 256, 256, 512, 512, 512, 512, 512, 512];

/// Convolutions followed by a max-pool. Only the second and fifth VGG pools
/// are kept.
const POOL_AFTER: [usize; 2] = [3, 12];

/// Spatial size produced by the adaptive pool
const POOLED_SIZE: usize = 7;

/// Configuration for the modified VGG16
#[derive(Config, Debug)]
pub struct Vgg16Config {
    /// Number of output classes
    #[config(default = "10")]
    pub num_classes: usize,

    /// Dropout rate after each hidden linear layer
    #[config(default = "0.0")]
    pub dropout: f64,

    /// Width of the two hidden linear layers
    #[config(default = "4096")]
    pub hidden_size: usize,

    /// Divides every convolution width; 1 is the standard VGG16
    #[config(default = "1")]
    pub width_divisor: usize,
}

impl Vgg16Config {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Vgg16<B> {
        Vgg16 {
            backbone: Vgg16Backbone::new(self, device),
            head: LinearConfig::new(self.hidden_size, self.num_classes).init(device),
        }
    }
}

/// Everything in VGG16 except the final class projection.
///
/// Kept separate so ImageNet weights can be loaded into it while the
/// 10-class head stays freshly initialized.
#[derive(Module, Debug)]
pub struct Vgg16Backbone<B: Backend> {
    pub convs: Vec<Conv2d<B>>,
    pool: MaxPool2d,
    avgpool: AdaptiveAvgPool2d,
    pub fc1: Linear<B>,
    pub fc2: Linear<B>,
    dropout: Dropout,
    relu: Relu,
}

impl<B: Backend> Vgg16Backbone<B> {
    fn new(config: &Vgg16Config, device: &B::Device) -> Self {
        let mut in_channels = 3;
        let convs = VGG16_CHANNELS
            .iter()
            .map(|&channels| {
                let out_channels = (channels / config.width_divisor).max(1);
                let conv = Conv2dConfig::new([in_channels, out_channels], [3, 3])
                    .with_padding(PaddingConfig2d::Explicit(1, 1))
                    .init(device);
                in_channels = out_channels;
                conv
            })
            .collect();

        let flattened = in_channels * POOLED_SIZE * POOLED_SIZE;

        Self {
            convs,
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            avgpool: AdaptiveAvgPool2dConfig::new([POOLED_SIZE, POOLED_SIZE]).init(),
            fc1: LinearConfig::new(flattened, config.hidden_size).init(device),
            fc2: LinearConfig::new(config.hidden_size, config.hidden_size).init(device),
            dropout: DropoutConfig::new(config.dropout).init(),
            relu: Relu::new(),
        }
    }

    /// [batch, 3, 32, 32] -> [batch, hidden_size]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = x;
        for (i, conv) in self.convs.iter().enumerate() {
            x = self.relu.forward(conv.forward(x));
            if POOL_AFTER.contains(&i) {
                x = self.pool.forward(x);
            }
        }

        let x = self.avgpool.forward(x);
        let [batch_size, channels, height, width] = x.dims();
        let x = x.reshape([batch_size, channels * height * width]);

        let x = self.dropout.forward(self.relu.forward(self.fc1.forward(x)));
        self.dropout.forward(self.relu.forward(self.fc2.forward(x)))
    }
}

/// Modified VGG16 classifier
#[derive(Module, Debug)]
pub struct Vgg16<B: Backend> {
    pub backbone: Vgg16Backbone<B>,
    pub head: Linear<B>,
}

impl<B: Backend> Vgg16<B> {
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        self.head.forward(self.backbone.forward(images))
    }
}

/// Configuration for the fully-connected classifier
#[derive(Config, Debug)]
pub struct FullyNetConfig {
    /// Flattened input features
    #[config(default = "3072")]
    pub input_size: usize,

    #[config(default = "10")]
    pub num_classes: usize,

    #[config(default = "0.0")]
    pub dropout: f64,

    /// Kaiming-normal weights instead of the layer defaults
    #[config(default = "true")]
    pub init_weights: bool,
}

impl FullyNetConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> FullyNet<B> {
        let linear = |d_input: usize, d_output: usize| {
            let config = LinearConfig::new(d_input, d_output);
            let config = if self.init_weights {
                config.with_initializer(Initializer::KaimingNormal {
                    gain: std::f64::consts::SQRT_2,
                    fan_out_only: false,
                })
            } else {
                config
            };
            config.init(device)
        };

        FullyNet {
            fc1: linear(self.input_size, 1024),
            fc2: linear(1024, 512),
            fc3: linear(512, self.num_classes),
            dropout: DropoutConfig::new(self.dropout).init(),
            relu: Relu::new(),
        }
    }
}

/// Fully-connected classifier over flattened pixels
#[derive(Module, Debug)]
pub struct FullyNet<B: Backend> {
    pub fc1: Linear<B>,
    pub fc2: Linear<B>,
    pub fc3: Linear<B>,
    dropout: Dropout,
    relu: Relu,
}

impl<B: Backend> FullyNet<B> {
    /// [batch, input_size] -> [batch, num_classes]
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.dropout.forward(self.relu.forward(self.fc1.forward(x)));
        let x = self.dropout.forward(self.relu.forward(self.fc2.forward(x)));
        self.fc3.forward(x)
    }
}

/// The model trained in a run
#[derive(Module, Debug)]
pub enum Classifier<B: Backend> {
    Vgg16(Vgg16<B>),
    FullyConnected(FullyNet<B>),
}

impl<B: Backend> Classifier<B> {
    /// Images [batch, 3, 32, 32] -> class scores [batch, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        match self {
            Classifier::Vgg16(model) => model.forward(images),
            Classifier::FullyConnected(model) => {
                let [batch_size, _, _, _] = images.dims();
                model.forward(images.reshape([batch_size, IMAGE_PIXELS]))
            }
        }
    }

    pub fn variant(&self) -> ModelVariant {
        match self {
            Classifier::Vgg16(_) => ModelVariant::Convolutional,
            Classifier::FullyConnected(_) => ModelVariant::FullyConnected,
        }
    }
}

/// Build the selected variant without pretrained weights
pub fn init_model<B: Backend>(variant: ModelVariant, config: &ModelConfig, device: &B::Device) -> Classifier<B> {
    match variant {
        ModelVariant::Convolutional => Classifier::Vgg16(
            Vgg16Config::new()
                .with_num_classes(config.num_classes)
                .with_dropout(config.dropout)
                .init(device),
        ),
        ModelVariant::FullyConnected => Classifier::FullyConnected(
            FullyNetConfig::new()
                .with_num_classes(config.num_classes)
                .with_dropout(config.dropout)
                .with_init_weights(config.init_weights)
                .init(device),
        ),
    }
}

/// Build the selected variant, loading ImageNet weights into VGG16 when
/// `config.pretrained` is set.
pub fn build_model<B: Backend>(
    variant: ModelVariant,
    config: &ModelConfig,
    device: &B::Device,
) -> cifar_core::Result<Classifier<B>> {
    let model = match init_model(variant, config, device) {
        Classifier::Vgg16(vgg) if config.pretrained => {
            let weights = pretrained::ensure_weights(&config.pretrained_path, config.pretrained_url.as_deref())?;
            Classifier::Vgg16(pretrained::load_vgg16_backbone(vgg, &weights, device)?)
        }
        model => model,
    };

    info!("Built {} classifier with {} parameters", variant, model.num_params());
    Ok(model)
}
