use std::path::Path;

use burn::nn::PaddingConfig2d;
use burn::nn::conv::Conv2d;
use burn::nn::conv::Conv2dConfig;
use burn::nn::pool::MaxPool2d;
use burn::nn::pool::MaxPool2dConfig;
use burn::record::FullPrecisionSettings;
use burn::record::NamedMpkFileRecorder;
use burn::record::Recorder;
use burn::record::RecorderError;
use burn::{
    module::Module,
    tensor::{Tensor, activation::relu, backend::Backend},
};

use super::freeze_if;

/// Number of output channels of the last convolution block.
pub const BACKBONE_CHANNELS: usize = 512;

/// Backbone layers in forward order, pools included, named after their block.
pub const BACKBONE_LAYERS: [&str; 18] = [
    "block1_conv1",
    "block1_conv2",
    "block1_pool",
    "block2_conv1",
    "block2_conv2",
    "block2_pool",
    "block3_conv1",
    "block3_conv2",
    "block3_conv3",
    "block3_pool",
    "block4_conv1",
    "block4_conv2",
    "block4_conv3",
    "block4_pool",
    "block5_conv1",
    "block5_conv2",
    "block5_conv3",
    "block5_pool",
];

/// Convolutional part of VGG-16 type D, used as a frozen or partially frozen feature extractor.
///
/// “Very Deep Convolutional Networks for Large-Scale Image Recognition”
/// Authors: Karen Simonyan, Andrew Zisserman
/// Link (official): https://arxiv.org/abs/1409.1556
///
/// Pg. 3
///
/// Table 1: ConvNet configurations (shown in columns). The convolutional layer parameters are
/// denoted as “conv(receptive field size)-(number of channels)”. The ReLU activation function
/// is not shown for brevity.
///
///     D
/// -----------
///  conv3-64
///  conv3-64
///   maxpool
///  conv3-128
///  conv3-128
///   maxpool
///  conv3-256
///  conv3-256
///  conv3-256
///   maxpool
///  conv3-512
///  conv3-512
///  conv3-512
///   maxpool
///  conv3-512
///  conv3-512
///  conv3-512
///   maxpool
///
/// The FC-4096, FC-4096, FC-1000 top is not part of the backbone; the classifier puts a new head
/// sized for the dataset in its place.
///
/// Weights are imported with burn onnx import from:
/// https://github.com/onnx/models/tree/main/validated/vision/classification/vgg
/// Field names follow the imported record so the pre-trained file loads as is.
///
#[derive(Module, Debug)]
pub struct Vgg16Backbone<B: Backend> {
    conv2d1: Conv2d<B>,
    conv2d2: Conv2d<B>,
    maxpool2d1: MaxPool2d,

    conv2d3: Conv2d<B>,
    conv2d4: Conv2d<B>,
    maxpool2d2: MaxPool2d,

    conv2d5: Conv2d<B>,
    conv2d6: Conv2d<B>,
    conv2d7: Conv2d<B>,
    maxpool2d3: MaxPool2d,

    conv2d8: Conv2d<B>,
    conv2d9: Conv2d<B>,
    conv2d10: Conv2d<B>,
    maxpool2d4: MaxPool2d,

    conv2d11: Conv2d<B>,
    conv2d12: Conv2d<B>,
    conv2d13: Conv2d<B>,
    maxpool2d5: MaxPool2d,
}

fn conv3x3<B: Backend>(channels: [usize; 2], device: &B::Device) -> Conv2d<B> {
    Conv2dConfig::new(channels, [3, 3])
        .with_padding(PaddingConfig2d::Explicit(1, 1))
        .init(device)
}

fn pool2x2() -> MaxPool2d {
    MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init()
}

impl<B: Backend> Vgg16Backbone<B> {
    /// Randomly initialised backbone.
    pub fn new(device: &B::Device) -> Self {
        Self {
            // 64 out 3x3 (x2)
            conv2d1: conv3x3([3, 64], device),
            conv2d2: conv3x3([64, 64], device),
            maxpool2d1: pool2x2(),

            // 128 out 3x3 (x2)
            conv2d3: conv3x3([64, 128], device),
            conv2d4: conv3x3([128, 128], device),
            maxpool2d2: pool2x2(),

            // 256 out 3x3 (x3)
            conv2d5: conv3x3([128, 256], device),
            conv2d6: conv3x3([256, 256], device),
            conv2d7: conv3x3([256, 256], device),
            maxpool2d3: pool2x2(),

            // 512 out 3x3 (x3)
            conv2d8: conv3x3([256, 512], device),
            conv2d9: conv3x3([512, 512], device),
            conv2d10: conv3x3([512, 512], device),
            maxpool2d4: pool2x2(),

            // 512 out 3x3 (x3)
            conv2d11: conv3x3([512, 512], device),
            conv2d12: conv3x3([512, 512], device),
            conv2d13: conv3x3([512, 512], device),
            maxpool2d5: pool2x2(),
        }
    }

    /// Backbone initialised from the ImageNet weights stored as a burn named MessagePack record.
    pub fn from_file(file: &Path, device: &B::Device) -> Result<Self, RecorderError> {
        let record = NamedMpkFileRecorder::<FullPrecisionSettings>::new()
            .load(file.to_path_buf(), device)?;
        Ok(Self::new(device).load_record(record))
    }

    /// Stops gradient tracking for the first `count` entries of [`BACKBONE_LAYERS`].
    ///
    /// Pools hold no parameters but still take a slot in the layer order.
    pub fn freeze_first(mut self, count: usize) -> Self {
        self.conv2d1 = freeze_if::<B, _>(self.conv2d1, 0 < count);
        self.conv2d2 = freeze_if::<B, _>(self.conv2d2, 1 < count);

        self.conv2d3 = freeze_if::<B, _>(self.conv2d3, 3 < count);
        self.conv2d4 = freeze_if::<B, _>(self.conv2d4, 4 < count);

        self.conv2d5 = freeze_if::<B, _>(self.conv2d5, 6 < count);
        self.conv2d6 = freeze_if::<B, _>(self.conv2d6, 7 < count);
        self.conv2d7 = freeze_if::<B, _>(self.conv2d7, 8 < count);

        self.conv2d8 = freeze_if::<B, _>(self.conv2d8, 10 < count);
        self.conv2d9 = freeze_if::<B, _>(self.conv2d9, 11 < count);
        self.conv2d10 = freeze_if::<B, _>(self.conv2d10, 12 < count);

        self.conv2d11 = freeze_if::<B, _>(self.conv2d11, 14 < count);
        self.conv2d12 = freeze_if::<B, _>(self.conv2d12, 15 < count);
        self.conv2d13 = freeze_if::<B, _>(self.conv2d13, 16 < count);

        self
    }

    /// `(layer name, requires grad)` for every convolution, in forward order.
    pub fn trainable_layers(&self) -> Vec<(&'static str, bool)> {
        let convs = [
            &self.conv2d1,
            &self.conv2d2,
            &self.conv2d3,
            &self.conv2d4,
            &self.conv2d5,
            &self.conv2d6,
            &self.conv2d7,
            &self.conv2d8,
            &self.conv2d9,
            &self.conv2d10,
            &self.conv2d11,
            &self.conv2d12,
            &self.conv2d13,
        ];

        BACKBONE_LAYERS
            .iter()
            .filter(|name| !name.ends_with("_pool"))
            .zip(convs)
            .map(|(name, conv)| (*name, conv.weight.is_require_grad()))
            .collect()
    }

    /// `[N, 3, H, W]` images to `[N, 512, H / 32, W / 32]` features.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        // Convolutional block 1
        let x = relu(self.conv2d1.forward(input));
        let x = relu(self.conv2d2.forward(x));
        let x = self.maxpool2d1.forward(x);

        // Convolutional block 2
        let x = relu(self.conv2d3.forward(x));
        let x = relu(self.conv2d4.forward(x));
        let x = self.maxpool2d2.forward(x);

        // Convolutional block 3
        let x = relu(self.conv2d5.forward(x));
        let x = relu(self.conv2d6.forward(x));
        let x = relu(self.conv2d7.forward(x));
        let x = self.maxpool2d3.forward(x);

        // Convolutional block 4
        let x = relu(self.conv2d8.forward(x));
        let x = relu(self.conv2d9.forward(x));
        let x = relu(self.conv2d10.forward(x));
        let x = self.maxpool2d4.forward(x);

        // Convolutional block 5
        let x = relu(self.conv2d11.forward(x));
        let x = relu(self.conv2d12.forward(x));
        let x = relu(self.conv2d13.forward(x));
        self.maxpool2d5.forward(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray, ndarray::NdArrayDevice};

    type B = NdArray<f32>;
    type AB = Autodiff<NdArray<f32>>;

    #[test]
    fn backbone_downsamples_by_32() {
        let device = NdArrayDevice::default();
        let backbone: Vgg16Backbone<B> = Vgg16Backbone::new(&device);

        let out = backbone.forward(Tensor::<B, 4>::ones([1, 3, 64, 32], &device));

        assert_eq!(out.dims(), [1, BACKBONE_CHANNELS, 2, 1]);
    }

    #[test]
    fn freeze_first_counts_pools_as_layers() {
        let device = NdArrayDevice::default();
        let backbone: Vgg16Backbone<AB> = Vgg16Backbone::new(&device).freeze_first(5);

        let flags = backbone.trainable_layers();
        assert_eq!(flags.len(), 13);
        // slots 0..5 hold block1 (conv, conv, pool) and block2 conv1, conv2
        assert_eq!(flags[0], ("block1_conv1", false));
        assert_eq!(flags[3], ("block2_conv2", false));
        assert_eq!(flags[4], ("block3_conv1", true));
        assert!(flags[4..].iter().all(|(_, trainable)| *trainable));
    }

    #[test]
    fn missing_weights_file_is_an_error() {
        let device = NdArrayDevice::default();
        let result = Vgg16Backbone::<B>::from_file(Path::new("/no/such/vgg16-12"), &device);
        assert!(result.is_err());
    }
}
