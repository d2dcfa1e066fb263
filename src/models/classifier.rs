use std::fmt;
use std::path::Path;

use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig};
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig};
use burn::{
    config::Config,
    module::Module,
    tensor::{
        Tensor,
        activation::{relu, softmax},
        backend::Backend,
    },
};
use log::{info, warn};

use super::vgg::{BACKBONE_CHANNELS, BACKBONE_LAYERS, Vgg16Backbone};
use super::{TrainingMode, freeze_if};
use crate::config::{DEFAULT_DROPOUT, FC_SIZE, IMAGE_SIZE};
use crate::error::{Result, TrainError};

/// Head layers in forward order, following the backbone in the model's layer list.
pub const HEAD_LAYERS: [&str; 8] = [
    "dropout_1",
    "global_average_pooling2d",
    "dropout_2",
    "dense_1",
    "dropout_3",
    "dense_2",
    "dropout_4",
    "predictions",
];

/// Architecture of the classifier, saved next to the weights so a run can be resumed.
#[derive(Config, Debug)]
pub struct ClassifierConfig {
    pub num_classes: usize,
    #[config(default = "DEFAULT_DROPOUT")]
    pub dropout: f64,
    #[config(default = "FC_SIZE")]
    pub fc_size: usize,
    #[config(default = "IMAGE_SIZE")]
    pub image_size: usize,
    #[config(default = "String::from(\"vgg16\")")]
    pub backbone: String,
}

impl ClassifierConfig {
    /// Randomly initialised backbone and head.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Classifier<B> {
        Classifier {
            backbone: Vgg16Backbone::new(device),
            head: self.init_head(device),
        }
    }

    /// ImageNet backbone from `weights`, new head. Without a weights file the backbone starts
    /// from random values.
    pub fn init_pretrained<B: Backend>(
        &self,
        weights: Option<&Path>,
        device: &B::Device,
    ) -> Result<Classifier<B>> {
        let backbone = match weights {
            Some(path) => {
                let backbone = Vgg16Backbone::from_file(path, device).map_err(|source| {
                    TrainError::BackboneWeights {
                        path: path.to_path_buf(),
                        source,
                    }
                })?;
                info!("Loaded VGG16 backbone weights from {}", path.display());
                backbone
            }
            None => {
                warn!("No backbone weights given, the VGG16 backbone starts from random values");
                Vgg16Backbone::new(device)
            }
        };

        Ok(Classifier {
            backbone,
            head: self.init_head(device),
        })
    }

    fn init_head<B: Backend>(&self, device: &B::Device) -> ClassificationHead<B> {
        let dropout = || DropoutConfig::new(self.dropout).init();

        ClassificationHead {
            dropout_features: dropout(),
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            dropout_pooled: dropout(),
            fc1: LinearConfig::new(BACKBONE_CHANNELS, self.fc_size).init(device),
            dropout_fc1: dropout(),
            fc2: LinearConfig::new(self.fc_size, self.fc_size).init(device),
            dropout_fc2: dropout(),
            predictions: LinearConfig::new(self.fc_size, self.num_classes).init(device),
        }
    }
}

/// Dropout, global average pooling and three dense layers on top of the backbone features.
#[derive(Module, Debug)]
pub struct ClassificationHead<B: Backend> {
    dropout_features: Dropout,
    pool: AdaptiveAvgPool2d,
    dropout_pooled: Dropout,
    fc1: Linear<B>,
    dropout_fc1: Dropout,
    fc2: Linear<B>,
    dropout_fc2: Dropout,
    predictions: Linear<B>,
}

impl<B: Backend> ClassificationHead<B> {
    pub fn forward(&self, features: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.dropout_features.forward(features);
        let x = self.pool.forward(x);
        // [N, C, 1, 1] -> [N, C]
        let x = x.flatten::<2>(1, 3);
        let x = self.dropout_pooled.forward(x);

        let x = relu(self.fc1.forward(x));
        let x = self.dropout_fc1.forward(x);
        let x = relu(self.fc2.forward(x));
        let x = self.dropout_fc2.forward(x);

        self.predictions.forward(x)
    }

    /// Same slot numbering as [`HEAD_LAYERS`].
    fn freeze_first(mut self, count: usize) -> Self {
        self.fc1 = freeze_if::<B, _>(self.fc1, 3 < count);
        self.fc2 = freeze_if::<B, _>(self.fc2, 5 < count);
        self.predictions = freeze_if::<B, _>(self.predictions, 7 < count);
        self
    }

    fn trainable_layers(&self) -> Vec<(&'static str, bool)> {
        vec![
            (HEAD_LAYERS[3], self.fc1.weight.is_require_grad()),
            (HEAD_LAYERS[5], self.fc2.weight.is_require_grad()),
            (HEAD_LAYERS[7], self.predictions.weight.is_require_grad()),
        ]
    }
}

/// VGG16 backbone with a new classification head.
#[derive(Module, Debug)]
pub struct Classifier<B: Backend> {
    backbone: Vgg16Backbone<B>,
    head: ClassificationHead<B>,
}

impl<B: Backend> Classifier<B> {
    /// `[N, 3, H, W]` normalized images to `[N, num_classes]` logits.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        self.head.forward(self.backbone.forward(images))
    }

    /// Class probabilities.
    pub fn predict(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(images), 1)
    }

    /// Every layer of the model in forward order, backbone first.
    pub fn layer_names() -> Vec<&'static str> {
        BACKBONE_LAYERS.iter().chain(HEAD_LAYERS.iter()).copied().collect()
    }

    /// Freezes the whole backbone, leaving the head trainable.
    pub fn setup_to_transfer_learn(mut self) -> Self {
        self.backbone = self.backbone.no_grad();
        self
    }

    /// Freezes the first `count` layers of [`Classifier::layer_names`].
    pub fn setup_to_finetune(mut self, count: usize) -> Self {
        self.backbone = self.backbone.freeze_first(count);
        self.head = self
            .head
            .freeze_first(count.saturating_sub(BACKBONE_LAYERS.len()));
        self
    }

    pub fn setup(self, mode: TrainingMode, layers_to_freeze: usize) -> Self {
        match mode {
            TrainingMode::TransferLearning => self.setup_to_transfer_learn(),
            TrainingMode::FineTune => self.setup_to_finetune(layers_to_freeze),
        }
    }

    /// Loads saved weights, provided their head has the shapes `config` describes.
    pub fn load_matching(
        self,
        record: ClassifierRecord<B>,
        config: &ClassifierConfig,
    ) -> Option<Self> {
        let head = &record.head;
        let fits = head.fc1.weight.dims() == [BACKBONE_CHANNELS, config.fc_size]
            && head.fc2.weight.dims() == [config.fc_size, config.fc_size]
            && head.predictions.weight.dims() == [config.fc_size, config.num_classes];

        fits.then(|| self.load_record(record))
    }

    /// `(layer name, requires grad)` for every layer holding parameters.
    pub fn trainable_layers(&self) -> Vec<(&'static str, bool)> {
        let mut layers = self.backbone.trainable_layers();
        layers.extend(self.head.trainable_layers());
        layers
    }
}

/// Layer table printed by `--summary`.
pub struct Summary<'a, B: Backend> {
    model: &'a Classifier<B>,
}

impl<B: Backend> Classifier<B> {
    pub fn summary(&self) -> Summary<'_, B> {
        Summary { model: self }
    }
}

impl<B: Backend> fmt::Display for Summary<'_, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let trainable = self.model.trainable_layers();

        writeln!(f, "{:<28}{}", "Layer", "Trainable")?;
        writeln!(f, "{}", "=".repeat(40))?;
        for name in Classifier::<B>::layer_names() {
            let flag = trainable
                .iter()
                .find(|(layer, _)| *layer == name)
                .map(|(_, t)| if *t { "yes" } else { "no" })
                .unwrap_or("-");
            writeln!(f, "{name:<28}{flag}")?;
        }
        writeln!(f, "{}", "=".repeat(40))?;
        write!(f, "Total params: {}", self.model.num_params())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NB_LAYERS_TO_FREEZE;
    use burn::backend::{Autodiff, NdArray, ndarray::NdArrayDevice};
    use burn::tensor::{Tolerance, ops::FloatElem};

    type B = NdArray<f32>;
    type AB = Autodiff<NdArray<f32>>;
    type FT = FloatElem<B>;

    fn small_config(classes: usize) -> ClassifierConfig {
        ClassifierConfig::new(classes)
            .with_fc_size(16)
            .with_image_size(32)
    }

    #[test]
    fn head_output_matches_class_count() {
        let device = NdArrayDevice::default();
        let model: Classifier<B> = small_config(3).init(&device);

        let logits = model.forward(Tensor::zeros([2, 3, 32, 32], &device));

        assert_eq!(logits.dims(), [2, 3]);
    }

    #[test]
    fn predictions_are_probabilities() {
        let device = NdArrayDevice::default();
        let model: Classifier<B> = small_config(4).init(&device);

        let probs = model.predict(Tensor::ones([2, 3, 32, 32], &device));

        probs
            .sum_dim(1)
            .into_data()
            .assert_approx_eq::<FT>(
                &Tensor::<B, 2>::ones([2, 1], &device).into_data(),
                Tolerance::default(),
            );
    }

    #[test]
    fn layer_list_runs_backbone_then_head() {
        let names = Classifier::<B>::layer_names();
        assert_eq!(names.len(), 26);
        assert_eq!(names[0], "block1_conv1");
        assert_eq!(names[NB_LAYERS_TO_FREEZE - 1], "block4_pool");
        assert_eq!(names[NB_LAYERS_TO_FREEZE], "block5_conv1");
        assert_eq!(names[25], "predictions");
    }

    #[test]
    fn transfer_learning_freezes_whole_backbone() {
        let device = NdArrayDevice::default();
        let model: Classifier<AB> = small_config(2).init(&device).setup_to_transfer_learn();

        for (name, trainable) in model.trainable_layers() {
            assert_eq!(trainable, !name.starts_with("block"), "{name}");
        }
    }

    #[test]
    fn fine_tuning_freezes_first_layers_only() {
        let device = NdArrayDevice::default();
        let model: Classifier<AB> = small_config(2)
            .init(&device)
            .setup(TrainingMode::FineTune, NB_LAYERS_TO_FREEZE);

        let frozen: Vec<_> = model
            .trainable_layers()
            .into_iter()
            .filter(|(_, trainable)| !trainable)
            .map(|(name, _)| name)
            .collect();

        // blocks 1 to 4 hold ten convolutions
        assert_eq!(frozen.len(), 10);
        assert_eq!(frozen.last(), Some(&"block4_conv3"));
    }

    #[test]
    fn config_serialises_architecture() {
        let config = small_config(5).with_dropout(0.4);
        let json = serde_json::to_string(&config).unwrap();
        let restored: ClassifierConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.num_classes, 5);
        assert_eq!(restored.fc_size, 16);
        assert_eq!(restored.dropout, 0.4);
        assert_eq!(restored.backbone, "vgg16");
    }

    #[test]
    fn summary_lists_every_layer() {
        let device = NdArrayDevice::default();
        let model: Classifier<AB> = small_config(2).init(&device).setup_to_transfer_learn();

        let table = model.summary().to_string();

        assert!(table.contains("block1_conv1                no"));
        assert!(table.contains("predictions                 yes"));
        assert!(table.contains("block1_pool                 -"));
        assert!(table.contains("Total params:"));
    }
}
