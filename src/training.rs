use std::path::PathBuf;
use std::sync::Arc;

use burn::data::dataloader::{DataLoader, DataLoaderBuilder, DataLoaderIterator};
use burn::nn::loss::CrossEntropyLossConfig;
use burn::{
    module::AutodiffModule,
    optim::{GradientsParams, Optimizer},
    prelude::*,
    tensor::{backend::AutodiffBackend, cast::ToElement},
};
use log::info;

use crate::artifacts::{RunArtifacts, load_model, save_model};
use crate::config::{NB_LAYERS_TO_FREEZE, TrainingConfig, TransferCmd};
use crate::data::{BatchType, ClassificationBatch, ImageBatcher};
use crate::dataset::{
    ClassFolderDataset, check_class_counts, check_label_sets, count_classes, count_samples,
};
use crate::error::Result;
use crate::labels::ClassLabels;
use crate::models::{Classifier, ClassifierConfig, TrainingMode};
use crate::optim::{self, OptimizerKind, OptimizerSettings};
use crate::plot::plot_training;
use crate::stats::{EpochMetrics, History, Stats};

/// Everything a run needs besides the device and the output names.
#[derive(Clone, Debug)]
pub struct TrainingOptions {
    pub train_dir: PathBuf,
    pub val_dir: PathBuf,
    pub config: TrainingConfig,
    pub optimizer: String,
    pub fine_tune: bool,
    pub test_augmentation: bool,
    pub load_weights: bool,
    pub weights_file: Option<PathBuf>,
    pub config_file: Option<PathBuf>,
    /// ImageNet VGG16 record. `None` starts the backbone from random values.
    pub backbone_weights: Option<PathBuf>,
    pub summary: bool,
    pub plot: bool,
}

impl From<&TransferCmd> for TrainingOptions {
    fn from(cmd: &TransferCmd) -> Self {
        Self {
            train_dir: cmd.train_dir.clone(),
            val_dir: cmd.val_dir.clone(),
            config: cmd.training_config(),
            optimizer: cmd.optimizer.clone(),
            fine_tune: cmd.fine_tune,
            test_augmentation: cmd.test_augmentation,
            load_weights: cmd.load_weights,
            weights_file: cmd.weights_file.clone(),
            config_file: cmd.config_file.clone(),
            backbone_weights: Some(cmd.backbone_weights.clone()),
            summary: cmd.summary,
            plot: cmd.plot,
        }
    }
}

type TrainLoader<B> = Arc<dyn DataLoader<B, ClassificationBatch<B>>>;
type ValidLoader<B> = Arc<
    dyn DataLoader<
            <B as AutodiffBackend>::InnerBackend,
            ClassificationBatch<<B as AutodiffBackend>::InnerBackend>,
        >,
>;

/// Optimizer steps per epoch. Each phase draws this many batches, wrapping around the data
/// loader when it runs dry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EpochPlan {
    pub epochs: usize,
    pub train_steps: usize,
    pub valid_steps: usize,
}

impl EpochPlan {
    pub fn new(epochs: usize, batch_size: usize, train_samples: usize, valid_samples: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            epochs,
            train_steps: (train_samples / batch_size).max(1),
            valid_steps: (valid_samples / batch_size).max(1),
        }
    }
}

/// Runs a full transfer learning or fine-tuning session and writes its artifacts.
pub fn train<B: AutodiffBackend>(
    options: &TrainingOptions,
    artifacts: &RunArtifacts,
    device: &B::Device,
) -> Result<History> {
    let config = &options.config;
    let settings = OptimizerSettings::from_flags(
        &options.optimizer,
        config.learning_rate,
        config.decay,
    );
    println!("{}", settings.kind.describe());

    let nb_train_samples = count_samples(&options.train_dir)?;
    let nb_classes = count_classes(&options.train_dir)?;
    println!("Total number of training samples = {nb_train_samples}");
    println!("Number of training classes = {nb_classes}");

    let nb_val_samples = count_samples(&options.val_dir)?;
    let nb_val_classes = count_classes(&options.val_dir)?;
    println!("Total number of validation samples = {nb_val_samples}");
    println!("Number of validation classes = {nb_val_classes}");

    check_class_counts(nb_classes, nb_val_classes)?;
    println!("Initiating training session ...");

    let labels = ClassLabels::new(check_label_sets(&options.train_dir, &options.val_dir)?);
    labels.save_json(&artifacts.labels_path())?;

    B::seed(config.seed);

    println!("Generating training data: ... ");
    let dataset_train = ClassFolderDataset::new(&options.train_dir, &labels)?;
    for (id, count) in dataset_train.class_histogram(labels.count()).iter().enumerate() {
        info!("{}: {} training images", labels.name_of(id).unwrap_or("?"), count);
    }

    println!("Generating validation data: ... ");
    let dataset_valid = ClassFolderDataset::new(&options.val_dir, &labels)?;

    let batcher_train = ImageBatcher::new(BatchType::Train, config.image_size, false);
    let batcher_valid =
        ImageBatcher::new(BatchType::Test, config.image_size, options.test_augmentation);

    let dataloader_train: TrainLoader<B> = DataLoaderBuilder::new(batcher_train)
        .set_device(device.clone())
        .batch_size(config.batch_size)
        .shuffle(config.seed)
        .num_workers(config.num_workers)
        .build(dataset_train);

    let dataloader_valid: ValidLoader<B> = DataLoaderBuilder::new(batcher_valid)
        .set_device(device.clone())
        .batch_size(config.batch_size)
        .shuffle(config.seed)
        .num_workers(config.num_workers)
        .build(dataset_valid);

    let model_config = ClassifierConfig::new(labels.count())
        .with_dropout(config.dropout)
        .with_fc_size(config.fc_size)
        .with_image_size(config.image_size);
    let model: Classifier<B> =
        model_config.init_pretrained(options.backbone_weights.as_deref(), device)?;
    println!("Base model for transfer learning: VGG16 ...");

    if options.summary {
        println!("{}", model.summary());
    } else {
        println!("Successfully loaded VGG16 for training ...");
    }

    let (model, model_config) = if options.load_weights {
        load_model(
            model,
            model_config,
            options.config_file.as_deref(),
            options.weights_file.as_deref(),
            device,
        )
    } else {
        println!("Tabula rasa ...");
        (model, model_config)
    };

    let mode = TrainingMode::from_fine_tune(options.fine_tune);
    match mode {
        TrainingMode::FineTune => println!("Fine tuning VGG16 ..."),
        TrainingMode::TransferLearning => println!("Transfer learning using VGG16 ..."),
    }
    let model = model.setup(mode, NB_LAYERS_TO_FREEZE);

    let frozen = model.trainable_layers().iter().filter(|(_, t)| !t).count();
    info!(
        "{} of {} weight layers frozen",
        frozen,
        model.trainable_layers().len()
    );

    println!(
        "Initializing training with  class labels: {:?}",
        labels.names()
    );

    let plan = EpochPlan::new(
        config.num_epochs,
        config.batch_size,
        nb_train_samples,
        nb_val_samples,
    );
    let mut stats = Stats::new(&artifacts.log_path())?;
    let loaders = (dataloader_train, dataloader_valid);

    let (model, history) = match settings.kind {
        OptimizerKind::Sgd => {
            let optim = optim::sgd().init::<B, Classifier<B>>();
            fit(model, optim, &settings, &loaders, &plan, &mut stats, device)?
        }
        OptimizerKind::RmsProp => {
            let optim = optim::rms_prop().init::<B, Classifier<B>>();
            fit(model, optim, &settings, &loaders, &plan, &mut stats, device)?
        }
        OptimizerKind::AdaGrad | OptimizerKind::Default => {
            let optim = optim::ada_grad().init::<B, Classifier<B>>();
            fit(model, optim, &settings, &loaders, &plan, &mut stats, device)?
        }
    };

    save_model(&model, &model_config, artifacts, mode)?;

    if options.plot {
        plot_training(&history, artifacts, mode)?;
    } else {
        println!("No training summary plots generated ...");
        println!("Set: --plot True for creating training summary plots");
    }

    Ok(history)
}

/// Draws the next batch, starting a new pass over the loader when the current one is done.
fn next_batch<'a, B: Backend>(
    iter: &mut Box<dyn DataLoaderIterator<ClassificationBatch<B>> + 'a>,
    loader: &'a Arc<dyn DataLoader<B, ClassificationBatch<B>>>,
) -> Option<ClassificationBatch<B>> {
    if let Some(batch) = iter.next() {
        return Some(batch);
    }
    *iter = loader.iter();
    iter.next()
}

fn correct_predictions<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    logits
        .argmax(1)
        .squeeze::<1>(1)
        .equal(targets)
        .int()
        .sum()
        .into_scalar()
        .to_usize()
}

fn fit<B: AutodiffBackend, O: Optimizer<Classifier<B>, B>>(
    mut model: Classifier<B>,
    mut optim: O,
    settings: &OptimizerSettings,
    (dataloader_train, dataloader_valid): &(TrainLoader<B>, ValidLoader<B>),
    plan: &EpochPlan,
    stats: &mut Stats,
    device: &B::Device,
) -> Result<(Classifier<B>, History)> {
    let loss_train = CrossEntropyLossConfig::new().init(device);
    let loss_valid = CrossEntropyLossConfig::new().init(device);

    let mut history = History::default();
    let mut step = 0;

    // Both iterators carry on across epochs, an epoch is a fixed number of steps.
    let mut train_iter = dataloader_train.iter();
    let mut valid_iter = dataloader_valid.iter();

    for epoch in 1..plan.epochs + 1 {
        for _ in 0..plan.train_steps {
            let Some(batch) = next_batch(&mut train_iter, dataloader_train) else {
                break;
            };
            let items = batch.targets.dims()[0];

            let logits = model.forward(batch.images);
            let correct = correct_predictions(logits.clone().detach(), batch.targets.clone());
            let loss = loss_train.forward(logits, batch.targets);

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(settings.learning_rate_at(step), model, grads);
            step += 1;

            stats.update(loss.into_scalar().to_f32(), correct, items, "Train", epoch);
        }
        let train = stats.flush()?;

        let m_valid = model.valid();
        for _ in 0..plan.valid_steps {
            let Some(batch) = next_batch(&mut valid_iter, dataloader_valid) else {
                break;
            };
            let items = batch.targets.dims()[0];

            let logits = m_valid.forward(batch.images);
            let correct = correct_predictions(logits.clone(), batch.targets.clone());
            let loss = loss_valid.forward(logits, batch.targets);

            stats.update(loss.into_scalar().to_f32(), correct, items, "Valid", epoch);
        }
        let valid = stats.flush()?;

        info!(
            "epoch {epoch}/{}: loss {:.4} acc {:.4} val_loss {:.4} val_acc {:.4}",
            plan.epochs, train.loss, train.accuracy, valid.loss, valid.accuracy
        );
        history.push(EpochMetrics { train, valid });
    }

    Ok((model, history))
}
