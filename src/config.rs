use std::path::{Path, PathBuf};

use burn::config::Config;
use clap::{ArgAction, Parser, ValueEnum};

use crate::error::TrainError;

pub const BACKBONE_WEIGHTS_FILE: &str = "./assets/pretrained_models/vgg16-12";
pub const DEFAULT_EPOCHS: usize = 100;
pub const DEFAULT_BATCHES: usize = 20;
pub const DEFAULT_DROPOUT: f64 = 0.1;
/// Width of the two fully connected layers of the new classification head.
pub const FC_SIZE: usize = 4096;
/// VGG16 was trained on 224x224 crops.
pub const IMAGE_SIZE: usize = 224;
/// Fine-tuning keeps the first four VGG16 blocks (convs and pools) frozen and retrains block
/// five plus the head.
pub const NB_LAYERS_TO_FREEZE: usize = 14;
pub const LOG_FILE: &str = "training_log.txt";

/// Hyper-parameters of one training run.
///
/// “Very Deep Convolutional Networks for Large-Scale Image Recognition”
/// Authors: Karen Simonyan, Andrew Zisserman
/// Link (official): https://arxiv.org/abs/1409.1556
///
/// The backbone is the 16 weight layer configuration D, pre-trained on ILSVRC. Only the
/// convolutional part is reused; the fully connected top is replaced by a new head sized for
/// the classes found in the training directory.
#[derive(Config, Debug)]
pub struct TrainingConfig {
    #[config(default = "DEFAULT_EPOCHS")]
    pub num_epochs: usize,
    #[config(default = "DEFAULT_BATCHES")]
    pub batch_size: usize,
    #[config(default = 4)]
    pub num_workers: usize,
    #[config(default = 1)]
    pub seed: u64,
    #[config(default = 1e-7)]
    pub learning_rate: f64,
    #[config(default = 0.0)]
    pub decay: f64,
    #[config(default = 0.4)]
    pub dropout: f64,
    #[config(default = "IMAGE_SIZE")]
    pub image_size: usize,
    #[config(default = "FC_SIZE")]
    pub fc_size: usize,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Cpu,
    Cuda,
}

/// Transfer learning and fine-tuning of a pretrained VGG16 on labelled image folders.
///
/// Every sub-folder of the training and validation directories is one class.
#[derive(Parser, Debug, Clone)]
#[command(name = "vgg-transfer", version)]
pub struct TransferCmd {
    /// folder containing the training files, one sub-folder per class
    #[arg(long = "training_directory")]
    pub train_dir: PathBuf,

    /// folder containing the validation files, one sub-folder per class
    #[arg(long = "validation_directory")]
    pub val_dir: PathBuf,

    /// epochs for training
    #[arg(long = "epochs", default_value_t = DEFAULT_EPOCHS)]
    pub epochs: usize,

    /// batch size for training
    #[arg(long = "batches", default_value_t = DEFAULT_BATCHES)]
    pub batches: usize,

    /// pre-trained model weights to continue training from
    #[arg(long = "weights_file", value_parser = existing_file)]
    pub weights_file: Option<PathBuf>,

    /// pre-trained model configuration (architecture JSON)
    #[arg(long = "config_file", value_parser = existing_file)]
    pub config_file: Option<PathBuf>,

    /// output folder for weights, configuration, labels and plots
    #[arg(long = "output_directory")]
    pub output_dir: PathBuf,

    /// whether the model should be trained
    #[arg(long = "train_model", action = ArgAction::Set, required = true, value_parser = parse_bool_flag)]
    pub train_model: bool,

    /// whether the pre-trained weights/config should be loaded
    #[arg(long = "load_weights", action = ArgAction::Set, value_parser = parse_bool_flag, default_value = "False")]
    pub load_weights: bool,

    /// fine tune the upper backbone layers instead of training the head only
    #[arg(long = "fine_tune", action = ArgAction::Set, value_parser = parse_bool_flag, default_value = "True")]
    pub fine_tune: bool,

    /// apply image augmentation to the validation set as well
    #[arg(long = "test_augmentation", action = ArgAction::Set, value_parser = parse_bool_flag, default_value = "False")]
    pub test_augmentation: bool,

    /// render accuracy and loss plots after training
    #[arg(long = "plot", action = ArgAction::Set, value_parser = parse_bool_flag, default_value = "True")]
    pub plot: bool,

    /// print the model summary
    #[arg(long = "summary", action = ArgAction::Set, value_parser = parse_bool_flag, default_value = "False")]
    pub summary: bool,

    /// dropout rate used throughout the classification head
    #[arg(long = "dropout", default_value_t = 0.4)]
    pub dropout: f64,

    /// learning rate
    #[arg(long = "learning_rate", default_value_t = 1e-7)]
    pub learning_rate: f64,

    /// time based learning rate decay
    #[arg(long = "decay", default_value_t = 0.0)]
    pub decay: f64,

    /// optimizer to use. Options are: rms, ada and sgd
    #[arg(long = "optimizer", default_value = "rms")]
    pub optimizer: String,

    /// burn named record holding the ImageNet VGG16 weights
    #[arg(long = "backbone_weights", default_value = BACKBONE_WEIGHTS_FILE)]
    pub backbone_weights: PathBuf,

    /// libtorch device to train on
    #[arg(long = "device", value_enum, default_value_t = DeviceKind::Cuda)]
    pub device: DeviceKind,
}

impl TransferCmd {
    /// The run hyper-parameters carried by the flags.
    pub fn training_config(&self) -> TrainingConfig {
        TrainingConfig::new()
            .with_num_epochs(self.epochs)
            .with_batch_size(self.batches.max(1))
            .with_learning_rate(self.learning_rate)
            .with_decay(self.decay)
            .with_dropout(self.dropout)
    }

    /// Directories that have to exist before anything else happens.
    pub fn missing_directories(&self) -> Vec<PathBuf> {
        [&self.train_dir, &self.val_dir, &self.output_dir]
            .into_iter()
            .filter(|dir| !dir.is_dir())
            .cloned()
            .collect()
    }

    /// Refuses to start a run on missing directories or with `--train_model` off.
    pub fn ensure_runnable(&self) -> crate::error::Result<()> {
        let missing = self.missing_directories();
        if !missing.is_empty() {
            return Err(TrainError::MissingDirectory(missing));
        }

        if !self.train_model {
            return Err(TrainError::TrainingDisabled);
        }

        Ok(())
    }
}

/// Coerces the yes/no spellings accepted on the command line.
pub fn parse_bool_flag(val: &str) -> Result<bool, String> {
    match val.to_lowercase().as_str() {
        "yes" | "true" | "t" | "y" | "1" | "yeah" => Ok(true),
        "no" | "false" | "f" | "n" | "0" | "none" => Ok(false),
        _ => Err("Boolean value expected ...".into()),
    }
}

pub fn existing_file(val: &str) -> Result<PathBuf, String> {
    let path = Path::new(val);
    if path.is_file() {
        Ok(path.to_path_buf())
    } else {
        Err(format!("The file {} does not exist ...", val))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args<'a>(train: &'a str, val: &'a str, out: &'a str) -> Vec<&'a str> {
        vec![
            "vgg-transfer",
            "--training_directory",
            train,
            "--validation_directory",
            val,
            "--output_directory",
            out,
            "--train_model",
            "yes",
        ]
    }

    #[test]
    fn bool_flag_spellings() {
        for v in ["yes", "True", "T", "y", "1", "Yeah"] {
            assert_eq!(parse_bool_flag(v), Ok(true), "{v}");
        }
        for v in ["no", "FALSE", "f", "N", "0", "None"] {
            assert_eq!(parse_bool_flag(v), Ok(false), "{v}");
        }
        assert!(parse_bool_flag("maybe").is_err());
        assert!(parse_bool_flag("").is_err());
    }

    #[test]
    fn defaults_match_documented_values() {
        let cmd = TransferCmd::try_parse_from(base_args("t", "v", "o")).unwrap();
        assert_eq!(cmd.epochs, DEFAULT_EPOCHS);
        assert_eq!(cmd.batches, DEFAULT_BATCHES);
        assert!(cmd.train_model);
        assert!(!cmd.load_weights);
        assert!(cmd.fine_tune);
        assert!(!cmd.test_augmentation);
        assert!(cmd.plot);
        assert!(!cmd.summary);
        assert_eq!(cmd.dropout, 0.4);
        assert_eq!(cmd.learning_rate, 1e-7);
        assert_eq!(cmd.decay, 0.0);
        assert_eq!(cmd.optimizer, "rms");
        assert_eq!(cmd.device, DeviceKind::Cuda);
        assert!(cmd.weights_file.is_none());
    }

    #[test]
    fn underscore_flags_and_bool_values_parse() {
        let mut args = base_args("t", "v", "o");
        args.extend([
            "--epochs",
            "3",
            "--batches",
            "8",
            "--fine_tune",
            "False",
            "--plot",
            "n",
            "--learning_rate",
            "0.001",
            "--optimizer",
            "sgd",
            "--device",
            "cpu",
        ]);
        let cmd = TransferCmd::try_parse_from(args).unwrap();
        assert_eq!(cmd.epochs, 3);
        assert_eq!(cmd.batches, 8);
        assert!(!cmd.fine_tune);
        assert!(!cmd.plot);
        assert_eq!(cmd.learning_rate, 0.001);
        assert_eq!(cmd.optimizer, "sgd");
        assert_eq!(cmd.device, DeviceKind::Cpu);

        let config = cmd.training_config();
        assert_eq!(config.num_epochs, 3);
        assert_eq!(config.batch_size, 8);
        assert_eq!(config.learning_rate, 0.001);
    }

    #[test]
    fn train_model_is_required() {
        let args = vec![
            "vgg-transfer",
            "--training_directory",
            "t",
            "--validation_directory",
            "v",
            "--output_directory",
            "o",
        ];
        assert!(TransferCmd::try_parse_from(args).is_err());
    }

    #[test]
    fn weights_file_must_exist() {
        let mut args = base_args("t", "v", "o");
        args.extend(["--weights_file", "/definitely/not/here.model"]);
        let err = TransferCmd::try_parse_from(args).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn reports_missing_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let train = tmp.path().join("train");
        std::fs::create_dir(&train).unwrap();
        let train = train.to_str().unwrap().to_string();
        let out = tmp.path().to_str().unwrap().to_string();

        let cmd = TransferCmd::try_parse_from(base_args(&train, "/no/such/val", &out)).unwrap();
        assert_eq!(cmd.missing_directories(), vec![PathBuf::from("/no/such/val")]);
    }

    #[test]
    fn disabled_training_refuses_to_run() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().to_str().unwrap();
        let mut args = base_args(dir, dir, dir);
        *args.last_mut().unwrap() = "no";

        let cmd = TransferCmd::try_parse_from(args).unwrap();
        assert!(matches!(
            cmd.ensure_runnable(),
            Err(TrainError::TrainingDisabled)
        ));
    }

    #[test]
    fn missing_directories_are_checked_first() {
        let mut args = base_args("/no/such/train", "/no/such/val", "/no/such/out");
        *args.last_mut().unwrap() = "no";

        let cmd = TransferCmd::try_parse_from(args).unwrap();
        match cmd.ensure_runnable() {
            Err(TrainError::MissingDirectory(missing)) => assert_eq!(missing.len(), 3),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn existing_directories_with_training_on_can_run() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().to_str().unwrap();

        let cmd = TransferCmd::try_parse_from(base_args(dir, dir, dir)).unwrap();
        assert!(cmd.ensure_runnable().is_ok());
    }
}
