use std::path::{Path, PathBuf};

use burn::config::Config;
use burn::module::Module;
use burn::record::{FullPrecisionSettings, NamedMpkBytesRecorder, Recorder};
use burn::tensor::backend::Backend;
use chrono::Local;
use log::warn;

use crate::config::LOG_FILE;
use crate::error::{Result, TrainError};
use crate::models::{Classifier, ClassifierConfig, TrainingMode};

/// Format of the generation timestamp shared by every artifact of a run.
pub const TIMESTAMP_FORMAT: &str = "%Y_%m_%d-%H_%M_%S";

/// Captures the run timestamp, once per process.
pub fn generate_timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Names the files a run writes into the output directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunArtifacts {
    output_dir: PathBuf,
    timestamp: String,
}

impl RunArtifacts {
    pub fn new(output_dir: impl Into<PathBuf>, timestamp: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            timestamp: timestamp.into(),
        }
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn weights_path(&self, mode: TrainingMode) -> PathBuf {
        self.output_dir.join(format!(
            "trained_{}_weights{}.model",
            self.timestamp,
            mode.suffix()
        ))
    }

    pub fn config_path(&self, mode: TrainingMode) -> PathBuf {
        self.output_dir.join(format!(
            "trained_{}_config{}.json",
            self.timestamp,
            mode.suffix()
        ))
    }

    pub fn labels_path(&self) -> PathBuf {
        self.output_dir.join("trained_labels.json")
    }

    pub fn accuracy_plot_path(&self, mode: TrainingMode) -> PathBuf {
        self.output_dir.join(format!(
            "training_plot_acc_{}{}.png",
            self.timestamp,
            mode.suffix()
        ))
    }

    pub fn loss_plot_path(&self, mode: TrainingMode) -> PathBuf {
        self.output_dir.join(format!(
            "training_plot_loss_{}{}.png",
            self.timestamp,
            mode.suffix()
        ))
    }

    pub fn log_path(&self) -> PathBuf {
        self.output_dir.join(LOG_FILE)
    }
}

fn recorder() -> NamedMpkBytesRecorder<FullPrecisionSettings> {
    NamedMpkBytesRecorder::default()
}

/// Writes the weights and the architecture JSON of a trained model.
///
/// The weights are a named MessagePack record written to the exact `.model` path.
pub fn save_model<B: Backend>(
    model: &Classifier<B>,
    config: &ClassifierConfig,
    artifacts: &RunArtifacts,
    mode: TrainingMode,
) -> Result<()> {
    let weights_path = artifacts.weights_path(mode);
    let config_path = artifacts.config_path(mode);

    let bytes = recorder().record(model.clone().into_record(), ())?;
    std::fs::write(&weights_path, bytes).map_err(|err| TrainError::io(&weights_path, err))?;
    config
        .save(&config_path)
        .map_err(|err| TrainError::io(&config_path, err))?;

    println!(
        "Saved the trained model weights to: {}",
        weights_path.display()
    );
    println!(
        "Saved the trained model configuration as a json file to: {}",
        config_path.display()
    );

    Ok(())
}

fn read_weights<B: Backend>(
    path: &Path,
    config: &ClassifierConfig,
    device: &B::Device,
) -> std::result::Result<Classifier<B>, String> {
    let bytes = std::fs::read(path).map_err(|err| err.to_string())?;
    let record = recorder()
        .load(bytes, device)
        .map_err(|err| err.to_string())?;
    config
        .init::<B>(device)
        .load_matching(record, config)
        .ok_or_else(|| {
            format!(
                "layer shapes don't match a {} class head",
                config.num_classes
            )
        })
}

/// Replaces a freshly built model with a previously saved one.
///
/// The architecture comes from `config_file` when it parses and describes the same number of
/// classes, otherwise from `fresh_config`. Any failure is reported and the fresh model is kept.
pub fn load_model<B: Backend>(
    fresh: Classifier<B>,
    fresh_config: ClassifierConfig,
    config_file: Option<&Path>,
    weights_file: Option<&Path>,
    device: &B::Device,
) -> (Classifier<B>, ClassifierConfig) {
    let config = match config_file.map(ClassifierConfig::load) {
        Some(Ok(config)) if config.num_classes == fresh_config.num_classes => config,
        Some(Ok(config)) => {
            warn!(
                "Saved configuration describes {} classes, the dataset has {} ...",
                config.num_classes, fresh_config.num_classes
            );
            fresh_config.clone()
        }
        Some(Err(err)) => {
            warn!("Couldn't read the model configuration: {err}");
            fresh_config.clone()
        }
        None => fresh_config.clone(),
    };

    let loaded = match weights_file {
        Some(path) => read_weights::<B>(path, &config, device).map(|model| (model, path)),
        None => Err("no weights file given".to_string()),
    };

    match loaded {
        Ok((model, path)) => {
            println!("Loaded model weights from: {}", path.display());
            (model, config)
        }
        Err(err) => {
            warn!("{err}");
            println!("Error loading model weights ...");
            println!("Loaded default model weights ...");
            (fresh, fresh_config)
        }
    }
}
