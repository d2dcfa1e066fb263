use std::path::PathBuf;

use thiserror::Error;

/// Everything that stops a training run. `main` turns each of these into exit status 1.
#[derive(Debug, Error)]
pub enum TrainError {
    #[error("Specified directories do not exist ... ({})", display_paths(.0))]
    MissingDirectory(Vec<PathBuf>),

    #[error(
        "Mismatched training and validation data labels ...\n\
         Sub-folder names do not match between training and validation directories ..."
    )]
    LabelMismatch {
        training: Vec<String>,
        validation: Vec<String>,
    },

    #[error(
        "Mismatched number of training and validation data classes ({training} vs {validation}) ...\n\
         Unequal number of sub-folders found between train and validation directories ...\n\
         Each sub-folder in train and validation directories are treated as a separate class ...\n\
         Correct this mismatch and re-run ...\n\
         Now exiting ..."
    )]
    ClassCountMismatch { training: usize, validation: usize },

    #[error(
        "Nothing to do here ...\n\
         Try setting the --train_model flag to True ...\n\
         For more help, run with -h flag ..."
    )]
    TrainingDisabled,

    #[error("No usable images found under {0}")]
    EmptyDataset(PathBuf),

    #[error("Couldn't load the VGG16 backbone weights from {path}: {source}")]
    BackboneWeights {
        path: PathBuf,
        source: burn::record::RecorderError,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("Couldn't serialize the model record: {0}")]
    Recorder(#[from] burn::record::RecorderError),

    #[error("Couldn't render the training plot {path}: {message}")]
    Plot { path: PathBuf, message: String },
}

impl TrainError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TrainError::Io {
            path: path.into(),
            source,
        }
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T, E = TrainError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_directory_lists_every_path() {
        let err = TrainError::MissingDirectory(vec!["a/train".into(), "b/val".into()]);
        let msg = err.to_string();
        assert!(msg.starts_with("Specified directories do not exist ..."));
        assert!(msg.contains("a/train, b/val"));
    }

    #[test]
    fn class_count_mismatch_reports_both_counts() {
        let err = TrainError::ClassCountMismatch {
            training: 3,
            validation: 2,
        };
        assert!(err.to_string().contains("(3 vs 2)"));
    }
}
