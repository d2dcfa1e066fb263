pub mod classifier;
pub mod vgg;

pub use classifier::{Classifier, ClassifierConfig};

use burn::{module::Module, tensor::backend::Backend};

/// The two ways the pretrained backbone takes part in training.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrainingMode {
    /// Backbone frozen, only the new head learns.
    TransferLearning,
    /// The lower layers stay frozen, the upper backbone block and the head learn.
    FineTune,
}

impl TrainingMode {
    pub fn from_fine_tune(fine_tune: bool) -> Self {
        if fine_tune {
            TrainingMode::FineTune
        } else {
            TrainingMode::TransferLearning
        }
    }

    /// Tag appended to every artifact name of the run.
    pub fn suffix(&self) -> &'static str {
        match self {
            TrainingMode::TransferLearning => "_tl_",
            TrainingMode::FineTune => "_ft_",
        }
    }
}

pub(crate) fn freeze_if<B: Backend, M: Module<B>>(module: M, frozen: bool) -> M {
    if frozen { module.no_grad() } else { module }
}
