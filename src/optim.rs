use burn::optim::{AdaGradConfig, RmsPropConfig, SgdConfig, momentum::MomentumConfig};

/// Learning rate of the fallback optimizer.
pub const DEFAULT_LEARNING_RATE: f64 = 1e-3;
const EPSILON: f32 = 1e-8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptimizerKind {
    Sgd,
    RmsProp,
    AdaGrad,
    /// Unrecognised flag value, Adagrad with its own learning rate and no decay.
    Default,
}

impl OptimizerKind {
    /// Maps the `--optimizer` value. Matching is on the exact spellings accepted on the
    /// command line, not case-insensitive.
    pub fn from_flag(flag: &str) -> Self {
        match flag {
            "sgd" | "SGD" | "Sgd" => OptimizerKind::Sgd,
            "rms" | "RMSprop" | "rmsprop" | "Rmsprop" => OptimizerKind::RmsProp,
            "ada" | "ADA" | "Ada" => OptimizerKind::AdaGrad,
            _ => OptimizerKind::Default,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            OptimizerKind::Sgd => "Using SGD as the optimizer ...",
            OptimizerKind::RmsProp => "Using RMSProp as the optimizer ...",
            OptimizerKind::AdaGrad => "Using Adagrad as the optimizer ...",
            OptimizerKind::Default => "Using the default optimizer (Adagrad) ...",
        }
    }
}

/// Optimizer choice with the learning rate schedule it runs with.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OptimizerSettings {
    pub kind: OptimizerKind,
    pub learning_rate: f64,
    pub decay: f64,
}

impl OptimizerSettings {
    /// The fallback optimizer ignores the learning rate and decay flags.
    pub fn from_flags(flag: &str, learning_rate: f64, decay: f64) -> Self {
        let kind = OptimizerKind::from_flag(flag);
        match kind {
            OptimizerKind::Default => Self {
                kind,
                learning_rate: DEFAULT_LEARNING_RATE,
                decay: 0.0,
            },
            _ => Self {
                kind,
                learning_rate,
                decay,
            },
        }
    }

    /// Learning rate for the given optimizer iteration, counted from 0 over the whole run.
    pub fn learning_rate_at(&self, step: usize) -> f64 {
        decayed_learning_rate(self.learning_rate, self.decay, step)
    }
}

/// Time based decay, `lr / (1 + decay * step)`.
pub fn decayed_learning_rate(learning_rate: f64, decay: f64, step: usize) -> f64 {
    learning_rate / (1.0 + decay * step as f64)
}

/// SGD with full momentum and Nesterov updates.
pub fn sgd() -> SgdConfig {
    SgdConfig::new().with_momentum(Some(MomentumConfig {
        momentum: 1.0,
        dampening: 0.,
        nesterov: true,
    }))
}

pub fn rms_prop() -> RmsPropConfig {
    RmsPropConfig::new()
        .with_alpha(0.9)
        .with_epsilon(EPSILON)
        .with_momentum(0.0)
}

/// Decay is applied through [`decayed_learning_rate`], not the optimizer's own schedule.
pub fn ada_grad() -> AdaGradConfig {
    AdaGradConfig::new().with_epsilon(EPSILON).with_lr_decay(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_spellings_select_optimizer() {
        for flag in ["sgd", "SGD", "Sgd"] {
            assert_eq!(OptimizerKind::from_flag(flag), OptimizerKind::Sgd);
        }
        for flag in ["rms", "RMSprop", "rmsprop", "Rmsprop"] {
            assert_eq!(OptimizerKind::from_flag(flag), OptimizerKind::RmsProp);
        }
        for flag in ["ada", "ADA", "Ada"] {
            assert_eq!(OptimizerKind::from_flag(flag), OptimizerKind::AdaGrad);
        }
        for flag in ["adam", "RMS", "", "sGd"] {
            assert_eq!(OptimizerKind::from_flag(flag), OptimizerKind::Default);
        }
    }

    #[test]
    fn fallback_ignores_flag_values() {
        let settings = OptimizerSettings::from_flags("adam", 0.5, 0.1);
        assert_eq!(settings.kind, OptimizerKind::Default);
        assert_eq!(settings.learning_rate, DEFAULT_LEARNING_RATE);
        assert_eq!(settings.decay, 0.0);

        let settings = OptimizerSettings::from_flags("sgd", 0.5, 0.1);
        assert_eq!(settings.learning_rate, 0.5);
        assert_eq!(settings.decay, 0.1);
    }

    #[test]
    fn time_based_decay() {
        assert_eq!(decayed_learning_rate(0.1, 0.0, 1000), 0.1);
        assert_eq!(decayed_learning_rate(0.1, 0.5, 0), 0.1);
        assert!((decayed_learning_rate(0.1, 0.5, 2) - 0.05).abs() < 1e-12);
        assert!((decayed_learning_rate(1.0, 0.01, 100) - 0.5).abs() < 1e-12);

        let settings = OptimizerSettings::from_flags("rms", 1.0, 1.0);
        assert!((settings.learning_rate_at(3) - 0.25).abs() < 1e-12);
    }
}
