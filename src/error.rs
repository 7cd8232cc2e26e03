//! Error and warning types shared across the engine.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Malformed transaction record. Graph construction stops at the first one.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InputError {
    #[error("record {row}: missing required field `{field}`")]
    MissingField { row: usize, field: &'static str },

    #[error("record {row}: amount {value} is not a finite number")]
    InvalidAmount { row: usize, value: f64 },

    #[error("record {row}: field `{field}` is blank")]
    EmptyIdentifier { row: usize, field: &'static str },
}

/// Failure reported by an external classifier. Never masked by the ranker.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClassifierError {
    #[error("invalid feature vector: {0}")]
    InvalidFeatures(String),

    #[error("classifier returned {0}, expected a probability in [0, 1]")]
    ProbabilityOutOfRange(f64),

    #[error("classifier failed: {0}")]
    Model(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum LoadError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Input(#[from] InputError),

    #[error("record reader thread panicked")]
    ReaderPanicked,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Classifier(#[from] ClassifierError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Load(#[from] LoadError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Iterative stage that can stop at its iteration cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Louvain,
    Hits,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Louvain => write!(f, "louvain"),
            Stage::Hits => write!(f, "hits"),
        }
    }
}

/// An iteration cap was hit before the stability threshold.
///
/// Not an error: the result it travels with is the best-effort last iterate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvergenceWarning {
    pub stage: Stage,
    pub iterations: usize,
}

impl fmt::Display for ConvergenceWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} stopped after {} iterations without converging",
            self.stage, self.iterations
        )
    }
}
