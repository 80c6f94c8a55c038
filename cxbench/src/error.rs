use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("unknown {kind} '{name}'")]
    UnknownName { kind: &'static str, name: String },

    #[error("missing {kind} at '{}'", path.display())]
    MissingFile { kind: &'static str, path: PathBuf },

    /// Predictions and labels (or model outputs and inputs) disagree in length.
    #[error("shape mismatch: expected {expected} items, found {found}")]
    ShapeMismatch { expected: usize, found: usize },

    #[error("invalid data: {0}")]
    InvalidData(String),

    /// A ground-truth class has no examples, so its row cannot be normalized.
    #[error("no examples with ground truth class {class}")]
    EmptyClass { class: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
