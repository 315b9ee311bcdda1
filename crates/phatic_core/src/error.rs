use std::path::PathBuf;

/// Errors raised by the learning core.
///
/// Unseen keys and the very first step are normal flow and never show up
/// here; these variants are contract violations or unusable persisted state.
#[derive(Debug, thiserror::Error)]
pub enum LearningError {
    #[error("context vector has {actual} elements, network expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("corrupt agent file {}: {reason}", .path.display())]
    PersistenceCorrupt { path: PathBuf, reason: String },

    #[error("corrupt token stream: {0}")]
    CorruptStream(String),

    #[error("invalid network topology: {0}")]
    InvalidTopology(String),

    #[error("token {0:?} cannot be written to a whitespace-delimited file")]
    UnencodableToken(String),

    #[error("config validation error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LearningError {
    /// Attach a file path to a stream-level corruption error.
    pub fn at_path(self, path: impl Into<PathBuf>) -> Self {
        match self {
            LearningError::CorruptStream(reason) => LearningError::PersistenceCorrupt {
                path: path.into(),
                reason,
            },
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, LearningError>;
