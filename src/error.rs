use thiserror::Error;

#[derive(Error, Debug)]
pub enum TokenizerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Vocabulary JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid merge rule on line {line}: {reason}")]
    InvalidMerge { line: usize, reason: String },

    #[error("Invalid padding_length {0}: must be -1 or greater than 0")]
    InvalidPaddingLength(i64),

    #[error("Shape mismatch: outer shape {shape:?} holds {expected} rows, got {actual}")]
    ShapeMismatch {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },
}

impl TokenizerError {
    /// Whether this error was raised while validating construction-time configuration.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            TokenizerError::Config(_)
                | TokenizerError::Json(_)
                | TokenizerError::InvalidMerge { .. }
                | TokenizerError::InvalidPaddingLength(_)
        )
    }
}
