use std::path::PathBuf;

use thiserror::Error;

/// Error types shared by the scoring engine, the adapters and the rule engine
#[derive(Debug, Error)]
pub enum PedError {
    /// A search pattern or filter failed to compile
    #[error("Pattern error in '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    /// A rule was given parameters it cannot work with
    #[error("Config error: {0}")]
    Config(String),
    /// Scoring was attempted without anything to score
    #[error("Insufficient data: {0}")]
    InsufficientData(String),
    /// A tree did not have the shape a mutation expected
    #[error("Structural mismatch: {0}")]
    StructuralMismatch(String),
    /// A write-back was given a value list of the wrong size
    #[error("Length mismatch: expected {expected} values, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    /// A row index outside the record store
    #[error("Row {row} is out of range for {len} records")]
    RowOutOfRange { row: usize, len: usize },
    /// Markup that could not be parsed
    #[error("XML error: {0}")]
    Xml(String),
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl PedError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PedError::Io {
            path: path.into(),
            source,
        }
    }

    /// True for errors that only invalidate a single translation unit
    pub fn is_unit_level(&self) -> bool {
        matches!(self, PedError::StructuralMismatch(_))
    }
}

/// Compile a regular expression, reporting the offending pattern on failure
pub fn compile_pattern(pattern: &str) -> PedResult<regex::Regex> {
    regex::Regex::new(pattern).map_err(|source| PedError::Pattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// Result type for scoring and rule operations
pub type PedResult<T> = Result<T, PedError>;
