//! Error types for the Recon library.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::hashing::{CommitHash, ExampleHash};

/// A single parameter that failed to resolve against an operation's schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Name of the declared parameter.
    pub param: String,
    /// Location inside the value, e.g. `[0].to_label` (empty for the top level).
    pub path: String,
    /// What went wrong.
    pub message: String,
}

impl FieldError {
    pub fn new(param: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            param: param.into(),
            path: String::new(),
            message: message.into(),
        }
    }

    pub(crate) fn at(mut self, segment: &str) -> Self {
        self.path = format!("{}{}", segment, self.path);
        self
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}: {}", self.param, self.path, self.message)
    }
}

/// Stored history no longer describes the loaded examples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateMismatch {
    pub dataset: String,
    pub stored: CommitHash,
    pub actual: CommitHash,
    pub stored_size: usize,
    pub actual_size: usize,
}

impl fmt::Display for StateMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dataset '{}' changed outside of tracked history (stored commit {} with {} examples, loaded {} with {} examples)",
            self.dataset, self.stored, self.stored_size, self.actual, self.actual_size
        )
    }
}

/// Main error type for Recon operations.
#[derive(Debug, Error)]
pub enum ReconError {
    /// Error reading or writing a file.
    #[error("IO error for '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A line of a JSONL file could not be decoded.
    #[error("Parse error in '{path}' at line {line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// No operation is registered under this name.
    #[error("Operation '{0}' not found")]
    OperationNotFound(String),

    /// An operation with this name is already registered.
    #[error("Operation '{0}' is already registered")]
    DuplicateOperation(String),

    /// Arguments did not match the operation's declared parameters.
    #[error("Invalid arguments for operation '{operation}': {}", join_field_errors(.errors))]
    ArgumentResolution {
        operation: String,
        errors: Vec<FieldError>,
    },

    /// The operation failed for a single example.
    #[error("Operation '{operation}' failed on example {index}: {message}")]
    ExampleFailed {
        operation: String,
        index: usize,
        message: String,
    },

    /// Raised by operation implementations.
    #[error("Operation failed: {0}")]
    OperationFailed(String),

    /// Target of `to_disk` already exists.
    #[error("Output path '{0}' already exists, pass force to overwrite")]
    Exists(PathBuf),

    /// Loaded examples do not match the stored commit hash.
    #[error("State mismatch: {0}")]
    StateMismatch(StateMismatch),

    /// Hash could not be resolved through the example store.
    #[error("Example with hash {0} not found")]
    ExampleNotFound(ExampleHash),

    /// History cannot be rolled back as requested.
    #[error("Rollback error: {0}")]
    Rollback(String),

    /// Persisted state is malformed.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error from the CSV library.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Regex compilation error.
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl ReconError {
    /// Convenience constructor for operation implementations.
    pub fn operation(message: impl Into<String>) -> Self {
        ReconError::OperationFailed(message.into())
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ReconError::Io {
            path: path.into(),
            source,
        }
    }
}

fn join_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type alias for Recon operations.
pub type Result<T> = std::result::Result<T, ReconError>;
