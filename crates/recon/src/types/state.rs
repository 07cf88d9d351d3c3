//! Operation history records.

use chrono::Utc;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::hashing::{CommitHash, ExampleHash};

/// Lifecycle of a recorded operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
    Failed,
}

impl OperationStatus {
    /// Get a human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            OperationStatus::NotStarted => "NOT_STARTED",
            OperationStatus::InProgress => "IN_PROGRESS",
            OperationStatus::Completed => "COMPLETED",
            OperationStatus::Failed => "FAILED",
        }
    }
}

/// Kind of change recorded for one example.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransformationType {
    ExampleAdded,
    ExampleRemoved,
    ExampleChanged,
}

impl TransformationType {
    pub fn label(&self) -> &'static str {
        match self {
            TransformationType::ExampleAdded => "EXAMPLE_ADDED",
            TransformationType::ExampleRemoved => "EXAMPLE_REMOVED",
            TransformationType::ExampleChanged => "EXAMPLE_CHANGED",
        }
    }
}

/// One add/remove/change event.
///
/// Added entries have no previous hash, removed entries have no current hash, changed entries
/// have both and they differ. The constructors are the only way to build one in this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Transformation {
    #[serde(rename = "prev_example")]
    pub prev_example_hash: Option<ExampleHash>,
    #[serde(rename = "example")]
    pub example_hash: Option<ExampleHash>,
    #[serde(rename = "type")]
    pub kind: TransformationType,
}

impl Transformation {
    pub fn added(example: ExampleHash) -> Self {
        Self {
            prev_example_hash: None,
            example_hash: Some(example),
            kind: TransformationType::ExampleAdded,
        }
    }

    pub fn removed(prev: ExampleHash) -> Self {
        Self {
            prev_example_hash: Some(prev),
            example_hash: None,
            kind: TransformationType::ExampleRemoved,
        }
    }

    pub fn changed(prev: ExampleHash, example: ExampleHash) -> Self {
        debug_assert_ne!(prev, example);
        Self {
            prev_example_hash: Some(prev),
            example_hash: Some(example),
            kind: TransformationType::ExampleChanged,
        }
    }
}

/// A recorded operation applied to a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub name: String,

    #[serde(default)]
    pub args: Vec<Value>,

    #[serde(default)]
    pub kwargs: IndexMap<String, Value>,

    #[serde(default)]
    pub status: OperationStatus,

    /// Unix seconds.
    pub ts: i64,

    #[serde(default)]
    pub examples_added: usize,

    #[serde(default)]
    pub examples_removed: usize,

    #[serde(default)]
    pub examples_changed: usize,

    #[serde(default)]
    pub transformations: Vec<Transformation>,

    /// Error message when `status` is `Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OperationRecord {
    /// Create a record that has not run yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            kwargs: IndexMap::new(),
            status: OperationStatus::NotStarted,
            ts: Utc::now().timestamp(),
            examples_added: 0,
            examples_removed: 0,
            examples_changed: 0,
            transformations: Vec::new(),
            error: None,
        }
    }

    /// Create a completed record; counts are derived from the transformations.
    pub fn completed(
        name: impl Into<String>,
        kwargs: IndexMap<String, Value>,
        transformations: Vec<Transformation>,
    ) -> Self {
        let mut record = Self::new(name).with_kwargs(kwargs);
        record.set_transformations(transformations);
        record.status = OperationStatus::Completed;
        record
    }

    /// Create a failed record carrying the error message.
    pub fn failed(
        name: impl Into<String>,
        kwargs: IndexMap<String, Value>,
        error: impl Into<String>,
    ) -> Self {
        let mut record = Self::new(name).with_kwargs(kwargs);
        record.status = OperationStatus::Failed;
        record.error = Some(error.into());
        record
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    pub fn with_kwargs(mut self, kwargs: IndexMap<String, Value>) -> Self {
        self.kwargs = kwargs;
        self
    }

    /// Replace the transformations and recount them.
    pub fn set_transformations(&mut self, transformations: Vec<Transformation>) {
        let count = |kind: TransformationType| {
            transformations.iter().filter(|t| t.kind == kind).count()
        };
        self.examples_added = count(TransformationType::ExampleAdded);
        self.examples_removed = count(TransformationType::ExampleRemoved);
        self.examples_changed = count(TransformationType::ExampleChanged);
        self.transformations = transformations;
    }

    /// Whether the operation changed anything.
    pub fn changed_data(&self) -> bool {
        self.examples_added + self.examples_removed + self.examples_changed > 0
    }
}

/// Persisted history of one dataset (`.recon/<name>/state.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetState {
    pub name: String,
    pub commit_hash: CommitHash,
    /// Number of examples when the state was written.
    #[serde(default)]
    pub size: usize,
    #[serde(default)]
    pub operations: Vec<OperationRecord>,
}
