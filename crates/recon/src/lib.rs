//! Recon: mutation tracking and operations for NER datasets.
//!
//! A [`Dataset`] is a named list of annotated [`Example`]s plus the history of every operation
//! applied to it. Operations are looked up by name in a registry, their arguments are bound
//! against a declared schema, and each in-place application records which examples were added,
//! removed or changed (by content hash) so the history can be audited, replayed or rolled back.
//!
//! # Core Principles
//!
//! - **Content-addressed**: Examples are identified by a deterministic hash of their content
//! - **Append-only history**: Every in-place change is recorded; old examples stay resolvable
//!   through the [`ExampleStore`]
//! - **Atomic application**: A failing operation leaves the dataset as it was
//!
//! # Example
//!
//! ```
//! use recon::{CallArgs, Dataset, Example, Span};
//!
//! let examples = vec![Example::new("Rust developer", vec![Span::new("Rust", 0, 4, "skill")])];
//! let mut train = Dataset::new("train", examples);
//!
//! train.apply_in_place("recon.v1.upcase_labels", &CallArgs::new()).unwrap();
//!
//! assert_eq!(train.examples()[0].spans[0].label, "SKILL");
//! assert_eq!(train.operations()[0].examples_changed, 1);
//! ```

pub mod config;
pub mod corpus;
pub mod dataset;
pub mod error;
pub mod hashing;
pub mod io;
pub mod operations;
pub mod stats;
pub mod store;
pub mod types;

pub use config::DatasetConfig;
pub use corpus::Corpus;
pub use dataset::{Dataset, PipelineStep, Plan};
pub use error::{FieldError, ReconError, Result, StateMismatch};
pub use hashing::{CommitHash, ExampleHash};
pub use operations::{CallArgs, FailurePolicy, Operation, OperationRef, Outcome, Param, ParamType};
pub use store::ExampleStore;
pub use types::{
    DatasetState, Example, OperationRecord, OperationStatus, Span, Token, Transformation,
    TransformationType,
};
