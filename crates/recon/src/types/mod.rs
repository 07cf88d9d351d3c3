//! Core data model: annotated examples and the records describing changes to them.

mod example;
mod state;

pub use example::{Example, Span, Token};
pub use state::{DatasetState, OperationRecord, OperationStatus, Transformation, TransformationType};

pub(crate) use example::char_slice;
