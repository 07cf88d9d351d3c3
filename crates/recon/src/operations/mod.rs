//! Named operations over examples.
//!
//! This module provides:
//! - [`Operation`]: a named callable with a declared parameter schema
//! - [`params`]: parameter declarations and argument resolution
//! - [`registry`]: the name → operation registry
//! - built-in operations under the `recon.v1.*` namespace

pub mod augmentation;
pub mod corrections;
mod operation;
mod params;
pub mod registry;
pub mod validation;

pub use operation::{
    DatasetFn, ExampleContext, ExampleFn, FailurePolicy, Operation, OperationFactory,
    OperationKind, OperationRef, Outcome, PreparedOperation, Preprocessor,
};
pub use params::{CallArgs, Param, ParamType, ResolvedArgs, resolve};
pub use registry::OperationRegistry;

/// Every built-in operation.
pub(crate) fn builtin_operations() -> Vec<Operation> {
    let mut ops = validation::operations();
    ops.extend(corrections::operations());
    ops.extend(augmentation::operations());
    ops
}
