//! The `Operation` type and the call protocol every operation follows.
//!
//! Operations come in three shapes:
//!
//! - **per-example**: called once per example, returning an [`Outcome`] (one replacement, or
//!   zero/many examples emitted at that position);
//! - **dataset**: called once over the whole example list;
//! - **factory**: two-phase. [`OperationFactory::prepare`] sees every example and the outputs of
//!   the declared [`Preprocessor`]s once, and returns a [`PreparedOperation`] that is then applied
//!   per example like a per-example operation.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::params::{self, CallArgs, Param, ResolvedArgs};
use super::registry;
use crate::error::Result;
use crate::types::Example;

/// Result of applying an operation to one example.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Replace the input.
    One(Example),
    /// Emit all of these at the input's position. Empty drops the input.
    Many(Vec<Example>),
}

impl Outcome {
    /// Drop the input example.
    pub fn dropped() -> Self {
        Outcome::Many(Vec::new())
    }

    pub fn into_vec(self) -> Vec<Example> {
        match self {
            Outcome::One(example) => vec![example],
            Outcome::Many(examples) => examples,
        }
    }
}

impl From<Example> for Outcome {
    fn from(example: Example) -> Self {
        Outcome::One(example)
    }
}

impl From<Vec<Example>> for Outcome {
    fn from(examples: Vec<Example>) -> Self {
        Outcome::Many(examples)
    }
}

/// Per-call context handed to example-level functions.
#[derive(Debug, Clone, Copy)]
pub struct ExampleContext<'a> {
    index: usize,
    preprocessed: &'a IndexMap<String, Value>,
}

impl<'a> ExampleContext<'a> {
    pub fn new(index: usize, preprocessed: &'a IndexMap<String, Value>) -> Self {
        Self {
            index,
            preprocessed,
        }
    }

    /// Position of the example in the input list.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Output of the named preprocessor for this example.
    pub fn preprocessed(&self, name: &str) -> Option<&'a Value> {
        self.preprocessed.get(name)
    }
}

/// What happens when an example-level call returns an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Drop the failing example and keep going.
    #[default]
    Drop,
    /// Abort the call and leave the dataset untouched.
    Propagate,
    /// Abort the call, leave the examples untouched and append a FAILED record.
    Record,
}

/// Batch function run over all examples before a factory operation is prepared.
pub trait Preprocessor: Send + Sync {
    fn name(&self) -> &str;

    /// One output per example, in order.
    fn run(&self, examples: &[Example]) -> Result<Vec<Value>>;
}

/// First phase of a factory operation.
pub trait OperationFactory: Send + Sync {
    /// Build shared state from the whole example list. `preprocessed[i]` maps each preprocessor
    /// name to its output for `examples[i]`.
    fn prepare(
        &self,
        examples: &[Example],
        preprocessed: &[IndexMap<String, Value>],
        args: &ResolvedArgs,
    ) -> Result<Box<dyn PreparedOperation>>;
}

/// Second phase of a factory operation, applied per example.
pub trait PreparedOperation {
    fn apply(
        &mut self,
        example: Example,
        args: &ResolvedArgs,
        ctx: &ExampleContext<'_>,
    ) -> Result<Outcome>;
}

pub type ExampleFn =
    dyn Fn(Example, &ResolvedArgs, &ExampleContext<'_>) -> Result<Outcome> + Send + Sync;

pub type DatasetFn = dyn Fn(Vec<Example>, ResolvedArgs) -> Result<Vec<Example>> + Send + Sync;

/// How an operation is invoked.
#[derive(Clone)]
pub enum OperationKind {
    PerExample(Arc<ExampleFn>),
    Dataset(Arc<DatasetFn>),
    Factory(Arc<dyn OperationFactory>),
}

impl fmt::Debug for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            OperationKind::PerExample(_) => "PerExample",
            OperationKind::Dataset(_) => "Dataset",
            OperationKind::Factory(_) => "Factory",
        };
        f.write_str(kind)
    }
}

/// A named operation with its declared parameters.
#[derive(Clone)]
pub struct Operation {
    name: String,
    params: Vec<Param>,
    kind: OperationKind,
    preprocessors: Vec<Arc<dyn Preprocessor>>,
    failure_policy: FailurePolicy,
    handles_tokens: bool,
}

impl Operation {
    fn with_kind(name: impl Into<String>, kind: OperationKind) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            kind,
            preprocessors: Vec::new(),
            failure_policy: FailurePolicy::default(),
            handles_tokens: true,
        }
    }

    /// Operation called once per example.
    pub fn per_example<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Example, &ResolvedArgs, &ExampleContext<'_>) -> Result<Outcome> + Send + Sync + 'static,
    {
        Self::with_kind(name, OperationKind::PerExample(Arc::new(f)))
    }

    /// Operation called once over the whole example list.
    pub fn dataset<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Vec<Example>, ResolvedArgs) -> Result<Vec<Example>> + Send + Sync + 'static,
    {
        Self::with_kind(name, OperationKind::Dataset(Arc::new(f)))
    }

    /// Two-phase operation built by `factory`.
    pub fn factory(name: impl Into<String>, factory: impl OperationFactory + 'static) -> Self {
        Self::with_kind(name, OperationKind::Factory(Arc::new(factory)))
    }

    pub fn with_param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    pub fn with_params(mut self, params: impl IntoIterator<Item = Param>) -> Self {
        self.params.extend(params);
        self
    }

    pub fn with_preprocessor(mut self, preprocessor: impl Preprocessor + 'static) -> Self {
        self.preprocessors.push(Arc::new(preprocessor));
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Declare whether the operation keeps token information consistent.
    pub fn with_handles_tokens(mut self, handles_tokens: bool) -> Self {
        self.handles_tokens = handles_tokens;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn kind(&self) -> &OperationKind {
        &self.kind
    }

    pub fn preprocessors(&self) -> &[Arc<dyn Preprocessor>] {
        &self.preprocessors
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    pub fn handles_tokens(&self) -> bool {
        self.handles_tokens
    }

    pub fn is_factory(&self) -> bool {
        matches!(self.kind, OperationKind::Factory(_))
    }

    /// Resolve raw call arguments against this operation's parameters.
    pub fn resolve(&self, call: &CallArgs) -> Result<ResolvedArgs> {
        params::resolve(&self.name, &self.params, call)
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field(
                "params",
                &self.params.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
            )
            .field(
                "preprocessors",
                &self.preprocessors.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field("failure_policy", &self.failure_policy)
            .field("handles_tokens", &self.handles_tokens)
            .finish()
    }
}

/// An operation given by registered name or by value.
#[derive(Debug, Clone)]
pub enum OperationRef {
    Name(String),
    Op(Arc<Operation>),
}

impl OperationRef {
    /// Look the operation up in the global registry if given by name.
    pub fn resolve(&self) -> Result<Arc<Operation>> {
        match self {
            OperationRef::Name(name) => registry::get(name),
            OperationRef::Op(op) => Ok(Arc::clone(op)),
        }
    }
}

impl From<&str> for OperationRef {
    fn from(name: &str) -> Self {
        OperationRef::Name(name.to_string())
    }
}

impl From<String> for OperationRef {
    fn from(name: String) -> Self {
        OperationRef::Name(name)
    }
}

impl From<Operation> for OperationRef {
    fn from(op: Operation) -> Self {
        OperationRef::Op(Arc::new(op))
    }
}

impl From<Arc<Operation>> for OperationRef {
    fn from(op: Arc<Operation>) -> Self {
        OperationRef::Op(op)
    }
}

impl From<&Arc<Operation>> for OperationRef {
    fn from(op: &Arc<Operation>) -> Self {
        OperationRef::Op(Arc::clone(op))
    }
}
