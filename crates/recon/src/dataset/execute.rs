//! Running an operation over an example list.
//!
//! Nothing here touches a dataset: execution takes the current examples and returns the new
//! list plus the transformations describing it. Recording the result is the caller's job.

use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, warn};

use super::diff::diff;
use crate::error::{ReconError, Result};
use crate::operations::{
    ExampleContext, FailurePolicy, Operation, OperationKind, Outcome, ResolvedArgs,
};
use crate::types::{Example, Transformation};

/// New examples and what changed.
#[derive(Debug, Clone, Default)]
pub(crate) struct Execution {
    pub examples: Vec<Example>,
    pub transformations: Vec<Transformation>,
}

/// Run every preprocessor of `op` once over `examples`.
///
/// Returns one map per example from preprocessor name to its output for that example, or an
/// empty list when the operation declares no preprocessors.
fn preprocess(op: &Operation, examples: &[Example]) -> Result<Vec<IndexMap<String, Value>>> {
    if op.preprocessors().is_empty() {
        return Ok(Vec::new());
    }

    let mut per_example = vec![IndexMap::new(); examples.len()];
    for preprocessor in op.preprocessors() {
        let outputs = preprocessor.run(examples)?;
        if outputs.len() != examples.len() {
            return Err(ReconError::operation(format!(
                "preprocessor '{}' returned {} outputs for {} examples",
                preprocessor.name(),
                outputs.len(),
                examples.len()
            )));
        }
        for (slot, output) in per_example.iter_mut().zip(outputs) {
            slot.insert(preprocessor.name().to_string(), output);
        }
        debug!(
            operation = op.name(),
            preprocessor = preprocessor.name(),
            "preprocessed examples"
        );
    }
    Ok(per_example)
}

/// Transformations for one input example and what the operation made of it.
///
/// A single replacement is a change when its hash differs. A list keeps at most one copy of the
/// input; every other emitted example is added, and the input is removed when no copy survives.
fn slot_transformations(input: &Example, outcome: &Outcome) -> Vec<Transformation> {
    let hash = input.hash();
    match outcome {
        Outcome::One(example) if example.hash() == hash => Vec::new(),
        Outcome::One(example) => vec![Transformation::changed(hash, example.hash())],
        Outcome::Many(examples) => {
            let mut kept = false;
            let mut transformations = Vec::with_capacity(examples.len() + 1);
            for example in examples {
                let emitted = example.hash();
                if emitted == hash && !kept {
                    kept = true;
                } else {
                    transformations.push(Transformation::added(emitted));
                }
            }
            if !kept {
                transformations.push(Transformation::removed(hash));
            }
            transformations
        }
    }
}

/// Apply `op` to `examples` with already resolved `args`.
///
/// Example-level operations are classified per input with [`slot_transformations`].
/// Dataset-level operations are diffed over the whole list.
pub(crate) fn execute(
    op: &Operation,
    examples: &[Example],
    args: &ResolvedArgs,
    dataset: &str,
) -> Result<Execution> {
    let preprocessed = preprocess(op, examples)?;
    let no_outputs = IndexMap::new();

    let mut apply_one: Box<dyn FnMut(Example, &ExampleContext<'_>) -> Result<Outcome> + '_> =
        match op.kind() {
            OperationKind::Dataset(f) => {
                let new = f(examples.to_vec(), args.clone())?;
                let transformations = diff(examples, &new);
                return Ok(Execution {
                    examples: new,
                    transformations,
                });
            }
            OperationKind::PerExample(f) => {
                Box::new(move |example: Example, ctx: &ExampleContext<'_>| {
                    f(example, args, ctx)
                })
            }
            OperationKind::Factory(factory) => {
                let mut prepared = factory.prepare(examples, &preprocessed, args)?;
                Box::new(move |example: Example, ctx: &ExampleContext<'_>| {
                    prepared.apply(example, args, ctx)
                })
            }
        };

    let mut execution = Execution {
        examples: Vec::with_capacity(examples.len()),
        transformations: Vec::new(),
    };

    for (index, example) in examples.iter().enumerate() {
        let ctx = ExampleContext::new(index, preprocessed.get(index).unwrap_or(&no_outputs));
        let outcome = match apply_one(example.clone(), &ctx) {
            Ok(outcome) => outcome,
            Err(err) => match op.failure_policy() {
                FailurePolicy::Drop => {
                    warn!(
                        dataset,
                        operation = op.name(),
                        index,
                        error = %err,
                        "dropping example that failed"
                    );
                    Outcome::dropped()
                }
                FailurePolicy::Propagate | FailurePolicy::Record => {
                    return Err(ReconError::ExampleFailed {
                        operation: op.name().to_string(),
                        index,
                        message: err.to_string(),
                    });
                }
            },
        };

        execution
            .transformations
            .extend(slot_transformations(example, &outcome));
        execution.examples.extend(outcome.into_vec());
    }

    Ok(execution)
}
