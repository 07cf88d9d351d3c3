//! Datasets: named example lists with a tracked operation history.
//!
//! A [`Dataset`] owns its examples and the ordered list of [`OperationRecord`]s that produced
//! them. Read-only entry points ([`Dataset::apply`], [`Dataset::apply_op`]) never touch either.
//! [`Dataset::apply_in_place`] runs an operation, diffs the result, appends a record and
//! recomputes the commit hash as one step: on any error the dataset is left exactly as it was
//! (with the single exception of the FAILED record written under [`FailurePolicy::Record`]).

mod audit;
pub mod diff;
mod execute;
mod history;
mod persistence;

use std::sync::Arc;

use regex::Regex;
use tracing::{info, warn};

use crate::config::DatasetConfig;
use crate::error::{ReconError, Result, StateMismatch};
use crate::hashing::{self, CommitHash, ExampleHash};
use crate::operations::{CallArgs, FailurePolicy, Operation, OperationRef, ResolvedArgs};
use crate::stats::{self, NerStats};
use crate::store::ExampleStore;
use crate::types::{Example, OperationRecord};

pub use diff::{diff, diff_hashes};
pub use persistence::{EXTERNAL_CHANGES, STATE_DIR, STORE_FILE};
pub(crate) use persistence::{check_target, data_path, store_path};

/// Outcome of running an operation, not yet committed to a dataset.
#[derive(Debug, Clone)]
pub struct Plan {
    pub(crate) examples: Vec<Example>,
    pub(crate) record: OperationRecord,
    pub(crate) commit_hash: CommitHash,
}

impl Plan {
    /// Record that committing this plan would append.
    pub fn record(&self) -> &OperationRecord {
        &self.record
    }

    /// Examples the dataset would hold after committing.
    pub fn examples(&self) -> &[Example] {
        &self.examples
    }
}

/// One step of [`Dataset::pipe_in_place`].
#[derive(Debug, Clone)]
pub enum PipelineStep {
    /// Operation with call arguments.
    Call(OperationRef, CallArgs),
    /// Replay a recorded operation with its stored arguments.
    Replay(OperationRecord),
}

impl PipelineStep {
    fn name(&self) -> String {
        match self {
            PipelineStep::Call(OperationRef::Name(name), _) => name.clone(),
            PipelineStep::Call(OperationRef::Op(op), _) => op.name().to_string(),
            PipelineStep::Replay(record) => record.name.clone(),
        }
    }
}

impl From<&str> for PipelineStep {
    fn from(name: &str) -> Self {
        PipelineStep::Call(name.into(), CallArgs::new())
    }
}

impl<R: Into<OperationRef>> From<(R, CallArgs)> for PipelineStep {
    fn from((op, call): (R, CallArgs)) -> Self {
        PipelineStep::Call(op.into(), call)
    }
}

impl From<OperationRecord> for PipelineStep {
    fn from(record: OperationRecord) -> Self {
        PipelineStep::Replay(record)
    }
}

/// A named, ordered collection of examples with tracked mutation history.
#[derive(Debug, Clone)]
pub struct Dataset {
    name: String,
    examples: Vec<Example>,
    operations: Vec<OperationRecord>,
    store: ExampleStore,
    config: DatasetConfig,
    commit_hash: CommitHash,
    mismatch: Option<StateMismatch>,
}

impl Dataset {
    /// Create a dataset with its own example store.
    pub fn new(name: impl Into<String>, examples: Vec<Example>) -> Self {
        Self::with_store(name, examples, ExampleStore::new())
    }

    /// Create a dataset backed by a shared example store.
    pub fn with_store(name: impl Into<String>, examples: Vec<Example>, store: ExampleStore) -> Self {
        let name = name.into();
        store.put_all(&examples);
        let commit_hash = hashing::dataset_hash(&name, &examples);
        Self {
            name,
            examples,
            operations: Vec::new(),
            store,
            config: DatasetConfig::default(),
            commit_hash,
            mismatch: None,
        }
    }

    pub fn with_config(mut self, config: DatasetConfig) -> Self {
        self.config = config;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn examples(&self) -> &[Example] {
        &self.examples
    }

    /// Operation history, oldest first.
    pub fn operations(&self) -> &[OperationRecord] {
        &self.operations
    }

    pub fn commit_hash(&self) -> &CommitHash {
        &self.commit_hash
    }

    pub fn store(&self) -> &ExampleStore {
        &self.store
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// Current example with this content hash.
    pub fn get(&self, hash: ExampleHash) -> Option<&Example> {
        self.examples.iter().find(|e| e.hash() == hash)
    }

    /// Run a read-only function over the examples.
    ///
    /// ```
    /// use recon::{Dataset, Example, Span, stats};
    ///
    /// let rust = Example::new("Rust", vec![Span::new("Rust", 0, 4, "SKILL")]);
    /// let ds = Dataset::new("train", vec![rust]);
    /// let counts = ds.apply(stats::label_counts);
    /// assert_eq!(counts["SKILL"], 1);
    /// ```
    pub fn apply<R>(&self, f: impl FnOnce(&[Example]) -> R) -> R {
        f(&self.examples)
    }

    /// Preview an operation: the examples it would produce, without recording anything.
    pub fn apply_op(&self, op: impl Into<OperationRef>, call: &CallArgs) -> Result<Vec<Example>> {
        let op = op.into().resolve()?;
        let args = op.resolve(call)?;
        let run = execute::execute(&op, &self.examples, &args, &self.name)?;
        Ok(run.examples)
    }

    /// Run an operation without committing it.
    pub fn plan(&self, op: &Operation, call: &CallArgs) -> Result<Plan> {
        let args = op.resolve(call)?;
        self.plan_resolved(op, args)
    }

    fn plan_resolved(&self, op: &Operation, args: ResolvedArgs) -> Result<Plan> {
        if self.config.warn_on_tokens
            && !op.handles_tokens()
            && self.examples.iter().any(Example::has_tokens)
        {
            warn!(
                dataset = %self.name,
                operation = op.name(),
                "operation does not keep tokens consistent; token offsets may be stale"
            );
        }

        let run = execute::execute(op, &self.examples, &args, &self.name)?;
        let commit_hash = hashing::dataset_hash(&self.name, &run.examples);
        let record = OperationRecord::completed(op.name(), args.into_inner(), run.transformations);

        Ok(Plan {
            examples: run.examples,
            record,
            commit_hash,
        })
    }

    /// Commit a plan produced by [`Dataset::plan`] on this dataset.
    pub fn commit(&mut self, plan: Plan) -> &mut Self {
        self.store.put_all(&plan.examples);
        info!(
            dataset = %self.name,
            operation = %plan.record.name,
            added = plan.record.examples_added,
            removed = plan.record.examples_removed,
            changed = plan.record.examples_changed,
            commit = plan.commit_hash.short(),
            "applied operation"
        );
        self.examples = plan.examples;
        self.operations.push(plan.record);
        self.commit_hash = plan.commit_hash;
        self
    }

    /// Apply an operation in place and record it.
    ///
    /// Errors leave examples, history and commit hash untouched, except that an operation with
    /// [`FailurePolicy::Record`] appends a FAILED record before the error is returned.
    pub fn apply_in_place(
        &mut self,
        op: impl Into<OperationRef>,
        call: &CallArgs,
    ) -> Result<&mut Self> {
        let op: Arc<Operation> = op.into().resolve()?;
        let args = op.resolve(call)?;

        match self.plan_resolved(&op, args.clone()) {
            Ok(plan) => Ok(self.commit(plan)),
            Err(err) => {
                if op.failure_policy() == FailurePolicy::Record {
                    warn!(
                        dataset = %self.name,
                        operation = op.name(),
                        error = %err,
                        "recording failed operation"
                    );
                    self.operations.push(OperationRecord::failed(
                        op.name(),
                        args.into_inner(),
                        err.to_string(),
                    ));
                }
                Err(err)
            }
        }
    }

    /// Apply a sequence of operations in place, stopping at the first error.
    ///
    /// Steps before the failing one stay applied.
    pub fn pipe_in_place<I, S>(&mut self, steps: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<PipelineStep>,
    {
        let steps: Vec<PipelineStep> = steps.into_iter().map(Into::into).collect();
        info!(
            dataset = %self.name,
            steps = ?steps.iter().map(PipelineStep::name).collect::<Vec<_>>(),
            "applying pipeline"
        );

        for step in steps {
            match step {
                PipelineStep::Call(op, call) => self.apply_in_place(op, &call)?,
                PipelineStep::Replay(record) => {
                    let call = CallArgs::from_record(&record);
                    self.apply_in_place(record.name.as_str(), &call)?
                }
            };
        }
        Ok(self)
    }

    /// Examples whose text contains `query`.
    pub fn search(&self, query: &str, case_sensitive: bool) -> Vec<&Example> {
        if case_sensitive {
            self.examples.iter().filter(|e| e.text.contains(query)).collect()
        } else {
            let query = query.to_lowercase();
            self.examples
                .iter()
                .filter(|e| e.text.to_lowercase().contains(&query))
                .collect()
        }
    }

    /// Examples whose text matches `pattern`.
    pub fn search_regex(&self, pattern: &str) -> Result<Vec<&Example>> {
        let re = Regex::new(pattern)?;
        Ok(self.examples.iter().filter(|e| re.is_match(&e.text)).collect())
    }

    pub fn stats(&self) -> NerStats {
        stats::ner_stats(&self.examples)
    }

    /// Human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "Dataset '{}' ({} operations, commit {})\n{}",
            self.name,
            self.operations.len(),
            self.commit_hash.short(),
            self.stats()
        )
    }

    /// Mismatch found when this dataset was loaded, if any.
    pub fn state_mismatch(&self) -> Option<&StateMismatch> {
        self.mismatch.as_ref()
    }

    /// Fail if the loaded data had changed outside the tracked history.
    pub fn check_state(&self) -> Result<()> {
        match &self.mismatch {
            Some(mismatch) => Err(ReconError::StateMismatch(mismatch.clone())),
            None => Ok(()),
        }
    }
}

impl PartialEq for Dataset {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.commit_hash == other.commit_hash
            && self.examples == other.examples
            && self.operations == other.operations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::{Outcome, Param, ParamType};
    use crate::types::{OperationStatus, Span, Token};
    use serde_json::{Value, json};

    fn jobs() -> Vec<Example> {
        vec![
            Example::new("Python developer", vec![Span::new("Python", 0, 6, "skill")]),
            Example::new("Rust engineer", vec![Span::new("Rust", 0, 4, "SKILL")]),
        ]
    }

    #[test]
    fn test_apply_in_place_records_change() {
        let mut ds = Dataset::new("train", jobs());
        let before = ds.commit_hash().clone();
        let old_hash = ds.examples()[0].hash();

        ds.apply_in_place("recon.v1.upcase_labels", &CallArgs::new())
            .unwrap();

        let record = &ds.operations()[0];
        assert_eq!(record.status, OperationStatus::Completed);
        assert_eq!(
            (record.examples_added, record.examples_removed, record.examples_changed),
            (0, 0, 1)
        );
        assert_eq!(record.transformations[0].prev_example_hash, Some(old_hash));
        assert_eq!(
            record.transformations[0].example_hash,
            Some(ds.examples()[0].hash())
        );
        assert_ne!(ds.commit_hash(), &before);
        assert!(ds.store().contains(old_hash));
    }

    #[test]
    fn test_apply_is_read_only() {
        let ds = Dataset::new("train", jobs());
        let preview = ds
            .apply_op("recon.v1.upcase_labels", &CallArgs::new())
            .unwrap();

        assert_eq!(preview[0].spans[0].label, "SKILL");
        assert_eq!(ds.examples()[0].spans[0].label, "skill");
        assert!(ds.operations().is_empty());
        assert_eq!(ds.apply(|examples| examples.len()), 2);
    }

    #[test]
    fn test_unknown_operation() {
        let mut ds = Dataset::new("train", jobs());
        let err = ds
            .apply_in_place("recon.v1.nope", &CallArgs::new())
            .unwrap_err();
        assert!(matches!(err, ReconError::OperationNotFound(_)));
        assert!(ds.operations().is_empty());
    }

    #[test]
    fn test_bad_arguments_leave_no_record() {
        let mut ds = Dataset::new("train", jobs());
        let before = ds.clone();
        let err = ds
            .apply_in_place(
                "recon.v1.rename_labels",
                &CallArgs::new().kwarg("label_map", "SKILL"),
            )
            .unwrap_err();

        assert!(matches!(err, ReconError::ArgumentResolution { .. }));
        assert_eq!(ds, before);
    }

    #[test]
    fn test_record_policy_appends_failed_record() {
        let op = Operation::per_example("test.v1.always_fails", |_, _, _| {
            Err(ReconError::operation("boom"))
        })
        .with_param(Param::optional("n", ParamType::Int, 2))
        .with_failure_policy(FailurePolicy::Record);

        let mut ds = Dataset::new("train", jobs());
        let examples_before = ds.examples().to_vec();
        let commit_before = ds.commit_hash().clone();

        assert!(ds.apply_in_place(op, &CallArgs::new()).is_err());
        assert_eq!(ds.examples(), examples_before.as_slice());
        assert_eq!(ds.commit_hash(), &commit_before);

        let record = &ds.operations()[0];
        assert_eq!(record.status, OperationStatus::Failed);
        assert!(record.error.as_deref().is_some_and(|e| e.contains("boom")));
        assert_eq!(record.kwargs["n"], json!(2));
        assert!(record.transformations.is_empty());
    }

    #[test]
    fn test_plan_does_not_mutate_until_commit() {
        let mut ds = Dataset::new("train", jobs());
        let op = crate::operations::registry::get("recon.v1.upcase_labels").unwrap();

        let plan = ds.plan(&op, &CallArgs::new()).unwrap();
        assert_eq!(plan.record().examples_changed, 1);
        assert!(ds.operations().is_empty());

        ds.commit(plan);
        assert_eq!(ds.operations().len(), 1);
    }

    #[test]
    fn test_pipe_in_place_replays_records() {
        let mut source = Dataset::new("train", jobs());
        source
            .apply_in_place(
                "recon.v1.rename_labels",
                &CallArgs::new().kwarg("label_map", json!({"skill": "TECH"})),
            )
            .unwrap();
        let recorded = source.operations()[0].clone();

        let mut ds = Dataset::new("train", jobs());
        ds.pipe_in_place(vec![
            PipelineStep::from(recorded),
            PipelineStep::from("recon.v1.upcase_labels"),
        ])
        .unwrap();

        assert_eq!(ds.operations().len(), 2);
        let labels: Vec<&str> = ds.examples().iter().flat_map(Example::labels).collect();
        assert_eq!(labels, vec!["TECH", "SKILL"]);
    }

    #[test]
    fn test_search() {
        let ds = Dataset::new("train", jobs());
        assert_eq!(ds.search("python", false).len(), 1);
        assert!(ds.search("python", true).is_empty());
        assert_eq!(ds.search_regex(r"^\w+ (developer|engineer)$").unwrap().len(), 2);
        assert!(matches!(ds.search_regex("("), Err(ReconError::Regex(_))));
    }

    #[test]
    fn test_get_by_hash() {
        let ds = Dataset::new("train", jobs());
        let hash = ds.examples()[1].hash();
        assert_eq!(ds.get(hash).map(|e| e.text.as_str()), Some("Rust engineer"));
        assert!(ds.get(ExampleHash::new(0)).is_none());
    }

    #[test]
    fn test_summary_mentions_counts() {
        let ds = Dataset::new("train", jobs());
        let summary = ds.summary();
        assert!(summary.contains("Dataset 'train'"));
        assert!(summary.contains("Annotations: 2"));
    }

    #[test]
    fn test_split_operation_adds_examples() {
        let op = Operation::per_example("test.v1.split_words", |example, _, _| {
            let words: Vec<Example> = example
                .text
                .split(' ')
                .map(|w| Example::new(w, vec![]))
                .collect();
            Ok(Outcome::Many(words))
        });

        let mut ds = Dataset::new("train", jobs());
        ds.apply_in_place(op, &CallArgs::new()).unwrap();
        let record = &ds.operations()[0];
        assert_eq!(ds.len(), 4);
        assert_eq!(
            (record.examples_changed, record.examples_added, record.examples_removed),
            (0, 4, 2)
        );
    }

    #[test]
    fn test_tokenized_examples_still_processed() {
        let tokenized = Example::new("Rust", vec![Span::new("Rust", 0, 4, "skill")])
            .with_tokens(vec![Token::new("Rust", 0, 4, 0)]);
        let mut ds = Dataset::new("train", vec![tokenized]);
        ds.apply_in_place(
            "recon.v1.strip_annotations",
            &CallArgs::new().kwarg("strip_chars", Value::Null),
        )
        .unwrap();
        assert_eq!(ds.operations()[0].examples_changed, 0);
    }
}
