//! Undoing recorded operations.

use tracing::info;

use super::Dataset;
use crate::error::{ReconError, Result};
use crate::hashing;
use crate::types::{Example, OperationStatus, Transformation, TransformationType};

impl Dataset {
    /// Undo the last `n` operations.
    ///
    /// Records are undone newest first, each one's transformations in reverse: a changed example
    /// is swapped back in place, an added one is removed, a removed one is appended again. The
    /// previous examples are resolved through the example store. Records that are not COMPLETED
    /// carry no applied changes and are simply dropped from the history.
    pub fn rollback(&mut self, n: usize) -> Result<&mut Self> {
        if n == 0 {
            return Err(ReconError::Rollback("n must be 1 or higher".to_string()));
        }
        if n > self.operations.len() {
            return Err(ReconError::Rollback(format!(
                "cannot roll back {} operations, dataset '{}' only has {}",
                n,
                self.name,
                self.operations.len()
            )));
        }

        let keep = self.operations.len() - n;
        let mut examples = self.examples.clone();
        for record in self.operations[keep..].iter().rev() {
            if record.status != OperationStatus::Completed {
                continue;
            }
            for transformation in record.transformations.iter().rev() {
                self.undo(&mut examples, transformation)?;
            }
        }

        let undone: Vec<String> = self.operations[keep..]
            .iter()
            .map(|r| r.name.clone())
            .collect();
        self.operations.truncate(keep);
        self.commit_hash = hashing::dataset_hash(&self.name, &examples);
        self.examples = examples;
        info!(
            dataset = %self.name,
            undone = ?undone,
            commit = self.commit_hash.short(),
            "rolled back operations"
        );
        Ok(self)
    }

    fn undo(&self, examples: &mut Vec<Example>, t: &Transformation) -> Result<()> {
        let position = |examples: &[Example]| {
            t.example_hash
                .and_then(|hash| examples.iter().rposition(|e| e.hash() == hash))
        };
        let missing = || {
            ReconError::Rollback(format!(
                "example {} of a {} transformation is not in dataset '{}'",
                t.example_hash.map(|h| h.to_string()).unwrap_or_default(),
                t.kind.label(),
                self.name
            ))
        };

        match (t.kind, t.prev_example_hash) {
            (TransformationType::ExampleAdded, _) => {
                let idx = position(examples).ok_or_else(missing)?;
                examples.remove(idx);
            }
            (TransformationType::ExampleChanged, Some(prev)) => {
                let idx = position(examples).ok_or_else(missing)?;
                examples[idx] = self.store.get(prev)?;
            }
            (TransformationType::ExampleRemoved, Some(prev)) => {
                examples.push(self.store.get(prev)?);
            }
            (_, None) => {
                return Err(ReconError::Rollback(format!(
                    "{} transformation without a previous example",
                    t.kind.label()
                )));
            }
        }
        Ok(())
    }
}
