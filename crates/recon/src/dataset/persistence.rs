//! Saving and loading datasets.
//!
//! Layout under the root directory passed to [`Dataset::to_disk`]:
//!
//! ```text
//! <root>/
//! ├── <name>.jsonl                  # current examples
//! └── .recon/
//!     ├── example_store.jsonl       # every example ever seen, by hash
//!     └── <name>/state.json         # name, commit hash, size, operation history
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::Dataset;
use crate::config::DatasetConfig;
use crate::error::{ReconError, Result, StateMismatch};
use crate::io;
use crate::operations::{CallArgs, registry};
use crate::store::ExampleStore;
use crate::types::{DatasetState, OperationRecord, OperationStatus};

/// Hidden directory holding history and the example store.
pub const STATE_DIR: &str = ".recon";

/// File name of the example store inside [`STATE_DIR`].
pub const STORE_FILE: &str = "example_store.jsonl";

/// Name of the record appended when loaded data no longer matches its history.
pub const EXTERNAL_CHANGES: &str = "recon.v1.external_changes";

pub(crate) fn data_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.jsonl"))
}

pub(crate) fn state_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(STATE_DIR).join(name).join("state.json")
}

pub(crate) fn store_path(dir: &Path) -> PathBuf {
    dir.join(STATE_DIR).join(STORE_FILE)
}

/// Fail with [`ReconError::Exists`] unless `force` is set or `dir` is new.
pub(crate) fn check_target(dir: &Path, force: bool) -> Result<()> {
    if dir.exists() && !force {
        return Err(ReconError::Exists(dir.to_path_buf()));
    }
    fs::create_dir_all(dir).map_err(|e| ReconError::io(dir, e))
}

impl Dataset {
    /// Save examples, history and (per config) the example store under `dir`.
    ///
    /// Nothing is written when `dir` already exists and `force` is false.
    pub fn to_disk(&self, dir: impl AsRef<Path>, force: bool) -> Result<()> {
        let dir = dir.as_ref();
        check_target(dir, force)?;
        self.write_files(dir)?;
        if self.config.save_example_store {
            self.store.to_disk(store_path(dir))?;
        }
        Ok(())
    }

    /// Write the data file and state file, without the store.
    pub(crate) fn write_files(&self, dir: &Path) -> Result<()> {
        io::write_jsonl(data_path(dir, &self.name), &self.examples)?;

        let state = DatasetState {
            name: self.name.clone(),
            commit_hash: self.commit_hash.clone(),
            size: self.examples.len(),
            operations: self.operations.clone(),
        };
        io::write_json_pretty(state_path(dir, &self.name), &state)?;

        info!(
            dataset = %self.name,
            path = %dir.display(),
            examples = self.examples.len(),
            operations = self.operations.len(),
            "saved dataset"
        );
        Ok(())
    }

    /// Load the dataset `name` saved under `dir` with the default config.
    pub fn from_disk(dir: impl AsRef<Path>, name: &str) -> Result<Self> {
        Self::from_disk_with_config(dir, name, DatasetConfig::default())
    }

    /// Load the dataset `name` saved under `dir`.
    ///
    /// The state file and the example store are optional; without a state file the dataset
    /// starts with an empty history. If the loaded examples do not hash to the stored commit, the
    /// mismatch is logged, exposed through [`Dataset::state_mismatch`] and recorded as an
    /// [`EXTERNAL_CHANGES`] operation.
    pub fn from_disk_with_config(
        dir: impl AsRef<Path>,
        name: &str,
        config: DatasetConfig,
    ) -> Result<Self> {
        let dir = dir.as_ref();
        let store = ExampleStore::new();
        let path = store_path(dir);
        if path.exists() {
            let count = store.load(&path)?;
            debug!(path = %path.display(), count, "loaded example store");
        }
        Self::load(dir, name, config, store)
    }

    /// Load a dataset into an existing store. The store file itself is not read.
    pub(crate) fn load(
        dir: &Path,
        name: &str,
        config: DatasetConfig,
        store: ExampleStore,
    ) -> Result<Self> {
        let examples = io::read_examples(data_path(dir, name))?;
        let mut dataset = Dataset::with_store(name, examples, store).with_config(config);

        let path = state_path(dir, name);
        if !path.exists() {
            debug!(dataset = name, "no saved state, starting with empty history");
            return Ok(dataset);
        }

        let state: DatasetState = io::read_json(&path)?;
        if state.name != name {
            return Err(ReconError::Persistence(format!(
                "State file '{}' belongs to dataset '{}', expected '{}'",
                path.display(),
                state.name,
                name
            )));
        }
        dataset.operations = state.operations;

        if state.commit_hash != dataset.commit_hash {
            let mismatch = StateMismatch {
                dataset: name.to_string(),
                stored: state.commit_hash,
                actual: dataset.commit_hash.clone(),
                stored_size: state.size,
                actual_size: dataset.examples.len(),
            };
            warn!(
                dataset = name,
                stored = mismatch.stored.short(),
                actual = mismatch.actual.short(),
                "{}",
                mismatch
            );
            dataset.record_external_changes(&mismatch);
            dataset.mismatch = Some(mismatch);

            if dataset.config.replay_on_mismatch {
                dataset.replay()?;
            }
        }

        info!(
            dataset = name,
            examples = dataset.examples.len(),
            operations = dataset.operations.len(),
            "loaded dataset"
        );
        Ok(dataset)
    }

    fn record_external_changes(&mut self, mismatch: &StateMismatch) {
        let mut record = OperationRecord::new(EXTERNAL_CHANGES);
        record.status = OperationStatus::Completed;
        record.examples_added = mismatch.actual_size.saturating_sub(mismatch.stored_size);
        record.examples_removed = mismatch.stored_size.saturating_sub(mismatch.actual_size);
        self.operations.push(record);
    }

    /// Mark the loaded history stale and apply each registered operation in it once more.
    fn replay(&mut self) -> Result<()> {
        let mut names = HashSet::new();
        let mut pending = Vec::new();
        for record in &mut self.operations {
            if record.name == EXTERNAL_CHANGES {
                continue;
            }
            record.status = OperationStatus::NotStarted;
            if registry::contains(&record.name) && names.insert(record.name.clone()) {
                pending.push((record.name.clone(), CallArgs::from_record(record)));
            }
        }

        info!(
            dataset = %self.name,
            operations = pending.len(),
            "replaying operations over changed data"
        );
        for (name, call) in pending {
            self.apply_in_place(name.as_str(), &call)?;
        }
        Ok(())
    }
}
