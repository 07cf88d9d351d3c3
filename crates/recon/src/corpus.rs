//! Train/dev/test datasets handled as one unit.

use std::path::Path;

use indexmap::IndexMap;
use tracing::info;

use crate::config::DatasetConfig;
use crate::dataset::{self, Dataset};
use crate::error::Result;
use crate::operations::{CallArgs, Operation, OperationRef};
use crate::store::ExampleStore;
use crate::types::Example;

/// Container of the train, dev and optional test datasets of one corpus.
///
/// All member datasets share a single [`ExampleStore`].
#[derive(Debug, Clone)]
pub struct Corpus {
    name: String,
    train: Dataset,
    dev: Dataset,
    test: Option<Dataset>,
    store: ExampleStore,
}

impl Corpus {
    /// Build a corpus from example lists named `train`, `dev` and `test`.
    pub fn new(
        name: impl Into<String>,
        train: Vec<Example>,
        dev: Vec<Example>,
        test: Option<Vec<Example>>,
    ) -> Self {
        let store = ExampleStore::new();
        Self {
            name: name.into(),
            train: Dataset::with_store("train", train, store.clone()),
            dev: Dataset::with_store("dev", dev, store.clone()),
            test: test.map(|examples| Dataset::with_store("test", examples, store.clone())),
            store,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn train(&self) -> &Dataset {
        &self.train
    }

    pub fn dev(&self) -> &Dataset {
        &self.dev
    }

    pub fn test(&self) -> Option<&Dataset> {
        self.test.as_ref()
    }

    pub fn store(&self) -> &ExampleStore {
        &self.store
    }

    /// Member datasets in train, dev, test order.
    pub fn datasets(&self) -> impl Iterator<Item = &Dataset> {
        [Some(&self.train), Some(&self.dev), self.test.as_ref()]
            .into_iter()
            .flatten()
    }

    fn datasets_mut(&mut self) -> impl Iterator<Item = &mut Dataset> {
        [Some(&mut self.train), Some(&mut self.dev), self.test.as_mut()]
            .into_iter()
            .flatten()
    }

    /// Concatenation of train, dev and test examples.
    pub fn all(&self) -> Vec<Example> {
        self.datasets()
            .flat_map(|ds| ds.examples().iter().cloned())
            .collect()
    }

    /// Run a read-only function over every member dataset and over [`Corpus::all`].
    ///
    /// Results are keyed `train`, `dev`, `test` (when present) and `all`.
    pub fn apply<R>(&self, f: impl Fn(&[Example]) -> R) -> IndexMap<String, R> {
        let mut results: IndexMap<String, R> = self
            .datasets()
            .map(|ds| (ds.name().to_string(), ds.apply(&f)))
            .collect();
        results.insert("all".to_string(), f(&self.all()));
        results
    }

    /// Apply an operation in place to every member dataset.
    ///
    /// Either every dataset records the operation or none does: each one is planned first and
    /// plans are only committed once all of them succeeded.
    pub fn apply_in_place(
        &mut self,
        op: impl Into<OperationRef>,
        call: &CallArgs,
    ) -> Result<&mut Self> {
        let op = op.into().resolve()?;
        let plans = self
            .datasets()
            .map(|ds| ds.plan(&op, call))
            .collect::<Result<Vec<_>>>()?;

        for (ds, plan) in self.datasets_mut().zip(plans) {
            ds.commit(plan);
        }
        info!(corpus = %self.name, operation = op.name(), "applied operation to corpus");
        Ok(self)
    }

    /// Apply several operations in order, each one atomically across the corpus.
    pub fn pipe_in_place<I, S>(&mut self, steps: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = (S, CallArgs)>,
        S: Into<OperationRef>,
    {
        for (op, call) in steps {
            self.apply_in_place(op, &call)?;
        }
        Ok(self)
    }

    /// Save every member dataset under `dir` and the shared store once.
    pub fn to_disk(&self, dir: impl AsRef<Path>, force: bool) -> Result<()> {
        let dir = dir.as_ref();
        dataset::check_target(dir, force)?;
        for ds in self.datasets() {
            ds.write_files(dir)?;
        }
        self.store.to_disk(dataset::store_path(dir))?;
        info!(corpus = %self.name, path = %dir.display(), "saved corpus");
        Ok(())
    }

    /// Load a corpus saved with [`Corpus::to_disk`]. The test dataset is optional.
    pub fn from_disk(dir: impl AsRef<Path>, name: impl Into<String>) -> Result<Self> {
        Self::from_disk_with_config(dir, name, DatasetConfig::default())
    }

    pub fn from_disk_with_config(
        dir: impl AsRef<Path>,
        name: impl Into<String>,
        config: DatasetConfig,
    ) -> Result<Self> {
        let dir = dir.as_ref();
        let store = ExampleStore::new();
        let path = dataset::store_path(dir);
        if path.exists() {
            store.load(&path)?;
        }

        let load = |name: &str| Dataset::load(dir, name, config.clone(), store.clone());
        let train = load("train")?;
        let dev = load("dev")?;
        let test = if dataset::data_path(dir, "test").exists() {
            Some(load("test")?)
        } else {
            None
        };

        Ok(Self {
            name: name.into(),
            train,
            dev,
            test,
            store,
        })
    }

    /// Preview an operation on every member dataset without recording it.
    pub fn apply_op(
        &self,
        op: &Operation,
        call: &CallArgs,
    ) -> Result<IndexMap<String, Vec<Example>>> {
        self.datasets()
            .map(|ds| Ok((ds.name().to_string(), ds.plan(op, call)?.examples)))
            .collect()
    }
}
