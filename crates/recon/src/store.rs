//! Append-only, content-addressed archive of every example a session has seen.
//!
//! History records only hold hashes; the store is what turns them back into examples (for
//! rollback and auditing). Entries are never removed. A store is a cheap handle: clones share
//! the same underlying map, which is how a [`Corpus`](crate::Corpus) shares one store across its
//! datasets.

use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{ReconError, Result};
use crate::hashing::ExampleHash;
use crate::io;
use crate::types::Example;

/// On-disk line of `example_store.jsonl`.
#[derive(Serialize)]
struct StoreEntryRef<'a> {
    example_hash: ExampleHash,
    example: &'a Example,
}

#[derive(Deserialize)]
struct StoreEntry {
    example_hash: ExampleHash,
    example: Example,
}

/// Shared mapping from content hash to example.
#[derive(Debug, Clone, Default)]
pub struct ExampleStore {
    inner: Arc<RwLock<IndexMap<ExampleHash, Example>>>,
}

impl ExampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_examples<'a>(examples: impl IntoIterator<Item = &'a Example>) -> Self {
        let store = Self::new();
        store.put_all(examples);
        store
    }

    fn read(&self) -> RwLockReadGuard<'_, IndexMap<ExampleHash, Example>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, IndexMap<ExampleHash, Example>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store an example and return its hash. Storing the same content again is a no-op.
    pub fn put(&self, example: &Example) -> ExampleHash {
        let hash = example.hash();
        let mut map = self.write();
        if !map.contains_key(&hash) {
            map.insert(hash, example.clone());
        }
        hash
    }

    pub fn put_all<'a>(&self, examples: impl IntoIterator<Item = &'a Example>) {
        let mut map = self.write();
        for example in examples {
            map.entry(example.hash()).or_insert_with(|| example.clone());
        }
    }

    pub fn get(&self, hash: ExampleHash) -> Result<Example> {
        self.read()
            .get(&hash)
            .cloned()
            .ok_or(ReconError::ExampleNotFound(hash))
    }

    pub fn contains(&self, hash: ExampleHash) -> bool {
        self.read().contains_key(&hash)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Hashes in insertion order.
    pub fn hashes(&self) -> Vec<ExampleHash> {
        self.read().keys().copied().collect()
    }

    /// Whether both handles point at the same underlying store.
    pub fn shares_with(&self, other: &ExampleStore) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Write every entry as `{"example_hash": .., "example": {..}}`, one per line.
    pub fn to_disk(&self, path: impl AsRef<Path>) -> Result<()> {
        let map = self.read();
        let entries: Vec<StoreEntryRef<'_>> = map
            .iter()
            .map(|(hash, example)| StoreEntryRef {
                example_hash: *hash,
                example,
            })
            .collect();
        io::write_jsonl(path, &entries)
    }

    /// Merge entries from disk into this store, returning how many were read.
    ///
    /// Every entry is re-hashed; an entry whose content no longer matches its key means the
    /// file was edited or written by an incompatible hash implementation.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let entries: Vec<StoreEntry> = io::read_jsonl(path)?;
        let count = entries.len();

        let mut map = self.write();
        for entry in entries {
            let actual = entry.example.hash();
            if actual != entry.example_hash {
                return Err(ReconError::Persistence(format!(
                    "Example store '{}' entry {} hashes to {}",
                    path.display(),
                    entry.example_hash,
                    actual
                )));
            }
            map.entry(actual).or_insert(entry.example);
        }

        Ok(count)
    }
}
