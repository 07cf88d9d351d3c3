//! Classify the changes between two example lists.
//!
//! Pairing is positional: wherever both lists hold an example at index `i` and the hashes
//! differ, that is one `EXAMPLE_CHANGED`. Every other occurrence is matched by counting hashes on
//! both sides: each surplus occurrence in the new list is an `EXAMPLE_ADDED`, each surplus
//! occurrence in the old list an `EXAMPLE_REMOVED`. Duplicates therefore count, and
//! `new.len() - old.len() == added - removed` always holds. A pure reorder shows up as changes
//! at every moved index.

use indexmap::IndexMap;

use crate::hashing::ExampleHash;
use crate::types::{Example, Transformation};

/// Diff two example lists.
pub fn diff(old: &[Example], new: &[Example]) -> Vec<Transformation> {
    let old: Vec<ExampleHash> = old.iter().map(Example::hash).collect();
    let new: Vec<ExampleHash> = new.iter().map(Example::hash).collect();
    diff_hashes(&old, &new)
}

/// Diff two lists of example hashes.
pub fn diff_hashes(old: &[ExampleHash], new: &[ExampleHash]) -> Vec<Transformation> {
    let mut transformations = Vec::new();
    // new occurrences minus old occurrences, excluding positional changes
    let mut surplus: IndexMap<ExampleHash, isize> = IndexMap::new();

    for (i, hash) in old.iter().enumerate() {
        match new.get(i) {
            Some(other) if other != hash => {
                transformations.push(Transformation::changed(*hash, *other));
            }
            _ => *surplus.entry(*hash).or_default() -= 1,
        }
    }
    for (i, hash) in new.iter().enumerate() {
        if old.get(i).is_none_or(|other| other == hash) {
            *surplus.entry(*hash).or_default() += 1;
        }
    }

    for hash in new {
        if let Some(n) = surplus.get_mut(hash).filter(|n| **n > 0) {
            *n -= 1;
            transformations.push(Transformation::added(*hash));
        }
    }
    for hash in old {
        if let Some(n) = surplus.get_mut(hash).filter(|n| **n < 0) {
            *n += 1;
            transformations.push(Transformation::removed(*hash));
        }
    }

    transformations
}
