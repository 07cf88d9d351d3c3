//! Read-only statistics over example lists.
//!
//! These are plain dataset functions: they take `&[Example]` and never mutate, so they can be
//! passed to [`Dataset::apply`](crate::Dataset::apply) and [`Corpus::apply`](crate::Corpus::apply).

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::types::Example;

/// Summary NER statistics for a list of examples.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NerStats {
    pub n_examples: usize,
    pub n_examples_no_entities: usize,
    pub n_annotations: usize,
    /// Annotation count per label, most frequent first (ties by label).
    pub n_annotations_per_type: IndexMap<String, usize>,
}

impl fmt::Display for NerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Examples: {}", self.n_examples)?;
        writeln!(f, "Examples without entities: {}", self.n_examples_no_entities)?;
        writeln!(f, "Annotations: {}", self.n_annotations)?;
        for (label, count) in &self.n_annotations_per_type {
            writeln!(f, "  {label}: {count}")?;
        }
        Ok(())
    }
}

/// Count span labels, in order of first appearance.
pub fn label_counts(examples: &[Example]) -> IndexMap<String, usize> {
    let mut counts: IndexMap<String, usize> = IndexMap::new();
    for label in examples.iter().flat_map(Example::labels) {
        *counts.entry(label.to_string()).or_default() += 1;
    }
    counts
}

/// Compute [`NerStats`] for `examples`.
pub fn ner_stats(examples: &[Example]) -> NerStats {
    let mut per_type = label_counts(examples);
    per_type.sort_by(|la, ca, lb, cb| cb.cmp(ca).then_with(|| la.cmp(lb)));

    NerStats {
        n_examples: examples.len(),
        n_examples_no_entities: examples.iter().filter(|e| e.spans.is_empty()).count(),
        n_annotations: examples.iter().map(|e| e.spans.len()).sum(),
        n_annotations_per_type: per_type,
    }
}
