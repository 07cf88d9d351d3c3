//! Label normalization and overlap filtering.

use crate::types::{Example, Span};

use super::operation::Operation;

pub const UPCASE_LABELS: &str = "recon.v1.upcase_labels";
pub const FILTER_OVERLAPS: &str = "recon.v1.filter_overlaps";

/// Uppercase every span label.
pub fn upcase_labels(mut example: Example) -> Example {
    for span in &mut example.spans {
        span.label = span.label.to_uppercase();
    }
    example
}

/// Keep the longest span of each chain of overlapping spans. Output is sorted by start.
pub fn filter_overlaps(mut example: Example) -> Example {
    let mut spans = std::mem::take(&mut example.spans);
    spans.sort_by_key(|s| s.start);
    example.spans = remove_overlapping(spans);
    example
}

fn overlaps(a: &Span, b: &Span) -> bool {
    a.start.max(b.start) < a.end.min(b.end)
}

/// `spans` must be sorted by start.
fn remove_overlapping(spans: Vec<Span>) -> Vec<Span> {
    let mut kept = Vec::with_capacity(spans.len());
    let mut chain: Vec<Span> = Vec::new();
    let mut chain_end = 0;

    for span in spans {
        if !chain.is_empty() && span.start >= chain_end {
            kept.extend(select_from_chain(std::mem::take(&mut chain)));
        }
        chain_end = if chain.is_empty() {
            span.end
        } else {
            chain_end.max(span.end)
        };
        chain.push(span);
    }
    kept.extend(select_from_chain(chain));

    kept.sort_by_key(|s| s.start);
    kept
}

/// Greedily take the longest span that does not overlap one already taken.
fn select_from_chain(mut chain: Vec<Span>) -> Vec<Span> {
    chain.sort_by(|a, b| b.len().cmp(&a.len()));
    let mut selected: Vec<Span> = Vec::with_capacity(1);
    for span in chain {
        if !selected.iter().any(|s| overlaps(s, &span)) {
            selected.push(span);
        }
    }
    selected
}

pub(crate) fn operations() -> Vec<Operation> {
    vec![
        Operation::per_example(UPCASE_LABELS, |example, _, _| {
            Ok(upcase_labels(example).into())
        }),
        Operation::per_example(FILTER_OVERLAPS, |example, _, _| {
            Ok(filter_overlaps(example).into())
        }),
    ]
}
