//! Property-based tests for hashing, diffing and rollback.
//!
//! # Running Property Tests
//!
//! ```bash
//! cargo test -p recon --test property_tests
//!
//! # More cases
//! PROPTEST_CASES=10000 cargo test -p recon --test property_tests
//! ```

use proptest::prelude::*;

use recon::dataset::diff;
use recon::{CallArgs, Dataset, Example, Outcome, Operation, Span, TransformationType};

// =============================================================================
// Test Strategies
// =============================================================================

fn label() -> impl Strategy<Value = String> {
    prop_oneof![Just("PER"), Just("ORG"), Just("loc"), Just("skill")].prop_map(String::from)
}

/// Example whose single optional span covers its first word.
fn example() -> impl Strategy<Value = Example> {
    ("[a-z]{1,8}( [a-z]{1,8}){0,3}", proptest::option::of(label())).prop_map(|(text, label)| {
        let spans = match label {
            Some(label) => {
                let end = text.find(' ').unwrap_or(text.len());
                vec![Span::new(&text[..end], 0, end, label)]
            }
            None => Vec::new(),
        };
        Example::new(text, spans)
    })
}

fn examples() -> impl Strategy<Value = Vec<Example>> {
    proptest::collection::vec(example(), 0..12)
}

fn count(ts: &[recon::Transformation], kind: TransformationType) -> usize {
    ts.iter().filter(|t| t.kind == kind).count()
}

// =============================================================================
// Hashing Properties
// =============================================================================

proptest! {
    #[test]
    fn hash_is_deterministic(e in example()) {
        prop_assert_eq!(e.hash(), e.clone().hash());
        prop_assert_eq!(e.hash(), recon::hashing::example_hash(&e));
    }

    #[test]
    fn label_change_changes_hash(e in example()) {
        prop_assume!(!e.spans.is_empty());
        let mut changed = e.clone();
        changed.spans[0].label.push('X');
        prop_assert_ne!(e.hash(), changed.hash());
    }

    #[test]
    fn commit_hash_depends_on_order(a in example(), b in example()) {
        prop_assume!(a.hash() != b.hash());
        let ab = Dataset::new("train", vec![a.clone(), b.clone()]);
        let ba = Dataset::new("train", vec![b, a]);
        prop_assert_ne!(ab.commit_hash(), ba.commit_hash());
    }
}

// =============================================================================
// Diff Properties
// =============================================================================

proptest! {
    #[test]
    fn diff_of_identical_lists_is_empty(list in examples()) {
        prop_assert!(diff(&list, &list).is_empty());
    }

    #[test]
    fn appended_examples_are_added(list in examples(), extra in examples()) {
        let known: Vec<_> = list.iter().map(Example::hash).collect();
        let extra: Vec<Example> = extra
            .into_iter()
            .filter(|e| !known.contains(&e.hash()))
            .collect();
        let mut new = list.clone();
        new.extend(extra.iter().cloned());

        let ts = diff(&list, &new);
        prop_assert_eq!(count(&ts, TransformationType::ExampleAdded), extra.len());
        prop_assert_eq!(count(&ts, TransformationType::ExampleChanged), 0);
        prop_assert_eq!(count(&ts, TransformationType::ExampleRemoved), 0);
    }

    #[test]
    fn length_change_matches_added_minus_removed(old in examples(), new in examples()) {
        let ts = diff(&old, &new);
        let added = count(&ts, TransformationType::ExampleAdded) as isize;
        let removed = count(&ts, TransformationType::ExampleRemoved) as isize;
        prop_assert_eq!(new.len() as isize - old.len() as isize, added - removed);
    }

    #[test]
    fn dropping_duplicates_rolls_back(list in examples()) {
        let doubled: Vec<Example> = list.iter().chain(list.iter()).cloned().collect();
        let half = list.len();
        let truncate = Operation::dataset("test.v1.keep_first_half", move |mut examples, _| {
            examples.truncate(half);
            Ok(examples)
        });

        let mut ds = Dataset::new("train", doubled.clone());
        ds.apply_in_place(truncate, &CallArgs::new()).unwrap();
        prop_assert_eq!(ds.operations()[0].examples_removed, half);

        ds.rollback(1).unwrap();
        let mut restored: Vec<_> = ds.examples().iter().map(Example::hash).collect();
        let mut expected: Vec<_> = doubled.iter().map(Example::hash).collect();
        restored.sort();
        expected.sort();
        prop_assert_eq!(restored, expected);
    }

    #[test]
    fn changes_never_exceed_shorter_list(old in examples(), new in examples()) {
        let ts = diff(&old, &new);
        prop_assert!(count(&ts, TransformationType::ExampleChanged) <= old.len().min(new.len()));
        for t in &ts {
            match t.kind {
                TransformationType::ExampleAdded => prop_assert!(t.prev_example_hash.is_none()),
                TransformationType::ExampleRemoved => prop_assert!(t.example_hash.is_none()),
                TransformationType::ExampleChanged => {
                    prop_assert!(t.prev_example_hash.is_some() && t.example_hash.is_some());
                    prop_assert_ne!(t.prev_example_hash, t.example_hash);
                }
            }
        }
    }
}

// =============================================================================
// Apply / Rollback Properties
// =============================================================================

proptest! {
    #[test]
    fn upcase_rolls_back_exactly(list in examples()) {
        let mut ds = Dataset::new("train", list);
        let initial = ds.clone();

        ds.apply_in_place("recon.v1.upcase_labels", &CallArgs::new()).unwrap();
        let record = &ds.operations()[0];
        prop_assert_eq!(record.examples_added + record.examples_removed, 0);

        ds.rollback(1).unwrap();
        prop_assert_eq!(ds, initial);
    }

    #[test]
    fn drop_short_examples_rolls_back_to_same_multiset(list in examples()) {
        let drop_short = Operation::per_example("test.v1.drop_short", |example, _, _| {
            Ok(if example.text.len() < 4 { Outcome::dropped() } else { example.into() })
        });

        let mut ds = Dataset::new("train", list.clone());
        ds.apply_in_place(drop_short, &CallArgs::new()).unwrap();
        prop_assert!(ds.examples().iter().all(|e| e.text.len() >= 4));

        ds.rollback(1).unwrap();
        let mut restored: Vec<_> = ds.examples().iter().map(Example::hash).collect();
        let mut expected: Vec<_> = list.iter().map(Example::hash).collect();
        restored.sort();
        expected.sort();
        prop_assert_eq!(restored, expected);
    }
}
