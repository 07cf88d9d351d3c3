//! Integration tests for applying operations to datasets.

use serde_json::{Value, json};

use recon::operations::registry;
use recon::stats;
use recon::{
    CallArgs, Dataset, Example, FailurePolicy, Operation, OperationStatus, Outcome, Param,
    ParamType, ReconError, Span, TransformationType,
};

const FAIL_EXAMPLE_3: &str = "recon.v1.fail_example_3";
const COLLECT_SEEN: &str = "test.v1.collect_seen";

/// Register the test operations once per test binary.
fn register_test_operations() {
    let fail_third = Operation::per_example(FAIL_EXAMPLE_3, |example, _, ctx| {
        if ctx.index() == 2 {
            Err(ReconError::operation("cannot process the third example"))
        } else {
            Ok(example.into())
        }
    })
    .with_failure_policy(FailurePolicy::Propagate);

    // Pushes into its `seen` argument and stamps the resulting length on each example
    let collect_seen = Operation::dataset(COLLECT_SEEN, |examples, mut args| {
        let seen = args
            .get_mut("seen")
            .and_then(Value::as_array_mut)
            .ok_or_else(|| ReconError::operation("seen is not a list"))?;
        seen.push(json!("visited"));
        let len = seen.len();
        Ok(examples
            .into_iter()
            .map(|e| e.with_meta("seen", len))
            .collect())
    })
    .with_param(Param::optional("seen", ParamType::list(ParamType::Any), json!([])));

    for op in [fail_third, collect_seen] {
        match registry::register(op) {
            Ok(_) | Err(ReconError::DuplicateOperation(_)) => {}
            Err(e) => panic!("failed to register test operation: {e}"),
        }
    }
}

fn jobs() -> Vec<Example> {
    vec![
        Example::new("Python developer", vec![Span::new("Python", 0, 6, "skill")]),
        Example::new("Rust engineer", vec![Span::new("Rust", 0, 4, "SKILL")]),
    ]
}

fn five_examples() -> Vec<Example> {
    (0..5)
        .map(|i| {
            let text = format!("example {i}");
            Example::new(text, vec![Span::new("example", 0, 7, "thing")])
        })
        .collect()
}

// =============================================================================
// End-to-end Tests
// =============================================================================

#[test]
fn test_upcase_labels_end_to_end() {
    let mut train = Dataset::new("train", jobs());
    let before = train.commit_hash().clone();
    let first_before = train.examples()[0].hash();

    train
        .apply_in_place("recon.v1.upcase_labels", &CallArgs::new())
        .unwrap();

    let record = &train.operations()[0];
    assert_eq!(record.status, OperationStatus::Completed);
    assert_eq!(record.examples_changed, 1);
    assert_eq!(record.examples_added, 0);
    assert_eq!(record.examples_removed, 0);
    assert_eq!(record.transformations.len(), 1);

    let change = record.transformations[0];
    assert_eq!(change.kind, TransformationType::ExampleChanged);
    assert_eq!(change.prev_example_hash, Some(first_before));
    assert_eq!(change.example_hash, Some(train.examples()[0].hash()));
    assert_ne!(train.commit_hash(), &before);
}

#[test]
fn test_chained_operations() {
    let mut train = Dataset::new("train", jobs());
    train
        .apply_in_place(
            "recon.v1.rename_labels",
            &CallArgs::new().kwarg("label_map", json!({"skill": "tech", "SKILL": "tech"})),
        )
        .unwrap()
        .apply_in_place("recon.v1.upcase_labels", &CallArgs::new())
        .unwrap();

    assert_eq!(train.operations().len(), 2);
    assert_eq!(train.apply(stats::label_counts)["TECH"], 2);
}

#[test]
fn test_fix_annotations_from_records() {
    let mut train = Dataset::new("train", jobs());
    train
        .apply_in_place(
            "recon.v1.fix_annotations",
            &CallArgs::new().kwarg(
                "corrections",
                json!([
                    {"annotation": "python", "to_label": "LANGUAGE"},
                    {"annotation": "Rust", "from_labels": ["SKILL"], "to_label": null}
                ]),
            ),
        )
        .unwrap();

    let labels: Vec<Vec<&str>> = train
        .examples()
        .iter()
        .map(|e| e.labels().collect())
        .collect();
    assert_eq!(labels, vec![vec!["LANGUAGE"], vec![]]);

    let kwargs = &train.operations()[0].kwargs;
    assert_eq!(kwargs["case_sensitive"], json!(false));
    assert_eq!(kwargs["corrections"][0]["from_labels"], json!(["ANY"]));
}

// =============================================================================
// Failure Handling Tests
// =============================================================================

#[test]
fn test_propagate_failure_is_atomic() {
    register_test_operations();
    let mut train = Dataset::new("train", five_examples());
    train
        .apply_in_place("recon.v1.upcase_labels", &CallArgs::new())
        .unwrap();

    let examples_before = train.examples().to_vec();
    let history_before = train.operations().len();
    let commit_before = train.commit_hash().clone();

    let err = train
        .apply_in_place(FAIL_EXAMPLE_3, &CallArgs::new())
        .unwrap_err();

    assert!(matches!(err, ReconError::ExampleFailed { index: 2, .. }));
    assert_eq!(train.examples(), examples_before.as_slice());
    assert_eq!(train.operations().len(), history_before);
    assert_eq!(train.commit_hash(), &commit_before);
}

#[test]
fn test_drop_failure_removes_example() {
    let op = Operation::per_example("test.v1.reject_rust", |example, _, _| {
        if example.text.contains("Rust") {
            Err(ReconError::operation("no rust allowed"))
        } else {
            Ok(example.into())
        }
    });

    let mut train = Dataset::new("train", jobs());
    let rust = train.examples()[1].hash();
    train.apply_in_place(op, &CallArgs::new()).unwrap();

    assert_eq!(train.len(), 1);
    let record = &train.operations()[0];
    assert_eq!(record.examples_removed, 1);
    assert_eq!(record.transformations[0].prev_example_hash, Some(rust));
}

#[test]
fn test_record_failure_keeps_examples() {
    let op = Operation::dataset("test.v1.broken", |_, _| Err(ReconError::operation("broken")))
        .with_failure_policy(FailurePolicy::Record);

    let mut train = Dataset::new("train", jobs());
    assert!(train.apply_in_place(op, &CallArgs::new()).is_err());

    assert_eq!(train.len(), 2);
    assert_eq!(train.operations().len(), 1);
    assert_eq!(train.operations()[0].status, OperationStatus::Failed);
}

#[test]
fn test_argument_errors_are_structured() {
    let mut train = Dataset::new("train", jobs());
    let err = train
        .apply_in_place(
            "recon.v1.fix_annotations",
            &CallArgs::new().kwarg("corrections", json!([{"to_label": "X"}])),
        )
        .unwrap_err();

    match err {
        ReconError::ArgumentResolution { operation, errors } => {
            assert_eq!(operation, "recon.v1.fix_annotations");
            assert_eq!(errors.len(), 1);
            assert_eq!(errors[0].param, "corrections");
            assert_eq!(errors[0].path, "[0].annotation");
            assert_eq!(errors[0].message, "field required");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(train.operations().is_empty());
}

#[test]
fn test_out_of_range_augmentation_args_rejected_before_running() {
    for (key, value) in [("sub_prob", json!(1.5)), ("n_augs", json!(-1))] {
        let mut train = Dataset::new("train", jobs());
        let before = train.clone();

        let err = train
            .apply_in_place(
                "recon.v1.augment.ent_label_sub",
                &CallArgs::new()
                    .kwarg("label", "SKILL")
                    .kwarg("subs", json!(["C"]))
                    .kwarg(key, value),
            )
            .unwrap_err();

        match err {
            ReconError::ArgumentResolution { errors, .. } => assert_eq!(errors[0].param, key),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(train, before);
        assert!(train.operations().is_empty());
    }
}

// =============================================================================
// Argument Defaulting Tests
// =============================================================================

#[test]
fn test_list_default_is_fresh_per_call() {
    register_test_operations();
    let mut train = Dataset::new("train", jobs());

    train
        .apply_in_place(COLLECT_SEEN, &CallArgs::new())
        .unwrap();
    assert_eq!(train.examples()[0].meta["seen"], json!(1));

    // A second call starts again from an empty list
    let preview = train.apply_op(COLLECT_SEEN, &CallArgs::new()).unwrap();
    assert_eq!(preview[0].meta["seen"], json!(1));

    for record in train.operations() {
        assert_eq!(record.kwargs["seen"], json!([]));
        assert!(record.args.is_empty());
    }
}

// =============================================================================
// Rollback and Audit Tests
// =============================================================================

#[test]
fn test_rollback_after_augmentation() {
    let mut train = Dataset::new("train", jobs());
    let initial = train.clone();

    train
        .apply_in_place(
            "recon.v1.augment.ent_label_sub",
            &CallArgs::new()
                .kwarg("label", "skill")
                .kwarg("subs", json!(["Go", "Haskell"]))
                .kwarg("n_augs", 2)
                .kwarg("sub_prob", 1.0),
        )
        .unwrap();
    assert!(train.len() > initial.len());
    assert!(train.operations()[0].examples_added > 0);

    train.rollback(1).unwrap();
    assert_eq!(train, initial);
}

#[test]
fn test_history_csv_has_row_per_transformation() {
    let mut train = Dataset::new("train", five_examples());
    train
        .apply_in_place("recon.v1.upcase_labels", &CallArgs::new())
        .unwrap();

    let dir = tempfile::TempDir::new().unwrap();
    let rows = train
        .export_history_csv(dir.path().join("audit").join("history.csv"))
        .unwrap();
    assert_eq!(rows, 5);
}

#[test]
fn test_split_outcome_positions() {
    let op = Operation::per_example("test.v1.split_words", |example, _, _| {
        let words: Vec<Example> = example
            .text
            .split(' ')
            .map(|w| Example::new(w, vec![]))
            .collect();
        Ok(Outcome::Many(words))
    });

    let train = Dataset::new("train", jobs());
    let split = train.apply_op(op, &CallArgs::new()).unwrap();
    let texts: Vec<&str> = split.iter().map(|e| e.text.as_str()).collect();
    assert_eq!(texts, vec!["Python", "developer", "Rust", "engineer"]);
}
