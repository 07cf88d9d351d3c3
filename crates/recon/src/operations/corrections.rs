//! Label corrections: renaming, relabeling or deleting spans by text, trimming span edges.
//!
//! None of these add annotations; they only fix or remove existing ones.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::operation::Operation;
use super::params::{Param, ParamType};
use crate::error::{ReconError, Result};
use crate::types::{Example, char_slice};

pub const RENAME_LABELS: &str = "recon.v1.rename_labels";
pub const FIX_ANNOTATIONS: &str = "recon.v1.fix_annotations";
pub const STRIP_ANNOTATIONS: &str = "recon.v1.strip_annotations";

/// Wildcard accepted in `Correction::from_labels`.
pub const ANY_LABEL: &str = "ANY";

/// Relabel (or delete, when `to_label` is `None`) spans whose text is `annotation`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correction {
    pub annotation: String,
    #[serde(default = "any_label")]
    pub from_labels: Vec<String>,
    #[serde(default)]
    pub to_label: Option<String>,
}

fn any_label() -> Vec<String> {
    vec![ANY_LABEL.to_string()]
}

impl Correction {
    pub fn new(annotation: impl Into<String>, to_label: Option<&str>) -> Self {
        Self {
            annotation: annotation.into(),
            from_labels: any_label(),
            to_label: to_label.map(str::to_string),
        }
    }

    pub fn with_from_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.from_labels = labels.into_iter().map(Into::into).collect();
        self
    }

    fn applies_to(&self, label: &str) -> bool {
        self.from_labels.iter().any(|l| l == label || l == ANY_LABEL)
    }
}

/// Parameter schema of a single [`Correction`].
pub fn correction_param_type() -> ParamType {
    ParamType::Record(vec![
        Param::required("annotation", ParamType::Str),
        Param::optional("from_labels", ParamType::list(ParamType::Str), json!([ANY_LABEL])),
        Param::optional("to_label", ParamType::optional(ParamType::Str), Value::Null),
    ])
}

/// Build corrections from the short-hand form.
///
/// Each value is either the label to convert to (`null` deletes), or a two element array
/// `[from_labels, to_label]` where `from_labels` is a label or a list of labels:
///
/// ```
/// use recon::operations::corrections::corrections_from_dict;
/// use serde_json::json;
///
/// let map = json!({"united states": "GPE", "London": [["LOC"], "GPE"], "the": null});
/// let corrections = corrections_from_dict(map.as_object().unwrap()).unwrap();
/// assert_eq!(corrections.len(), 3);
/// let london = corrections.iter().find(|c| c.annotation == "London").unwrap();
/// assert_eq!(london.from_labels, vec!["LOC"]);
/// ```
pub fn corrections_from_dict(map: &serde_json::Map<String, Value>) -> Result<Vec<Correction>> {
    map.iter()
        .map(|(annotation, value)| {
            let (from_labels, to_label) = match value {
                Value::Null => (any_label(), None),
                Value::String(to) => (any_label(), Some(to.clone())),
                Value::Array(pair) if pair.len() == 2 => {
                    let from = match &pair[0] {
                        Value::String(label) => vec![label.clone()],
                        other => serde_json::from_value(other.clone()).map_err(|_| {
                            invalid_correction(annotation)
                        })?,
                    };
                    let to = match &pair[1] {
                        Value::Null => None,
                        Value::String(label) => Some(label.clone()),
                        _ => return Err(invalid_correction(annotation)),
                    };
                    (from, to)
                }
                _ => return Err(invalid_correction(annotation)),
            };
            Ok(Correction {
                annotation: annotation.clone(),
                from_labels,
                to_label,
            })
        })
        .collect()
}

fn invalid_correction(annotation: &str) -> ReconError {
    ReconError::operation(format!(
        "cannot parse correction for '{annotation}': value must be a label or a [from_labels, to_label] pair"
    ))
}

/// Rename span labels through a one-to-one mapping. Unmapped labels are kept.
pub fn rename_labels(mut example: Example, label_map: &HashMap<String, String>) -> Example {
    for span in &mut example.spans {
        if let Some(to) = label_map.get(&span.label) {
            span.label = to.clone();
        }
    }
    example
}

/// Apply `corrections` to the spans of `example`.
///
/// Spans are matched on their text (lowercased unless `case_sensitive`). When several corrections
/// share an annotation, the last one wins.
pub fn fix_annotations(
    mut example: Example,
    corrections: &[Correction],
    case_sensitive: bool,
) -> Example {
    let key = |text: &str| {
        if case_sensitive {
            text.to_string()
        } else {
            text.to_lowercase()
        }
    };
    let by_text: HashMap<String, &Correction> =
        corrections.iter().map(|c| (key(&c.annotation), c)).collect();

    let mut spans = Vec::with_capacity(example.spans.len());
    for mut span in std::mem::take(&mut example.spans) {
        match by_text.get(&key(&span.text)) {
            Some(c) if c.applies_to(&span.label) => match &c.to_label {
                Some(to) => {
                    span.label = to.clone();
                    spans.push(span);
                }
                None => {}
            },
            _ => spans.push(span),
        }
    }
    example.spans = spans;
    example
}

/// Trim `strip_chars` from both edges of every span. A span is never trimmed to nothing.
pub fn strip_annotations(mut example: Example, strip_chars: &BTreeSet<char>) -> Example {
    for span in &mut example.spans {
        let text = if span.text.is_empty() {
            match char_slice(&example.text, span.start, span.end) {
                Some(text) => text,
                None => continue,
            }
        } else {
            span.text.clone()
        };

        let chars: Vec<char> = text.chars().collect();
        let mut lo = 0;
        let mut hi = chars.len();
        while hi - lo > 1 && strip_chars.contains(&chars[lo]) {
            lo += 1;
        }
        while hi - lo > 1 && strip_chars.contains(&chars[hi - 1]) {
            hi -= 1;
        }

        if lo > 0 || hi < chars.len() {
            span.start += lo;
            span.end = span.start + (hi - lo);
            span.text = chars[lo..hi].iter().collect();
        }
    }
    example
}

pub(crate) fn operations() -> Vec<Operation> {
    vec![
        Operation::per_example(RENAME_LABELS, |example, args, _| {
            let label_map: HashMap<String, String> = args.get("label_map")?;
            Ok(rename_labels(example, &label_map).into())
        })
        .with_param(Param::required("label_map", ParamType::map(ParamType::Str))),
        Operation::per_example(FIX_ANNOTATIONS, |example, args, _| {
            let corrections: Vec<Correction> = args.get("corrections")?;
            let case_sensitive: bool = args.get("case_sensitive")?;
            Ok(fix_annotations(example, &corrections, case_sensitive).into())
        })
        .with_param(Param::required(
            "corrections",
            ParamType::list(correction_param_type()),
        ))
        .with_param(Param::optional("case_sensitive", ParamType::Bool, false)),
        Operation::per_example(STRIP_ANNOTATIONS, |example, args, _| {
            let strip: Vec<String> = args.get("strip_chars")?;
            let strip: BTreeSet<char> = strip.iter().flat_map(|s| s.chars()).collect();
            Ok(strip_annotations(example, &strip).into())
        })
        .with_param(Param::optional(
            "strip_chars",
            ParamType::list(ParamType::Str),
            json!([".", "!", "?", "-", ":", " "]),
        ))
        .with_handles_tokens(false),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Span;
    use indexmap::IndexMap;

    fn labels_by_text(example: &Example) -> IndexMap<String, String> {
        example
            .spans
            .iter()
            .map(|s| (s.text.clone(), s.label.clone()))
            .collect()
    }

    fn job_posting() -> Example {
        Example::new(
            "Python developer with SQL in London",
            vec![
                Span::new("Python", 0, 6, "SKILL"),
                Span::new("SQL", 22, 25, "JOB_ROLE"),
                Span::new("London", 29, 35, "LOC"),
            ],
        )
    }

    #[test]
    fn test_rename_labels() {
        let map = HashMap::from([("LOC".to_string(), "GPE".to_string())]);
        let renamed = rename_labels(job_posting(), &map);
        assert_eq!(labels_by_text(&renamed)["London"], "GPE");
        assert_eq!(labels_by_text(&renamed)["Python"], "SKILL");
    }

    #[test]
    fn test_fix_annotations_relabels_and_deletes() {
        let corrections = vec![
            Correction::new("sql", Some("SKILL")),
            Correction::new("python", None),
            Correction::new("London", Some("GPE")).with_from_labels(["ORG"]),
        ];

        let fixed = fix_annotations(job_posting(), &corrections, false);
        let labels = labels_by_text(&fixed);
        assert_eq!(labels.len(), 2);
        assert_eq!(labels["SQL"], "SKILL");
        // from_labels did not match
        assert_eq!(labels["London"], "LOC");
    }

    #[test]
    fn test_fix_annotations_case_sensitive() {
        let corrections = vec![Correction::new("sql", Some("SKILL"))];
        let fixed = fix_annotations(job_posting(), &corrections, true);
        assert_eq!(labels_by_text(&fixed)["SQL"], "JOB_ROLE");
    }

    #[test]
    fn test_corrections_from_dict_rejects_bad_values() {
        let map = json!({"x": 3});
        assert!(corrections_from_dict(map.as_object().unwrap()).is_err());

        let map = json!({"x": ["LOC", "GPE"], "y": null});
        let corrections = corrections_from_dict(map.as_object().unwrap()).unwrap();
        assert_eq!(corrections[0].from_labels, vec!["LOC"]);
        assert_eq!(corrections[0].to_label.as_deref(), Some("GPE"));
        assert_eq!(corrections[1], Correction::new("y", None));
    }

    #[test]
    fn test_strip_annotations() {
        let example = Example::new(
            "Use Rust. Or -Go",
            vec![Span::new("Rust.", 4, 9, "SKILL"), Span::new(" -Go", 12, 16, "SKILL")],
        );
        let strip: BTreeSet<char> = ['.', '-', ' '].into_iter().collect();

        let stripped = strip_annotations(example, &strip);
        assert_eq!(stripped.spans[0], Span::new("Rust", 4, 8, "SKILL"));
        assert_eq!(stripped.spans[1], Span::new("Go", 14, 16, "SKILL"));
    }

    #[test]
    fn test_strip_never_empties_span() {
        let example = Example::new("...", vec![Span::new("...", 0, 3, "X")]);
        let strip: BTreeSet<char> = ['.'].into_iter().collect();
        let stripped = strip_annotations(example, &strip);
        assert_eq!(stripped.spans[0].text, ".");
        assert_eq!(stripped.spans[0].len(), 1);
    }
}
