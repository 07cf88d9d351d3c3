//! Annotated NER examples.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::hashing::{self, ExampleHash};

/// Entity span inside an example. Offsets are character offsets into `Example::text`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    /// Covered text. Filled from the offsets by [`Example::format`] when missing.
    #[serde(default)]
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_start: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_end: Option<usize>,
    /// Knowledge base identifier of the linked entity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kb_id: Option<String>,
}

impl Span {
    /// Create a span without token offsets or kb link.
    pub fn new(text: impl Into<String>, start: usize, end: usize, label: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            start,
            end,
            label: label.into(),
            token_start: None,
            token_end: None,
            kb_id: None,
        }
    }

    /// Link the span to a knowledge base entity.
    pub fn with_kb_id(mut self, kb_id: impl Into<String>) -> Self {
        self.kb_id = Some(kb_id.into());
        self
    }

    /// Set the token offsets.
    pub fn with_tokens(mut self, token_start: usize, token_end: usize) -> Self {
        self.token_start = Some(token_start);
        self.token_end = Some(token_end);
        self
    }

    pub fn hash(&self) -> ExampleHash {
        hashing::span_hash(self)
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Token with offsets into the example text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub id: usize,
}

impl Token {
    pub fn new(text: impl Into<String>, start: usize, end: usize, id: usize) -> Self {
        Self {
            text: text.into(),
            start,
            end,
            id,
        }
    }

    pub fn hash(&self) -> ExampleHash {
        hashing::token_hash(self)
    }
}

/// One annotated text unit.
///
/// Equality and hashing are structural: `text`, `spans`, `tokens` and `meta` decide identity.
/// `formatted` and `data` are carried along but never hashed or compared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Example {
    pub text: String,

    #[serde(default)]
    pub spans: Vec<Span>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<Vec<Token>>,

    #[serde(
        default,
        deserialize_with = "deserialize_meta",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub meta: BTreeMap<String, Value>,

    /// Set once span texts have been filled from offsets.
    #[serde(default)]
    pub formatted: bool,

    /// Arbitrary attached payload.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl Example {
    pub fn new(text: impl Into<String>, spans: Vec<Span>) -> Self {
        Self {
            text: text.into(),
            spans,
            tokens: None,
            meta: BTreeMap::new(),
            formatted: false,
            data: Value::Null,
        }
    }

    pub fn with_tokens(mut self, tokens: Vec<Token>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    /// Content hash of this example.
    pub fn hash(&self) -> ExampleHash {
        hashing::example_hash(self)
    }

    /// Whether the example carries token information, either as a token list or as token
    /// offsets on its spans.
    pub fn has_tokens(&self) -> bool {
        self.tokens.as_ref().is_some_and(|t| !t.is_empty())
            || self
                .spans
                .iter()
                .any(|s| s.token_start.is_some() || s.token_end.is_some())
    }

    /// Fill missing span texts from their offsets and mark the example as formatted.
    pub fn format(&mut self) {
        if self.formatted {
            return;
        }
        for span in &mut self.spans {
            if span.text.is_empty() {
                if let Some(text) = char_slice(&self.text, span.start, span.end) {
                    span.text = text;
                }
            }
        }
        self.formatted = true;
    }

    /// Labels of all spans in order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.spans.iter().map(|s| s.label.as_str())
    }
}

impl PartialEq for Example {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
            && self.spans == other.spans
            && self.tokens == other.tokens
            && self.meta == other.meta
    }
}

/// Character-offset slice of `text`, `None` when out of range.
pub(crate) fn char_slice(text: &str, start: usize, end: usize) -> Option<String> {
    if start > end {
        return None;
    }
    let mut chars = text.chars();
    let slice: String = chars.by_ref().skip(start).take(end - start).collect();
    if slice.chars().count() == end - start {
        Some(slice)
    } else {
        None
    }
}

/// `meta` given as a bare string or list is stored under `source`.
fn deserialize_meta<'de, D>(deserializer: D) -> Result<BTreeMap<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Object(map) => map.into_iter().collect(),
        Value::Null => BTreeMap::new(),
        other => BTreeMap::from([("source".to_string(), other)]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_fills_span_text() {
        let mut example: Example = serde_json::from_value(json!({
            "text": "Python developer in Seattle",
            "spans": [{"start": 0, "end": 6, "label": "SKILL"}]
        }))
        .unwrap();

        assert_eq!(example.spans[0].text, "");
        example.format();
        assert_eq!(example.spans[0].text, "Python");
        assert!(example.formatted);
    }

    #[test]
    fn test_meta_string_becomes_source() {
        let example: Example = serde_json::from_value(json!({
            "text": "hi",
            "spans": [],
            "meta": "prodigy"
        }))
        .unwrap();

        assert_eq!(example.meta.get("source"), Some(&json!("prodigy")));
    }

    #[test]
    fn test_char_slice_multibyte() {
        assert_eq!(char_slice("café au lait", 0, 4).as_deref(), Some("café"));
        assert_eq!(char_slice("café", 2, 9), None);
    }

    #[test]
    fn test_has_tokens() {
        let plain = Example::new("a b", vec![Span::new("a", 0, 1, "X")]);
        assert!(!plain.has_tokens());

        let tokenized = plain
            .clone()
            .with_tokens(vec![Token::new("a", 0, 1, 0), Token::new("b", 2, 3, 1)]);
        assert!(tokenized.has_tokens());

        let span_offsets = Example::new("a b", vec![Span::new("a", 0, 1, "X").with_tokens(0, 1)]);
        assert!(span_offsets.has_tokens());
    }

    #[test]
    fn test_equality_ignores_volatile_fields() {
        let plain = Example::new("a", vec![]);
        let mut formatted = plain.clone().with_data(json!({"score": 1}));
        formatted.format();
        assert_eq!(plain, formatted);
        assert_ne!(plain, plain.clone().with_meta("source", "x"));
    }

    #[test]
    fn test_serialize_skips_empty_fields() {
        let example = Example::new("a", vec![]);
        let value = serde_json::to_value(&example).unwrap();

        assert_eq!(value, json!({"text": "a", "spans": [], "formatted": false}));
    }
}
