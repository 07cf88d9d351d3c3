//! Deterministic content hashing for examples, spans, tokens and datasets.
//!
//! Hashes are built by feeding a length-prefixed, tagged encoding of each semantic field into
//! SHA-256, in a fixed field order. Nothing process-dependent (addresses, insertion order of
//! maps, timestamps) takes part, so the same content hashes the same across runs. This matters
//! because example hashes are the cross-reference keys of persisted history.
//!
//! Example hashes keep the first 8 bytes of the digest. Two different examples colliding on
//! 64 bits are treated as the same example when resolving history.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::types::{Example, Span, Token};

/// 64-bit content hash of an example (or span / token).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExampleHash(u64);

impl ExampleHash {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ExampleHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hex SHA-256 fingerprint of a dataset name plus its current example hashes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitHash(String);

impl CommitHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for log lines.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for CommitHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for CommitHash {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Incremental hasher over the canonical field encoding.
pub struct ContentHasher {
    inner: Sha256,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self {
            inner: Sha256::new(),
        }
    }

    fn write_tagged(&mut self, tag: u8, bytes: &[u8]) {
        self.inner.update([tag]);
        self.inner.update((bytes.len() as u64).to_le_bytes());
        self.inner.update(bytes);
    }

    pub fn write_str(&mut self, value: &str) {
        self.write_tagged(b's', value.as_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.inner.update([b'u']);
        self.inner.update(value.to_le_bytes());
    }

    pub fn write_usize(&mut self, value: usize) {
        self.write_u64(value as u64);
    }

    fn write_none(&mut self) {
        self.inner.update([b'-']);
    }

    pub fn write_opt_usize(&mut self, value: Option<usize>) {
        match value {
            Some(v) => self.write_usize(v),
            None => self.write_none(),
        }
    }

    pub fn write_opt_str(&mut self, value: Option<&str>) {
        match value {
            Some(v) => self.write_str(v),
            None => self.write_none(),
        }
    }

    /// JSON values with object keys visited in sorted order.
    pub fn write_value(&mut self, value: &Value) {
        match value {
            Value::Null => self.inner.update([b'n']),
            Value::Bool(b) => self.inner.update([b'b', u8::from(*b)]),
            Value::Number(n) => self.write_tagged(b'#', n.to_string().as_bytes()),
            Value::String(s) => self.write_str(s),
            Value::Array(items) => {
                self.inner.update([b'[']);
                self.write_usize(items.len());
                for item in items {
                    self.write_value(item);
                }
            }
            Value::Object(map) => {
                self.inner.update([b'{']);
                self.write_usize(map.len());
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                for key in keys {
                    self.write_str(key);
                    self.write_value(&map[key.as_str()]);
                }
            }
        }
    }

    fn write_span(&mut self, span: &Span) {
        self.write_str(&span.text);
        self.write_usize(span.start);
        self.write_usize(span.end);
        self.write_str(&span.label);
        self.write_opt_usize(span.token_start);
        self.write_opt_usize(span.token_end);
        self.write_opt_str(span.kb_id.as_deref());
    }

    fn write_token(&mut self, token: &Token) {
        self.write_str(&token.text);
        self.write_usize(token.start);
        self.write_usize(token.end);
        self.write_usize(token.id);
    }

    pub fn finish(self) -> ExampleHash {
        let digest = self.inner.finalize();
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        ExampleHash(u64::from_be_bytes(prefix))
    }

    pub fn finish_hex(self) -> String {
        format!("{:x}", self.inner.finalize())
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Hash of an example: text, spans, tokens, then meta in key order.
/// `formatted` and `data` do not take part.
pub fn example_hash(example: &Example) -> ExampleHash {
    let mut hasher = ContentHasher::new();
    hasher.write_str(&example.text);

    hasher.write_usize(example.spans.len());
    for span in &example.spans {
        hasher.write_span(span);
    }

    match &example.tokens {
        Some(tokens) => {
            hasher.write_usize(tokens.len());
            for token in tokens {
                hasher.write_token(token);
            }
        }
        None => hasher.write_none(),
    }

    // BTreeMap iterates in key order
    hasher.write_usize(example.meta.len());
    for (key, value) in &example.meta {
        hasher.write_str(key);
        hasher.write_value(value);
    }

    hasher.finish()
}

pub fn span_hash(span: &Span) -> ExampleHash {
    let mut hasher = ContentHasher::new();
    hasher.write_span(span);
    hasher.finish()
}

pub fn token_hash(token: &Token) -> ExampleHash {
    let mut hasher = ContentHasher::new();
    hasher.write_token(token);
    hasher.finish()
}

/// Commit hash of a dataset named `name` holding `examples`, in order.
pub fn dataset_hash<'a>(name: &str, examples: impl IntoIterator<Item = &'a Example>) -> CommitHash {
    let mut hasher = ContentHasher::new();
    hasher.write_str(name);
    for example in examples {
        hasher.write_u64(example.hash().as_u64());
    }
    CommitHash(hasher.finish_hex())
}
