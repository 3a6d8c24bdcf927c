//! The document model: canonical text derivation, tokenization, and the
//! typed attribute bag shared by filtering, BM25, and LSH.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

/// A typed attribute value in a document's metadata bag.
///
/// Kept as a small closed set of variants (rather than the flat
/// `HashMap<String, u32>` categorical-id model) so the filter predicates in
/// [`crate::metadata`] can match against the field's native shape instead of
/// requiring every caller to pre-encode strings into integers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Int(i64),
    Float(f64),
    Text(String),
    StringSet(Vec<String>),
    /// Days since the Unix epoch, so comparisons stay integer arithmetic.
    Date(i64),
}

/// A document as seen by the engine: a stable id, searchable text fields, and
/// a typed attribute bag for filtering and hydration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub content: String,
    pub attributes: BTreeMap<String, AttributeValue>,
    /// Free-form fields the typed filters never touch but hydration should
    /// still return to the caller.
    pub extra: serde_json::Value,
}

impl Document {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Document {
            id: id.into(),
            title: String::new(),
            summary: String::new(),
            content: content.into(),
            attributes: BTreeMap::new(),
            extra: serde_json::Value::Null,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Deterministic concatenation of title, summary, and content used for
    /// display, hydration, and as the sole input to embedding/tokenization.
    /// Field order is fixed: title, then summary, then content.
    pub fn canonical_text(&self) -> String {
        let mut text = String::with_capacity(
            self.title.len() + self.summary.len() + self.content.len() + 2,
        );
        if !self.title.is_empty() {
            text.push_str(&self.title);
            text.push(' ');
        }
        if !self.summary.is_empty() {
            text.push_str(&self.summary);
            text.push(' ');
        }
        text.push_str(&self.content);
        text
    }

    /// The deduplicated token set used by LSH and BM25: tokens of the
    /// canonical text unioned with any `StringSet`/`Text` attribute values
    /// (already expected to be normalized single tokens, e.g. a skill list).
    pub fn token_set(&self) -> HashSet<String> {
        let mut tokens: HashSet<String> = tokenize(&self.canonical_text()).into_iter().collect();
        for value in self.attributes.values() {
            match value {
                AttributeValue::StringSet(items) => {
                    for item in items {
                        tokens.insert(item.to_lowercase());
                    }
                }
                AttributeValue::Text(text) => {
                    tokens.insert(text.to_lowercase());
                }
                _ => {}
            }
        }
        tokens
    }
}

/// Lowercase, strip punctuation, split on Unicode whitespace, drop empties.
///
/// Deterministic: two calls on the same string always return the same
/// sequence, which the LSH and BM25 indexes rely on to stay in agreement
/// with each other and with re-tokenization after an update.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|word| {
            word.chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|token| !token.is_empty())
        .collect()
}
