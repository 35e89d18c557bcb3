//! Document model and the binary codec used by the forward store.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, XiphosError};

/// A document submitted to an index.
///
/// The `id` is the external primary key; `content` maps field names to raw
/// string values. Typed interpretation of a value (term splitting, numeric
/// or date parsing) happens per field according to the index schema, not
/// here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// External primary key.
    pub id: String,
    /// Raw field values keyed by field name.
    content: HashMap<String, String>,
}

impl Document {
    /// Create a new empty document with the given primary key.
    pub fn new<S: Into<String>>(id: S) -> Self {
        Document {
            id: id.into(),
            content: HashMap::new(),
        }
    }

    /// Set a field value, returning the document for chained construction.
    pub fn with_field<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.content.insert(name.into(), value.into());
        self
    }

    /// Set a field value.
    pub fn set_field<K: Into<String>, V: Into<String>>(&mut self, name: K, value: V) {
        self.content.insert(name.into(), value.into());
    }

    /// Get a field value.
    pub fn get_field(&self, name: &str) -> Option<&str> {
        self.content.get(name).map(|v| v.as_str())
    }

    /// Check whether the document carries a value for a field.
    pub fn has_field(&self, name: &str) -> bool {
        self.content.contains_key(name)
    }

    /// Raw field values.
    pub fn content(&self) -> &HashMap<String, String> {
        &self.content
    }

    /// Number of field values.
    pub fn len(&self) -> usize {
        self.content.len()
    }

    /// Check whether the document carries no field values.
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// Encode a document for the forward store.
///
/// The byte form is an opaque codec boundary: callers only ever hand these
/// bytes back to [`decode`].
pub fn encode(doc: &Document) -> Result<Vec<u8>> {
    bincode::serialize(doc)
        .map_err(|e| XiphosError::serialization(format!("failed to encode document: {e}")))
}

/// Decode a document previously produced by [`encode`].
pub fn decode(bytes: &[u8]) -> Result<Document> {
    bincode::deserialize(bytes)
        .map_err(|e| XiphosError::serialization(format!("failed to decode document: {e}")))
}

/// A term and its relative frequency within one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyWord {
    /// The term.
    pub word: String,
    /// Term count divided by the total number of terms.
    pub tf: f32,
}

/// Compute term-frequency metadata for a tokenized value.
///
/// No scoring is built on this; it is exposed for callers that want TF
/// metadata alongside their documents.
pub fn term_frequencies(terms: &[String]) -> Vec<KeyWord> {
    let mut counts: HashMap<&str, u32> = HashMap::new();
    for term in terms {
        *counts.entry(term.as_str()).or_insert(0) += 1;
    }
    let total = terms.len() as f32;
    counts
        .into_iter()
        .map(|(word, count)| KeyWord {
            word: word.to_string(),
            tf: count as f32 / total,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_fields() {
        let doc = Document::new("a")
            .with_field("name", "alice")
            .with_field("age", "30");

        assert_eq!(doc.id, "a");
        assert_eq!(doc.get_field("name"), Some("alice"));
        assert_eq!(doc.get_field("missing"), None);
        assert!(doc.has_field("age"));
        assert_eq!(doc.len(), 2);
    }

    #[test]
    fn test_codec_round_trip() {
        let doc = Document::new("k1")
            .with_field("title", "hello world")
            .with_field("count", "42");

        let bytes = encode(&doc).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(doc, decoded);
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(decode(&[0xFF, 0x01]).is_err());
    }

    #[test]
    fn test_term_frequencies() {
        let terms: Vec<String> = ["b", "a", "b", "b"].iter().map(|s| s.to_string()).collect();
        let mut keywords = term_frequencies(&terms);
        keywords.sort_by(|l, r| l.word.cmp(&r.word));

        assert_eq!(keywords.len(), 2);
        assert_eq!(keywords[0].word, "a");
        assert!((keywords[0].tf - 0.25).abs() < f32::EPSILON);
        assert_eq!(keywords[1].word, "b");
        assert!((keywords[1].tf - 0.75).abs() < f32::EPSILON);
    }
}
