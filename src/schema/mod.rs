//! Field schema definitions.

use serde::{Deserialize, Serialize};

/// The closed set of field kinds an index supports.
///
/// The kind decides which inversion a field gets: text kinds build a term
/// inverted index, numeric kinds build a number inverted index, `PrimaryKey`
/// feeds the index-level key map, and `Stored` fields live only in the
/// forward store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    /// Text matched as a single whole term.
    ExactText,
    /// Text split into terms by the tokenizer collaborator.
    TokenizedText,
    /// Signed 64-bit integer.
    Integer,
    /// Floating point, indexed as 2-decimal fixed point.
    Float,
    /// Date literal, indexed as a Unix timestamp.
    Date,
    /// External primary key; one per index.
    PrimaryKey,
    /// Stored in the forward index only, never inverted.
    Stored,
}

impl FieldKind {
    /// Check whether the field builds a term inverted index.
    pub fn is_text(&self) -> bool {
        matches!(self, FieldKind::ExactText | FieldKind::TokenizedText)
    }

    /// Check whether the field builds a number inverted index.
    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldKind::Integer | FieldKind::Float | FieldKind::Date)
    }

    /// Check whether the field is inverted at all.
    pub fn is_indexed(&self) -> bool {
        self.is_text() || self.is_numeric()
    }
}

/// One schema entry: a field name bound to a kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Field name.
    pub name: String,
    /// Field kind.
    pub kind: FieldKind,
}

impl FieldSpec {
    /// Create a schema entry.
    pub fn new<S: Into<String>>(name: S, kind: FieldKind) -> Self {
        FieldSpec {
            name: name.into(),
            kind,
        }
    }
}
