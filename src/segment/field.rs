//! A schema field bound to its inversion.

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::analysis::Tokenizer;
use crate::error::{Result, XiphosError};
use crate::query::Filter;
use crate::schema::FieldKind;
use crate::storage::{OffsetIndex, ValueLog};
use crate::util::DocIdSet;

use super::invert::{NumberInvert, TextInvert};

/// One column of a segment: a field name, its kind, and the matching
/// inverted index.
///
/// Text kinds bind a [`TextInvert`], numeric kinds a [`NumberInvert`];
/// `Stored` fields bind neither and only exist in the forward store. The
/// field advances its own append cursor in lockstep with the owning
/// segment's doc-id progression.
pub struct Field {
    name: String,
    kind: FieldKind,
    start_doc_id: u64,
    cursor: u64,
    text: Option<TextInvert>,
    number: Option<NumberInvert>,
}

impl std::fmt::Debug for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("start_doc_id", &self.start_doc_id)
            .field("cursor", &self.cursor)
            .finish()
    }
}

impl Field {
    /// Create an empty resident field.
    pub fn new(
        name: &str,
        kind: FieldKind,
        start_doc_id: u64,
        tokenizer: Arc<dyn Tokenizer>,
    ) -> Self {
        let mut field = Field {
            name: name.to_string(),
            kind,
            start_doc_id,
            cursor: start_doc_id,
            text: None,
            number: None,
        };
        if kind.is_text() {
            field.text = Some(TextInvert::new(name, kind, start_doc_id, tokenizer));
        } else if kind.is_numeric() {
            field.number = Some(NumberInvert::new(name, kind, start_doc_id));
        }
        field
    }

    /// Open the sealed on-disk representation of a field.
    ///
    /// The field's value log lives at `<dir>/<name>_invert.idx`; `Stored`
    /// fields have no log and nothing to open.
    pub fn open(
        name: &str,
        kind: FieldKind,
        start_doc_id: u64,
        max_doc_id: u64,
        dir: &Path,
        btree: Arc<RwLock<OffsetIndex>>,
        tokenizer: Arc<dyn Tokenizer>,
    ) -> Result<Self> {
        let mut field = Field {
            name: name.to_string(),
            kind,
            start_doc_id,
            cursor: max_doc_id,
            text: None,
            number: None,
        };
        if kind.is_indexed() {
            let log = ValueLog::open(dir.join(format!("{name}_invert.idx")))?;
            if kind.is_text() {
                field.text = Some(TextInvert::open(
                    name, kind, max_doc_id, log, btree, tokenizer,
                ));
            } else {
                field.number = Some(NumberInvert::open(name, kind, max_doc_id, log, btree));
            }
        }
        Ok(field)
    }

    /// Field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Field kind.
    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    /// Route a document's value for this field into the inversion.
    pub fn add_document(&mut self, doc_id: u64, value: &str) -> Result<()> {
        if doc_id != self.cursor {
            return Err(XiphosError::OutOfOrder {
                expected: self.cursor,
                got: doc_id,
            });
        }
        if let Some(text) = &mut self.text {
            text.add_document(doc_id, value)?;
        } else if let Some(number) = &mut self.number {
            number.add_document(doc_id, value)?;
        }
        self.cursor += 1;
        Ok(())
    }

    /// Advance the cursor past a document that carries no value for this
    /// field, keeping it in lockstep with the segment.
    pub fn skip_document(&mut self, doc_id: u64) -> Result<()> {
        if doc_id != self.cursor {
            return Err(XiphosError::OutOfOrder {
                expected: self.cursor,
                got: doc_id,
            });
        }
        if let Some(text) = &mut self.text {
            text.skip_document(doc_id)?;
        } else if let Some(number) = &mut self.number {
            number.skip_document(doc_id)?;
        }
        self.cursor += 1;
        Ok(())
    }

    /// Exact-term lookup. Fields without a text inversion match nothing.
    pub fn query_term(&self, word: &str) -> Result<Option<DocIdSet>> {
        match &self.text {
            Some(text) => text.query_term(word),
            None => Ok(None),
        }
    }

    /// Apply a numeric window filter. Fields without a number inversion
    /// match nothing.
    pub fn query_filter(&self, filter: &Filter) -> Result<Option<DocIdSet>> {
        let Some(number) = &self.number else {
            return Ok(None);
        };
        let (min, max) = filter.window(self.kind);
        Ok(Some(number.query_range(min, max)?))
    }

    /// Flush the field's inversion into its value log. One-shot; `Stored`
    /// fields seal trivially.
    pub fn seal(&mut self, dir: &Path, btree: &mut OffsetIndex) -> Result<()> {
        let log_path = dir.join(format!("{}_invert.idx", self.name));
        if let Some(text) = &mut self.text {
            text.seal(&log_path, btree)?;
        } else if let Some(number) = &mut self.number {
            number.seal(&log_path, btree)?;
        }
        Ok(())
    }

    /// Hand the field the committed offset index of its segment.
    pub fn attach_btree(&mut self, btree: Arc<RwLock<OffsetIndex>>) {
        if let Some(text) = &mut self.text {
            text.attach_btree(btree);
        } else if let Some(number) = &mut self.number {
            number.attach_btree(btree);
        }
    }
}
