//! Segments: bounded, append-only shards of an index's doc-id space.
//!
//! A segment is either resident (mutable, in-memory structures) or
//! disk-backed (immutable, served through its value logs and offset index).
//! The transition between the two is the one-shot [`Segment::seal`].

pub mod field;
pub mod invert;
pub mod profile;

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::analysis::Tokenizer;
use crate::document::Document;
use crate::error::{Result, XiphosError};
use crate::query::{Filter, TermQuery};
use crate::schema::FieldKind;
use crate::storage::{OffsetIndex, ValueLog};
use crate::util::bitmap::{intersect_all, union_all};
use crate::util::DocIdSet;

pub use field::Field;
pub use profile::Profile;

/// File holding a segment's metadata record.
const META_FILE: &str = "seg.meta";

/// File holding all offset-index partitions of a segment.
const BTREE_FILE: &str = "seg.bt";

/// File holding the forward store's value log.
const PROFILE_FILE: &str = "_profile.dtl";

/// Persisted segment metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentMeta {
    /// Segment name (also its directory name).
    pub name: String,
    /// First doc id owned by the segment.
    pub start_doc_id: u64,
    /// Exclusive upper bound of the owned doc-id range.
    pub max_doc_id: u64,
    /// Field kinds frozen at segment creation.
    pub fields: HashMap<String, FieldKind>,
}

/// A contiguous, bounded doc-id range with one field per indexed column and
/// one forward store.
pub struct Segment {
    name: String,
    dir: PathBuf,
    start_doc_id: u64,
    max_doc_id: u64,
    field_kinds: HashMap<String, FieldKind>,
    fields: HashMap<String, Field>,
    profile: Profile,
    resident: bool,
    tokenizer: Arc<dyn Tokenizer>,
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("name", &self.name)
            .field("start_doc_id", &self.start_doc_id)
            .field("max_doc_id", &self.max_doc_id)
            .field("resident", &self.resident)
            .finish()
    }
}

impl Segment {
    /// Create an empty resident segment.
    ///
    /// `dir` is the segment's own directory; nothing is written to disk
    /// until the seal.
    pub fn create(
        dir: PathBuf,
        name: &str,
        start_doc_id: u64,
        field_kinds: &HashMap<String, FieldKind>,
        tokenizer: Arc<dyn Tokenizer>,
    ) -> Self {
        let fields = field_kinds
            .iter()
            .map(|(field_name, kind)| {
                (
                    field_name.clone(),
                    Field::new(field_name, *kind, start_doc_id, tokenizer.clone()),
                )
            })
            .collect();
        Segment {
            name: name.to_string(),
            dir,
            start_doc_id,
            max_doc_id: start_doc_id,
            field_kinds: field_kinds.clone(),
            fields,
            profile: Profile::new(start_doc_id),
            resident: true,
            tokenizer,
        }
    }

    /// Open a sealed segment from its directory.
    pub fn open(dir: PathBuf, tokenizer: Arc<dyn Tokenizer>) -> Result<Self> {
        let meta_bytes = fs::read(dir.join(META_FILE))?;
        let meta: SegmentMeta = serde_json::from_slice(&meta_bytes)?;
        let btree = Arc::new(RwLock::new(OffsetIndex::open(dir.join(BTREE_FILE))?));

        let mut fields = HashMap::new();
        for (field_name, kind) in &meta.fields {
            let field = Field::open(
                field_name,
                *kind,
                meta.start_doc_id,
                meta.max_doc_id,
                &dir,
                btree.clone(),
                tokenizer.clone(),
            )?;
            fields.insert(field_name.clone(), field);
        }

        let profile_log = ValueLog::open(dir.join(PROFILE_FILE))?;
        let profile = Profile::open(meta.start_doc_id, meta.max_doc_id, profile_log, btree);

        Ok(Segment {
            name: meta.name,
            dir,
            start_doc_id: meta.start_doc_id,
            max_doc_id: meta.max_doc_id,
            field_kinds: meta.fields,
            fields,
            profile,
            resident: false,
            tokenizer,
        })
    }

    /// Rebuild a resident segment from a sealed, partially-filled one by
    /// replaying its forward store through the normal append path.
    pub fn reload(disk: Segment) -> Result<Self> {
        let mut resident = Segment::create(
            disk.dir.clone(),
            &disk.name,
            disk.start_doc_id,
            &disk.field_kinds,
            disk.tokenizer.clone(),
        );
        for doc_id in disk.start_doc_id..disk.max_doc_id {
            match disk.get_document(doc_id)? {
                Some(doc) => resident.add_document(doc_id, &doc)?,
                None => {
                    return Err(XiphosError::storage(format!(
                        "segment {} is missing doc id {doc_id} during reload",
                        disk.name
                    )));
                }
            }
        }
        Ok(resident)
    }

    /// Segment name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// First doc id owned by this segment.
    pub fn start_doc_id(&self) -> u64 {
        self.start_doc_id
    }

    /// Exclusive upper bound of the owned doc-id range.
    pub fn max_doc_id(&self) -> u64 {
        self.max_doc_id
    }

    /// Check whether the segment owns a doc id.
    pub fn contains(&self, doc_id: u64) -> bool {
        doc_id >= self.start_doc_id && doc_id < self.max_doc_id
    }

    /// Number of documents appended so far.
    pub fn doc_count(&self) -> u64 {
        self.max_doc_id - self.start_doc_id
    }

    /// Check whether the segment has accepted no documents.
    pub fn is_empty(&self) -> bool {
        self.start_doc_id == self.max_doc_id
    }

    /// Check whether the segment still accepts appends.
    pub fn is_resident(&self) -> bool {
        self.resident
    }

    /// Append a document.
    ///
    /// Every field present in the document is indexed; per-field failures
    /// are logged and skipped. The forward-store write is the commit point:
    /// its failure aborts the document and `max_doc_id` does not advance.
    pub fn add_document(&mut self, doc_id: u64, doc: &Document) -> Result<()> {
        if !self.resident {
            return Err(XiphosError::invalid(format!(
                "segment {} is sealed and read-only",
                self.name
            )));
        }
        if doc_id != self.max_doc_id {
            return Err(XiphosError::OutOfOrder {
                expected: self.max_doc_id,
                got: doc_id,
            });
        }
        for (field_name, field) in &mut self.fields {
            let outcome = match doc.get_field(field_name) {
                Some(value) => field.add_document(doc_id, value),
                None => field.skip_document(doc_id),
            };
            if let Err(e) = outcome {
                warn!(
                    segment = %self.name,
                    field = %field_name,
                    doc_id,
                    error = %e,
                    "field not indexed for document"
                );
            }
        }
        self.profile.add_document(doc_id, doc)?;
        self.max_doc_id += 1;
        Ok(())
    }

    /// Flush every field and the forward store to disk and flip the segment
    /// to its immutable form. One-shot.
    pub fn seal(&mut self) -> Result<()> {
        if !self.resident {
            return Err(XiphosError::invalid(format!(
                "segment {} is already sealed",
                self.name
            )));
        }
        debug!(segment = %self.name, docs = self.doc_count(), "sealing segment");
        fs::create_dir_all(&self.dir)?;

        let mut btree = OffsetIndex::create(self.dir.join(BTREE_FILE));
        for field in self.fields.values_mut() {
            field.seal(&self.dir, &mut btree)?;
        }
        self.profile.seal(&self.dir.join(PROFILE_FILE), &mut btree)?;
        btree.commit()?;

        let btree = Arc::new(RwLock::new(btree));
        for field in self.fields.values_mut() {
            field.attach_btree(btree.clone());
        }
        self.profile.attach_btree(btree);

        self.store_meta()?;
        self.resident = false;
        Ok(())
    }

    /// Fetch a document owned by this segment.
    pub fn get_document(&self, doc_id: u64) -> Result<Option<Document>> {
        if !self.contains(doc_id) {
            return Ok(None);
        }
        self.profile.get(doc_id)
    }

    /// Replace the stored form of a document (see [`Profile::update`]).
    pub fn update_document(&mut self, doc_id: u64, doc: &Document) -> Result<()> {
        if !self.contains(doc_id) {
            return Err(XiphosError::not_found(format!("doc id {doc_id}")));
        }
        self.profile.update(doc_id, doc)
    }

    /// Add a field. Permitted only while the segment is resident and empty.
    pub fn add_field(&mut self, name: &str, kind: FieldKind) -> Result<()> {
        if self.field_kinds.contains_key(name) {
            return Err(XiphosError::schema(format!("field {name} already exists")));
        }
        if !self.resident || !self.is_empty() {
            return Err(XiphosError::invalid(format!(
                "segment {} has accepted documents; roll over before changing its schema",
                self.name
            )));
        }
        self.field_kinds.insert(name.to_string(), kind);
        self.fields.insert(
            name.to_string(),
            Field::new(name, kind, self.start_doc_id, self.tokenizer.clone()),
        );
        Ok(())
    }

    /// Remove a field. Permitted only while the segment is resident and
    /// empty.
    pub fn remove_field(&mut self, name: &str) -> Result<()> {
        if !self.field_kinds.contains_key(name) {
            return Err(XiphosError::schema(format!("field {name} does not exist")));
        }
        if !self.resident || !self.is_empty() {
            return Err(XiphosError::invalid(format!(
                "segment {} has accepted documents; roll over before changing its schema",
                self.name
            )));
        }
        self.field_kinds.remove(name);
        self.fields.remove(name);
        Ok(())
    }

    /// Evaluate a query with filters against this segment, excluding
    /// tombstoned doc ids.
    pub fn search(
        &self,
        query: &TermQuery,
        filters: &[Filter],
        tombstones: &DocIdSet,
    ) -> Result<DocIdSet> {
        let keyword_set = if query.is_empty() {
            None
        } else {
            Some(self.eval(query)?)
        };
        let filter_set = self.eval_filters(filters)?;

        let mut result = match (keyword_set, filter_set) {
            (Some(mut keywords), Some(windowed)) => {
                keywords.intersect_with(&windowed);
                keywords
            }
            (Some(keywords), None) => keywords,
            (None, Some(windowed)) => windowed,
            // The distinguished empty query with no filters constrains
            // nothing: every owned doc id matches.
            (None, None) => (self.start_doc_id..self.max_doc_id).collect(),
        };

        for doc_id in tombstones.iter() {
            result.remove(doc_id);
        }
        Ok(result)
    }

    /// Materialize doc ids into documents through the forward store.
    pub fn materialize(&self, doc_ids: &DocIdSet) -> Result<Vec<Document>> {
        let mut docs = Vec::with_capacity(doc_ids.len() as usize);
        for doc_id in doc_ids.iter() {
            if let Some(doc) = self.get_document(doc_id)? {
                docs.push(doc);
            }
        }
        Ok(docs)
    }

    /// Remove the segment's files from disk.
    pub fn destroy(&self) -> Result<()> {
        if self.dir.exists() {
            fs::remove_dir_all(&self.dir)?;
        }
        Ok(())
    }

    /// Recurse over the query tree. A keyword leaf resolves through its
    /// field; Must intersects, Should unions; an empty node mid-tree is the
    /// empty set.
    fn eval(&self, query: &TermQuery) -> Result<DocIdSet> {
        if let Some(keyword) = &query.keyword {
            return match self.fields.get(&keyword.field) {
                Some(field) => Ok(field.query_term(&keyword.word)?.unwrap_or_default()),
                None => Ok(DocIdSet::new()),
            };
        }
        if !query.must.is_empty() {
            let sets = query
                .must
                .iter()
                .map(|sub| self.eval(sub))
                .collect::<Result<Vec<_>>>()?;
            return Ok(intersect_all(sets));
        }
        if !query.should.is_empty() {
            let sets = query
                .should
                .iter()
                .map(|sub| self.eval(sub))
                .collect::<Result<Vec<_>>>()?;
            return Ok(union_all(sets));
        }
        Ok(DocIdSet::new())
    }

    /// Intersect every filter's window result. Filters on unknown or
    /// non-numeric fields match nothing.
    fn eval_filters(&self, filters: &[Filter]) -> Result<Option<DocIdSet>> {
        let mut result: Option<DocIdSet> = None;
        for filter in filters {
            let set = match self.fields.get(&filter.field) {
                Some(field) => field.query_filter(filter)?.unwrap_or_default(),
                None => DocIdSet::new(),
            };
            match &mut result {
                Some(acc) => acc.intersect_with(&set),
                None => result = Some(set),
            }
        }
        Ok(result)
    }

    fn store_meta(&self) -> Result<()> {
        let meta = SegmentMeta {
            name: self.name.clone(),
            start_doc_id: self.start_doc_id,
            max_doc_id: self.max_doc_id,
            fields: self.field_kinds.clone(),
        };
        fs::write(self.dir.join(META_FILE), serde_json::to_vec(&meta)?)?;
        Ok(())
    }
}
