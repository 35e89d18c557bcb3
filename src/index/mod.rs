//! A named index: an ordered list of sealed segments, one active resident
//! segment, a primary-key map, and a tombstone set.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::analysis::Tokenizer;
use crate::config::IndexConfig;
use crate::document::Document;
use crate::error::{Result, XiphosError};
use crate::query::{Filter, TermQuery};
use crate::schema::{FieldKind, FieldSpec};
use crate::segment::Segment;
use crate::storage::{OffsetIndex, encode_str_key};
use crate::util::DocIdSet;

/// Persisted index metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexMeta {
    name: String,
    fields: HashMap<String, FieldKind>,
    primary_key: Option<String>,
    start_doc_id: u64,
    max_doc_id: u64,
    deleted_count: u64,
    next_segment_suffix: u64,
    segment_names: Vec<String>,
}

/// A named document collection.
///
/// Doc ids are assigned monotonically and never reused; every id in
/// `[0, max_doc_id)` belongs to exactly one segment by range containment.
/// Mutating operations take `&mut self` and are serialized by the engine's
/// per-index write lock; reads take `&self`. Deletion also takes `&self`:
/// the tombstone set carries its own lock so concurrent deletes under a
/// shared index lock stay safe.
pub struct Index {
    name: String,
    dir: PathBuf,
    config: IndexConfig,
    tokenizer: Arc<dyn Tokenizer>,
    fields: HashMap<String, FieldKind>,
    primary_key: Option<String>,
    start_doc_id: u64,
    max_doc_id: u64,
    next_segment_suffix: u64,
    segments: Vec<Segment>,
    active: Option<Segment>,
    primary: Option<OffsetIndex>,
    tombstones: RwLock<DocIdSet>,
}

impl std::fmt::Debug for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index")
            .field("name", &self.name)
            .field("max_doc_id", &self.max_doc_id)
            .field("segments", &self.segments.len())
            .field("active", &self.active.is_some())
            .finish()
    }
}

impl Index {
    /// Create a new index with the given field schema.
    pub fn create(
        name: &str,
        fields: Vec<FieldSpec>,
        config: IndexConfig,
        tokenizer: Arc<dyn Tokenizer>,
    ) -> Result<Self> {
        fs::create_dir_all(&config.root_dir)?;
        let mut index = Index {
            name: name.to_string(),
            dir: config.root_dir.clone(),
            config,
            tokenizer,
            fields: HashMap::new(),
            primary_key: None,
            start_doc_id: 0,
            max_doc_id: 0,
            next_segment_suffix: 0,
            segments: Vec::new(),
            active: None,
            primary: None,
            tombstones: RwLock::new(DocIdSet::new()),
        };
        for spec in fields {
            index.register_field(&spec)?;
        }
        index.store_meta()?;
        Ok(index)
    }

    /// Open an index previously persisted under the configured root.
    ///
    /// Sealed segments are reopened read-only; a trailing segment that never
    /// reached the rollover threshold is replayed back into resident form so
    /// appends continue where they left off.
    pub fn open(name: &str, config: IndexConfig, tokenizer: Arc<dyn Tokenizer>) -> Result<Self> {
        let meta_path = config.root_dir.join(format!("{name}.meta"));
        let meta_bytes = fs::read(&meta_path)
            .map_err(|_| XiphosError::not_found(format!("index {name}")))?;
        let meta: IndexMeta = serde_json::from_slice(&meta_bytes)?;

        let mut segments = Vec::new();
        for segment_name in &meta.segment_names {
            segments.push(Segment::open(
                config.root_dir.join(segment_name),
                tokenizer.clone(),
            )?);
        }

        let reload_trailing = segments
            .last()
            .is_some_and(|seg| seg.doc_count() < config.segment_doc_limit);
        let mut active = None;
        if reload_trailing {
            if let Some(disk) = segments.pop() {
                active = Some(Segment::reload(disk)?);
            }
        }

        let bitmap_path = config.root_dir.join(format!("{name}.bitmap"));
        let tombstones = if bitmap_path.exists() {
            DocIdSet::from_bytes(&fs::read(&bitmap_path)?)?
        } else {
            DocIdSet::new()
        };

        let primary = match &meta.primary_key {
            Some(pk_field) => {
                let mut primary =
                    OffsetIndex::open(config.root_dir.join(format!("{name}_primary.pk")))?;
                primary.create_partition(pk_field.clone());
                Some(primary)
            }
            None => None,
        };

        Ok(Index {
            name: meta.name,
            dir: config.root_dir.clone(),
            config,
            tokenizer,
            fields: meta.fields,
            primary_key: meta.primary_key,
            start_doc_id: meta.start_doc_id,
            max_doc_id: meta.max_doc_id,
            next_segment_suffix: meta.next_segment_suffix,
            segments,
            active,
            primary,
            tombstones: RwLock::new(tombstones),
        })
    }

    /// Index name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Next doc id to be assigned.
    pub fn max_doc_id(&self) -> u64 {
        self.max_doc_id
    }

    /// Field schema.
    pub fn fields(&self) -> &HashMap<String, FieldKind> {
        &self.fields
    }

    /// The primary-key field, if one is declared.
    pub fn primary_key(&self) -> Option<&str> {
        self.primary_key.as_deref()
    }

    /// Number of sealed segments.
    pub fn sealed_segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Whether an active resident segment currently exists.
    pub fn has_active_segment(&self) -> bool {
        self.active.is_some()
    }

    /// Number of tombstoned documents.
    pub fn deleted_count(&self) -> u64 {
        self.tombstones.read().len()
    }

    /// Append a document, returning its assigned doc id.
    pub fn add_document(&mut self, doc: &Document) -> Result<u64> {
        if self.fields.is_empty() {
            return Err(XiphosError::schema(format!(
                "index {} has no fields",
                self.name
            )));
        }
        if self.find_primary_key(&doc.id).is_some() {
            return Err(XiphosError::DuplicateKey(doc.id.clone()));
        }

        let must_roll = self
            .active
            .as_ref()
            .is_some_and(|seg| seg.doc_count() >= self.config.segment_doc_limit);
        if must_roll {
            self.seal_active_segment()?;
        }
        if self.active.is_none() {
            self.create_active_segment()?;
        }

        let doc_id = self.max_doc_id;
        self.max_doc_id += 1;
        if let (Some(pk_field), Some(primary)) = (&self.primary_key, &mut self.primary) {
            primary.put(pk_field, encode_str_key(&doc.id), doc_id)?;
        }
        let Some(active) = self.active.as_mut() else {
            return Err(XiphosError::invalid("no active segment after rollover"));
        };
        active.add_document(doc_id, doc)?;
        Ok(doc_id)
    }

    /// Soft-delete a document by primary key.
    ///
    /// Deleting an unknown key or an already-deleted document is a no-op
    /// success: the operation is idempotent.
    pub fn delete_document(&self, primary_key: &str) -> Result<()> {
        let Some(doc_id) = self.find_primary_key(primary_key) else {
            return Ok(());
        };
        let mut tombstones = self.tombstones.write();
        if tombstones.contains(doc_id) {
            return Ok(());
        }
        tombstones.insert(doc_id);
        fs::write(self.bitmap_path(), tombstones.to_bytes())?;
        Ok(())
    }

    /// Fetch a live document by primary key.
    pub fn get_document(&self, primary_key: &str) -> Result<Option<Document>> {
        let Some(doc_id) = self.find_primary_key(primary_key) else {
            return Ok(None);
        };
        if self.tombstones.read().contains(doc_id) {
            return Ok(None);
        }
        self.get_document_by_id(doc_id)
    }

    /// Fetch a document by doc id, ignoring tombstones.
    ///
    /// The owning segment is located by range containment, sealed segments
    /// first, then the active one.
    pub fn get_document_by_id(&self, doc_id: u64) -> Result<Option<Document>> {
        for segment in &self.segments {
            if segment.contains(doc_id) {
                return segment.get_document(doc_id);
            }
        }
        if let Some(active) = &self.active {
            if active.contains(doc_id) {
                return active.get_document(doc_id);
            }
        }
        Ok(None)
    }

    /// Evaluate a query across every segment and materialize the surviving
    /// documents, concatenated in segment order.
    pub fn search(&self, query: &TermQuery, filters: &[Filter]) -> Result<Vec<Document>> {
        let tombstones = self.tombstones.read();
        let mut docs = Vec::new();
        for segment in self.segments.iter().chain(self.active.iter()) {
            let hits = segment.search(query, filters, &tombstones)?;
            docs.extend(segment.materialize(&hits)?);
        }
        Ok(docs)
    }

    /// Add a field to the schema.
    ///
    /// The change lands in the active segment only if it is still empty;
    /// otherwise the active segment is sealed first and a fresh one picks up
    /// the new schema.
    pub fn add_field(&mut self, spec: FieldSpec) -> Result<()> {
        if self.fields.contains_key(&spec.name) {
            return Err(XiphosError::schema(format!(
                "field {} already exists",
                spec.name
            )));
        }
        if spec.kind == FieldKind::PrimaryKey && self.primary_key.is_some() {
            return Err(XiphosError::schema(format!(
                "index {} already has a primary key",
                self.name
            )));
        }
        self.register_field(&spec)?;

        if spec.kind != FieldKind::PrimaryKey {
            match &mut self.active {
                None => {}
                Some(segment) if segment.is_empty() => {
                    segment.add_field(&spec.name, spec.kind)?;
                }
                Some(_) => {
                    self.seal_active_segment()?;
                    self.create_active_segment()?;
                }
            }
        }
        self.store_meta()
    }

    /// Remove a field from the schema. The primary key cannot be removed.
    pub fn remove_field(&mut self, name: &str) -> Result<()> {
        if !self.fields.contains_key(name) {
            return Err(XiphosError::schema(format!("field {name} does not exist")));
        }
        if self.primary_key.as_deref() == Some(name) {
            return Err(XiphosError::schema(format!(
                "primary key {name} cannot be removed"
            )));
        }
        self.fields.remove(name);

        match &mut self.active {
            None => {}
            Some(segment) if segment.is_empty() => {
                segment.remove_field(name)?;
            }
            Some(_) => {
                self.seal_active_segment()?;
                self.create_active_segment()?;
            }
        }
        self.store_meta()
    }

    /// Seal the active segment (if non-empty) and move it onto the sealed
    /// list. A fresh active segment is created lazily by the next append.
    pub fn seal_active_segment(&mut self) -> Result<()> {
        let Some(mut segment) = self.active.take() else {
            return Ok(());
        };
        if segment.is_empty() {
            self.active = Some(segment);
            return Ok(());
        }
        debug!(index = %self.name, segment = %segment.name(), "rolling over");
        segment.seal()?;
        self.segments.push(segment);
        self.store_meta()
    }

    /// Seal outstanding state and persist metadata. The index must not be
    /// used afterwards.
    pub fn close(&mut self) -> Result<()> {
        self.seal_active_segment()?;
        self.active = None;
        self.store_meta()
    }

    /// Remove every file this index owns.
    pub fn destroy(&mut self) -> Result<()> {
        for segment in &self.segments {
            segment.destroy()?;
        }
        if let Some(active) = &self.active {
            active.destroy()?;
        }
        self.segments.clear();
        self.active = None;
        for path in [self.meta_path(), self.bitmap_path(), self.primary_path()] {
            if path.exists() {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    /// Resolve a primary key to its doc id.
    fn find_primary_key(&self, key: &str) -> Option<u64> {
        let pk_field = self.primary_key.as_deref()?;
        self.primary.as_ref()?.get(pk_field, &encode_str_key(key))
    }

    /// Record a schema entry, wiring up the primary-key map when needed.
    fn register_field(&mut self, spec: &FieldSpec) -> Result<()> {
        if self.fields.contains_key(&spec.name) {
            return Err(XiphosError::schema(format!(
                "field {} already exists",
                spec.name
            )));
        }
        if spec.kind == FieldKind::PrimaryKey {
            if self.primary_key.is_some() {
                return Err(XiphosError::schema(format!(
                    "index {} already has a primary key",
                    self.name
                )));
            }
            self.primary_key = Some(spec.name.clone());
            let mut primary = OffsetIndex::create(self.primary_path());
            primary.create_partition(spec.name.clone());
            self.primary = Some(primary);
        }
        self.fields.insert(spec.name.clone(), spec.kind);
        Ok(())
    }

    /// Create a fresh empty active segment covering `[max_doc_id, ..)`.
    fn create_active_segment(&mut self) -> Result<()> {
        let segment_name = format!("{}_{}", self.name, self.next_segment_suffix);
        self.next_segment_suffix += 1;

        // Segments index every column except the primary key.
        let segment_fields: HashMap<String, FieldKind> = self
            .fields
            .iter()
            .filter(|(_, kind)| **kind != FieldKind::PrimaryKey)
            .map(|(name, kind)| (name.clone(), *kind))
            .collect();

        self.active = Some(Segment::create(
            self.dir.join(&segment_name),
            &segment_name,
            self.max_doc_id,
            &segment_fields,
            self.tokenizer.clone(),
        ));
        self.store_meta()
    }

    /// Persist the metadata record, the tombstone bitmap, and the
    /// primary-key map.
    fn store_meta(&self) -> Result<()> {
        let tombstones = self.tombstones.read();
        let meta = IndexMeta {
            name: self.name.clone(),
            fields: self.fields.clone(),
            primary_key: self.primary_key.clone(),
            start_doc_id: self.start_doc_id,
            max_doc_id: self.max_doc_id,
            deleted_count: tombstones.len(),
            next_segment_suffix: self.next_segment_suffix,
            segment_names: self.segments.iter().map(|s| s.name().to_string()).collect(),
        };
        fs::write(self.meta_path(), serde_json::to_vec(&meta)?)?;
        fs::write(self.bitmap_path(), tombstones.to_bytes())?;
        if let Some(primary) = &self.primary {
            primary.commit()?;
        }
        Ok(())
    }

    fn meta_path(&self) -> PathBuf {
        self.dir.join(format!("{}.meta", self.name))
    }

    fn bitmap_path(&self) -> PathBuf {
        self.dir.join(format!("{}.bitmap", self.name))
    }

    fn primary_path(&self) -> PathBuf {
        self.dir.join(format!("{}_primary.pk", self.name))
    }
}
