//! The engine: an explicitly constructed owner of named indexes.
//!
//! Each index sits behind its own read/write lock. Writes (`add_document`,
//! schema changes, `close`) take the index's write lock; `get_document`,
//! `search`, and `delete_document` take the read lock. Deletion is safe
//! under shared access because the tombstone set carries its own lock
//! inside the index.
//!
//! The tokenizer is injected at construction and shared by every index; the
//! engine holds no process-wide state.

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
use crate::index::Index;
use crate::query::{Filter, TermQuery};
use crate::schema::FieldSpec;

/// File recording which indexes the engine owns.
const ENGINE_META_FILE: &str = "engine.meta";

/// Persisted engine registry.
#[derive(Debug, Default, Serialize, Deserialize)]
struct EngineMeta {
    indexes: Vec<String>,
}

/// Owner of a set of named indexes sharing one root directory, one
/// configuration, and one tokenizer.
pub struct Engine {
    config: IndexConfig,
    tokenizer: Arc<dyn Tokenizer>,
    indexes: RwLock<HashMap<String, Arc<RwLock<Index>>>>,
}

impl Engine {
    /// Create an engine, reopening every index recorded under the
    /// configured root directory.
    pub fn new(config: IndexConfig, tokenizer: Arc<dyn Tokenizer>) -> Result<Self> {
        fs::create_dir_all(&config.root_dir)?;
        let engine = Engine {
            config,
            tokenizer,
            indexes: RwLock::new(HashMap::new()),
        };

        let meta_path = engine.meta_path();
        if meta_path.exists() {
            let meta: EngineMeta = serde_json::from_slice(&fs::read(&meta_path)?)?;
            let mut indexes = engine.indexes.write();
            for name in meta.indexes {
                debug!(index = %name, "reopening index");
                let index = Index::open(&name, engine.config.clone(), engine.tokenizer.clone())?;
                indexes.insert(name, Arc::new(RwLock::new(index)));
            }
        }
        Ok(engine)
    }

    /// Create a new index with the given field schema.
    pub fn create_index(&self, name: &str, fields: Vec<FieldSpec>) -> Result<()> {
        let mut indexes = self.indexes.write();
        if indexes.contains_key(name) {
            return Err(XiphosError::invalid(format!("index {name} already exists")));
        }
        let index = Index::create(name, fields, self.config.clone(), self.tokenizer.clone())?;
        indexes.insert(name.to_string(), Arc::new(RwLock::new(index)));
        self.store_meta(&indexes)
    }

    /// Check whether an index exists.
    pub fn has_index(&self, name: &str) -> bool {
        self.indexes.read().contains_key(name)
    }

    /// Names of every index the engine owns.
    pub fn index_names(&self) -> Vec<String> {
        self.indexes.read().keys().cloned().collect()
    }

    /// Append a document to an index, returning its assigned doc id.
    pub fn add_document(&self, index_name: &str, doc: &Document) -> Result<u64> {
        let index = self.index(index_name)?;
        let mut index = index.write();
        index.add_document(doc)
    }

    /// Fetch a live document by primary key.
    pub fn get_document(&self, index_name: &str, primary_key: &str) -> Result<Option<Document>> {
        let index = self.index(index_name)?;
        let index = index.read();
        index.get_document(primary_key)
    }

    /// Soft-delete a document by primary key (idempotent).
    pub fn delete_document(&self, index_name: &str, primary_key: &str) -> Result<()> {
        let index = self.index(index_name)?;
        let index = index.read();
        index.delete_document(primary_key)
    }

    /// Evaluate a query with filters across every segment of an index.
    pub fn search(
        &self,
        index_name: &str,
        query: &TermQuery,
        filters: &[Filter],
    ) -> Result<Vec<Document>> {
        let index = self.index(index_name)?;
        let index = index.read();
        index.search(query, filters)
    }

    /// Add a field to an index's schema.
    pub fn add_field(&self, index_name: &str, spec: FieldSpec) -> Result<()> {
        let index = self.index(index_name)?;
        let mut index = index.write();
        index.add_field(spec)
    }

    /// Remove a field from an index's schema.
    pub fn remove_field(&self, index_name: &str, field_name: &str) -> Result<()> {
        let index = self.index(index_name)?;
        let mut index = index.write();
        index.remove_field(field_name)
    }

    /// Seal an index's active segment without closing it.
    pub fn seal_index(&self, index_name: &str) -> Result<()> {
        let index = self.index(index_name)?;
        let mut index = index.write();
        index.seal_active_segment()
    }

    /// Destroy an index, removing its files and registry entry.
    pub fn drop_index(&self, index_name: &str) -> Result<()> {
        let mut indexes = self.indexes.write();
        let Some(index) = indexes.remove(index_name) else {
            return Err(XiphosError::not_found(format!("index {index_name}")));
        };
        index.write().destroy()?;
        self.store_meta(&indexes)
    }

    /// Seal and persist every index. The engine must not be used afterwards.
    pub fn close(&self) -> Result<()> {
        let indexes = self.indexes.write();
        for index in indexes.values() {
            index.write().close()?;
        }
        self.store_meta(&indexes)
    }

    /// Look up an index handle, cloning its lock out of the registry so the
    /// registry lock is not held across the operation.
    fn index(&self, name: &str) -> Result<Arc<RwLock<Index>>> {
        self.indexes
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| XiphosError::not_found(format!("index {name}")))
    }

    fn store_meta(&self, indexes: &HashMap<String, Arc<RwLock<Index>>>) -> Result<()> {
        let mut names: Vec<String> = indexes.keys().cloned().collect();
        names.sort();
        let meta = EngineMeta { indexes: names };
        fs::write(self.meta_path(), serde_json::to_vec(&meta)?)?;
        Ok(())
    }

    fn meta_path(&self) -> PathBuf {
        self.config.root_dir.join(ENGINE_META_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::SimpleTokenizer;
    use crate::schema::FieldKind;
    use tempfile::TempDir;

    fn engine(dir: &TempDir) -> Engine {
        Engine::new(
            IndexConfig::new(dir.path()).segment_doc_limit(100),
            Arc::new(SimpleTokenizer::new()),
        )
        .unwrap()
    }

    fn schema() -> Vec<FieldSpec> {
        vec![
            FieldSpec::new("id", FieldKind::PrimaryKey),
            FieldSpec::new("name", FieldKind::ExactText),
        ]
    }

    #[test]
    fn test_create_and_duplicate_index() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);

        engine.create_index("people", schema()).unwrap();
        assert!(engine.has_index("people"));
        assert!(engine.create_index("people", schema()).is_err());
    }

    #[test]
    fn test_operations_on_unknown_index() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);

        let doc = Document::new("a").with_field("name", "alice");
        assert!(matches!(
            engine.add_document("ghost", &doc).unwrap_err(),
            XiphosError::NotFound(_)
        ));
        assert!(engine.search("ghost", &TermQuery::empty(), &[]).is_err());
    }

    #[test]
    fn test_document_lifecycle_through_engine() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        engine.create_index("people", schema()).unwrap();

        let doc = Document::new("a").with_field("name", "alice");
        engine.add_document("people", &doc).unwrap();

        let found = engine.get_document("people", "a").unwrap().unwrap();
        assert_eq!(found.get_field("name"), Some("alice"));

        engine.delete_document("people", "a").unwrap();
        assert!(engine.get_document("people", "a").unwrap().is_none());
    }

    #[test]
    fn test_registry_survives_restart() {
        let dir = TempDir::new().unwrap();
        {
            let engine = engine(&dir);
            engine.create_index("people", schema()).unwrap();
            let doc = Document::new("a").with_field("name", "alice");
            engine.add_document("people", &doc).unwrap();
            engine.close().unwrap();
        }

        let engine = engine(&dir);
        assert!(engine.has_index("people"));
        let hits = engine
            .search("people", &TermQuery::keyword("name", "alice"), &[])
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_drop_index_removes_files_and_entry() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        engine.create_index("people", schema()).unwrap();
        let doc = Document::new("a").with_field("name", "alice");
        engine.add_document("people", &doc).unwrap();

        engine.drop_index("people").unwrap();
        assert!(!engine.has_index("people"));
        assert!(engine.drop_index("people").is_err());
        assert!(!dir.path().join("people.meta").exists());
    }

    #[test]
    fn test_concurrent_reads_and_deletes() {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(engine(&dir));
        engine.create_index("people", schema()).unwrap();

        for i in 0..50 {
            let doc = Document::new(format!("key{i}")).with_field("name", "someone");
            engine.add_document("people", &doc).unwrap();
        }

        let mut handles = Vec::new();
        for worker in 0..4 {
            let engine = engine.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..50 {
                    if i % 4 == worker {
                        engine
                            .delete_document("people", &format!("key{i}"))
                            .unwrap();
                    } else {
                        let _ = engine
                            .search("people", &TermQuery::keyword("name", "someone"), &[])
                            .unwrap();
                    }
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(engine
            .search("people", &TermQuery::keyword("name", "someone"), &[])
            .unwrap()
            .is_empty());
    }
}
