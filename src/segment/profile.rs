//! Per-segment forward store.
//!
//! The profile maps each doc id to the document's encoded bytes. It has the
//! same residency duality as the inverted indexes: a hash map while the
//! segment is resident, a value log plus offset-index partition after the
//! seal. Sealed records are immutable; updating a sealed document appends a
//! fresh record and repoints the offset entry.

use std::path::Path;
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;

use crate::document::{self, Document};
use crate::error::{Result, XiphosError};
use crate::storage::{OffsetIndex, ValueLog, encode_u64_key};

/// Offset-index partition holding the forward store's doc id offsets.
pub const PROFILE_PARTITION: &str = "profile";

/// Forward store for one segment.
pub struct Profile {
    start_doc_id: u64,
    /// Next doc id this profile will accept.
    cursor: u64,
    resident: bool,
    map: AHashMap<u64, Vec<u8>>,
    log: Option<ValueLog>,
    btree: Option<Arc<RwLock<OffsetIndex>>>,
}

impl std::fmt::Debug for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Profile")
            .field("start_doc_id", &self.start_doc_id)
            .field("cursor", &self.cursor)
            .field("resident", &self.resident)
            .finish()
    }
}

impl Profile {
    /// Create an empty resident profile.
    pub fn new(start_doc_id: u64) -> Self {
        Profile {
            start_doc_id,
            cursor: start_doc_id,
            resident: true,
            map: AHashMap::new(),
            log: None,
            btree: None,
        }
    }

    /// Wrap the sealed on-disk representation.
    pub fn open(
        start_doc_id: u64,
        max_doc_id: u64,
        log: ValueLog,
        btree: Arc<RwLock<OffsetIndex>>,
    ) -> Self {
        Profile {
            start_doc_id,
            cursor: max_doc_id,
            resident: false,
            map: AHashMap::new(),
            log: Some(log),
            btree: Some(btree),
        }
    }

    /// Store a document's bytes under its doc id.
    pub fn add_document(&mut self, doc_id: u64, doc: &Document) -> Result<()> {
        if !self.resident {
            return Err(XiphosError::invalid(
                "profile is sealed and no longer accepts documents",
            ));
        }
        if doc_id != self.cursor {
            return Err(XiphosError::OutOfOrder {
                expected: self.cursor,
                got: doc_id,
            });
        }
        let bytes = document::encode(doc)?;
        self.map.insert(doc_id, bytes);
        self.cursor += 1;
        Ok(())
    }

    /// Fetch a document by doc id.
    pub fn get(&self, doc_id: u64) -> Result<Option<Document>> {
        if doc_id < self.start_doc_id || doc_id >= self.cursor {
            return Ok(None);
        }
        if self.resident {
            return match self.map.get(&doc_id) {
                Some(bytes) => Ok(Some(document::decode(bytes)?)),
                None => Ok(None),
            };
        }
        let (Some(log), Some(btree)) = (&self.log, &self.btree) else {
            return Ok(None);
        };
        let Some(offset) = btree.read().get(PROFILE_PARTITION, &encode_u64_key(doc_id)) else {
            return Ok(None);
        };
        let bytes = log.read(offset)?;
        Ok(Some(document::decode(&bytes)?))
    }

    /// Replace the stored bytes for an existing doc id.
    ///
    /// While resident this overwrites the map entry in place. After the
    /// seal, a new record is appended and the offset entry repointed:
    /// last writer wins by offset, the old record is never touched.
    pub fn update(&mut self, doc_id: u64, doc: &Document) -> Result<()> {
        if doc_id < self.start_doc_id || doc_id >= self.cursor {
            return Err(XiphosError::not_found(format!("doc id {doc_id}")));
        }
        let bytes = document::encode(doc)?;
        if self.resident {
            self.map.insert(doc_id, bytes);
            return Ok(());
        }
        let (Some(log), Some(btree)) = (&mut self.log, &self.btree) else {
            return Err(XiphosError::storage("sealed profile has no backing store"));
        };
        let key = encode_u64_key(doc_id);
        let mut btree = btree.write();
        if !btree.has_key(PROFILE_PARTITION, &key) {
            return Err(XiphosError::not_found(format!("doc id {doc_id}")));
        }
        let offset = log.append(&bytes)?;
        log.sync()?;
        btree.put(PROFILE_PARTITION, key, offset)?;
        btree.commit()?;
        Ok(())
    }

    /// Flush every document's bytes into `log_path` and record offsets in
    /// `btree`. One-shot.
    pub fn seal(&mut self, log_path: &Path, btree: &mut OffsetIndex) -> Result<()> {
        if !self.resident {
            return Err(XiphosError::invalid("profile is already sealed"));
        }
        let mut log = ValueLog::create(log_path)?;
        btree.create_partition(PROFILE_PARTITION);
        for (doc_id, bytes) in &self.map {
            let offset = log.append(bytes)?;
            btree.put(PROFILE_PARTITION, encode_u64_key(*doc_id), offset)?;
        }
        log.sync()?;
        self.log = Some(log);
        self.map = AHashMap::new();
        self.resident = false;
        Ok(())
    }

    /// Hand the profile the committed offset index of its segment.
    pub fn attach_btree(&mut self, btree: Arc<RwLock<OffsetIndex>>) {
        self.btree = Some(btree);
    }

    /// Next doc id this profile will accept.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn doc(id: &str, name: &str) -> Document {
        Document::new(id).with_field("name", name)
    }

    #[test]
    fn test_add_and_get_resident() {
        let mut profile = Profile::new(0);
        profile.add_document(0, &doc("a", "alice")).unwrap();
        profile.add_document(1, &doc("b", "bob")).unwrap();

        let restored = profile.get(0).unwrap().unwrap();
        assert_eq!(restored.id, "a");
        assert_eq!(restored.get_field("name"), Some("alice"));
        assert!(profile.get(7).unwrap().is_none());
    }

    #[test]
    fn test_ordering_contract() {
        let mut profile = Profile::new(10);
        assert!(matches!(
            profile.add_document(0, &doc("a", "alice")).unwrap_err(),
            XiphosError::OutOfOrder { expected: 10, got: 0 }
        ));
        profile.add_document(10, &doc("a", "alice")).unwrap();
    }

    #[test]
    fn test_seal_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut profile = Profile::new(0);
        profile.add_document(0, &doc("a", "alice")).unwrap();
        profile.add_document(1, &doc("b", "bob")).unwrap();

        let mut btree = OffsetIndex::create(dir.path().join("seg.bt"));
        profile.seal(&dir.path().join("_profile.dtl"), &mut btree).unwrap();
        btree.commit().unwrap();
        profile.attach_btree(Arc::new(RwLock::new(btree)));

        assert_eq!(profile.get(0).unwrap().unwrap().id, "a");
        assert_eq!(profile.get(1).unwrap().unwrap().id, "b");
        assert!(profile.get(2).unwrap().is_none());
        assert!(profile.seal(&dir.path().join("_profile.dtl"), &mut OffsetIndex::default()).is_err());
    }

    #[test]
    fn test_update_resident_overwrites_in_place() {
        let mut profile = Profile::new(0);
        profile.add_document(0, &doc("a", "alice")).unwrap();
        profile.update(0, &doc("a", "alicia")).unwrap();

        assert_eq!(profile.get(0).unwrap().unwrap().get_field("name"), Some("alicia"));
        assert!(profile.update(9, &doc("x", "nope")).is_err());
    }

    #[test]
    fn test_update_sealed_appends_and_repoints() {
        let dir = TempDir::new().unwrap();
        let mut profile = Profile::new(0);
        profile.add_document(0, &doc("a", "alice")).unwrap();

        let mut btree = OffsetIndex::create(dir.path().join("seg.bt"));
        profile.seal(&dir.path().join("_profile.dtl"), &mut btree).unwrap();
        btree.commit().unwrap();
        profile.attach_btree(Arc::new(RwLock::new(btree)));

        profile.update(0, &doc("a", "alicia")).unwrap();
        assert_eq!(profile.get(0).unwrap().unwrap().get_field("name"), Some("alicia"));
    }
}
