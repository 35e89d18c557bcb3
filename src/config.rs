//! Configuration for indexes and their storage.

use std::path::PathBuf;

/// Configuration shared by every index an engine owns.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Root directory under which index and segment files are created.
    pub root_dir: PathBuf,
    /// Number of documents after which the active segment is sealed and a
    /// fresh one is started.
    pub segment_doc_limit: u64,
}

impl IndexConfig {
    /// Create a configuration rooted at the given directory with default
    /// limits.
    pub fn new<P: Into<PathBuf>>(root_dir: P) -> Self {
        IndexConfig {
            root_dir: root_dir.into(),
            segment_doc_limit: DEFAULT_SEGMENT_DOC_LIMIT,
        }
    }

    /// Override the segment rollover threshold.
    pub fn segment_doc_limit(mut self, limit: u64) -> Self {
        self.segment_doc_limit = limit;
        self
    }
}

/// Default segment rollover threshold.
pub const DEFAULT_SEGMENT_DOC_LIMIT: u64 = 100_000;

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig::new("./data")
    }
}
