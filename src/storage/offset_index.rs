//! Durable ordered key/value map for locating records in a value log.
//!
//! An [`OffsetIndex`] groups keys into named partitions and maps each key to
//! a `u64`, usually a [`ValueLog`](crate::storage::ValueLog) byte offset,
//! sometimes a small integer such as a doc id. Mutations accumulate in
//! memory; [`OffsetIndex::commit`] snapshots the whole store to disk through
//! a temp-file rename, so a flush is visible all-or-nothing and a segment is
//! never observed partially indexed.
//!
//! Keys are stored as raw bytes. Numeric keys must be encoded with
//! [`encode_i64_key`] so that lexicographic byte order matches numeric
//! order, which is what makes [`OffsetIndex::range_scan`] correct.

use std::collections::BTreeMap;
use std::fs;
use std::ops::Bound;
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Result, XiphosError};

/// Offset this mask flips the sign bit, so negative keys order before
/// positive ones under byte comparison.
const SIGN_MASK: u64 = 1 << 63;

/// Encode a string key as raw bytes.
pub fn encode_str_key(key: &str) -> Vec<u8> {
    key.as_bytes().to_vec()
}

/// Encode a signed numeric key as order-preserving fixed-width big-endian.
pub fn encode_i64_key(key: i64) -> Vec<u8> {
    let mut buf = vec![0u8; 8];
    BigEndian::write_u64(&mut buf, (key as u64) ^ SIGN_MASK);
    buf
}

/// Encode an unsigned numeric key (e.g. a doc id) as fixed-width
/// big-endian.
pub fn encode_u64_key(key: u64) -> Vec<u8> {
    let mut buf = vec![0u8; 8];
    BigEndian::write_u64(&mut buf, key);
    buf
}

/// Decode a key produced by [`encode_i64_key`].
pub fn decode_i64_key(bytes: &[u8]) -> Option<i64> {
    if bytes.len() != 8 {
        return None;
    }
    Some((BigEndian::read_u64(bytes) ^ SIGN_MASK) as i64)
}

/// Durable ordered map from encoded keys to u64 values, grouped into named
/// partitions.
#[derive(Debug, Default)]
pub struct OffsetIndex {
    path: PathBuf,
    partitions: BTreeMap<String, BTreeMap<Vec<u8>, u64>>,
}

impl OffsetIndex {
    /// Create an empty store that will persist to `path` on commit.
    pub fn create<P: AsRef<Path>>(path: P) -> Self {
        OffsetIndex {
            path: path.as_ref().to_path_buf(),
            partitions: BTreeMap::new(),
        }
    }

    /// Open a store from disk; a missing file yields an empty store.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let partitions = if path.exists() {
            let bytes = fs::read(&path)?;
            bincode::deserialize(&bytes).map_err(|e| {
                XiphosError::serialization(format!(
                    "failed to decode offset index {}: {e}",
                    path.display()
                ))
            })?
        } else {
            BTreeMap::new()
        };
        Ok(OffsetIndex { path, partitions })
    }

    /// Create a partition if it does not already exist.
    pub fn create_partition<S: Into<String>>(&mut self, name: S) {
        self.partitions.entry(name.into()).or_default();
    }

    /// Check whether a partition exists.
    pub fn has_partition(&self, name: &str) -> bool {
        self.partitions.contains_key(name)
    }

    /// Insert or overwrite a key in a partition.
    pub fn put(&mut self, partition: &str, key: Vec<u8>, value: u64) -> Result<()> {
        let table = self
            .partitions
            .get_mut(partition)
            .ok_or_else(|| XiphosError::not_found(format!("partition {partition}")))?;
        table.insert(key, value);
        Ok(())
    }

    /// Point lookup.
    pub fn get(&self, partition: &str, key: &[u8]) -> Option<u64> {
        self.partitions.get(partition)?.get(key).copied()
    }

    /// Check whether a key is present.
    pub fn has_key(&self, partition: &str, key: &[u8]) -> bool {
        self.get(partition, key).is_some()
    }

    /// Remove a key from a partition, returning its value if present.
    pub fn remove(&mut self, partition: &str, key: &[u8]) -> Option<u64> {
        self.partitions.get_mut(partition)?.remove(key)
    }

    /// Smallest key in a partition.
    pub fn first(&self, partition: &str) -> Option<(Vec<u8>, u64)> {
        self.partitions
            .get(partition)?
            .iter()
            .next()
            .map(|(k, v)| (k.clone(), *v))
    }

    /// Strict successor of `key` in a partition.
    pub fn next_after(&self, partition: &str, key: &[u8]) -> Option<(Vec<u8>, u64)> {
        self.partitions
            .get(partition)?
            .range::<[u8], _>((Bound::Excluded(key), Bound::Unbounded))
            .next()
            .map(|(k, v)| (k.clone(), *v))
    }

    /// Values for every key in `[min, max]`, in key order.
    pub fn range_scan(&self, partition: &str, min: &[u8], max: &[u8]) -> Vec<u64> {
        if min > max {
            return Vec::new();
        }
        let Some(table) = self.partitions.get(partition) else {
            return Vec::new();
        };
        table
            .range::<[u8], _>((Bound::Included(min), Bound::Included(max)))
            .map(|(_, v)| *v)
            .collect()
    }

    /// Persist the whole store atomically.
    ///
    /// The snapshot is written to a temp file which is fsynced and renamed
    /// over the target, so every mutation since the last commit becomes
    /// visible together or not at all.
    pub fn commit(&self) -> Result<()> {
        let bytes = bincode::serialize(&self.partitions).map_err(|e| {
            XiphosError::serialization(format!("failed to encode offset index: {e}"))
        })?;
        let tmp_path = self.path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp_path)?;
            use std::io::Write;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_numeric_key_ordering() {
        let values = [-5i64, -1, 0, 1, 42, i64::MAX, i64::MIN];
        let mut encoded: Vec<Vec<u8>> = values.iter().map(|v| encode_i64_key(*v)).collect();
        encoded.sort();
        let decoded: Vec<i64> = encoded
            .iter()
            .map(|bytes| decode_i64_key(bytes).unwrap())
            .collect();
        assert_eq!(decoded, vec![i64::MIN, -5, -1, 0, 1, 42, i64::MAX]);
    }

    #[test]
    fn test_put_get_and_missing_partition() {
        let dir = TempDir::new().unwrap();
        let mut index = OffsetIndex::create(dir.path().join("seg.bt"));

        index.create_partition("name_invert");
        index
            .put("name_invert", encode_str_key("alice"), 24)
            .unwrap();

        assert_eq!(index.get("name_invert", &encode_str_key("alice")), Some(24));
        assert_eq!(index.get("name_invert", &encode_str_key("bob")), None);
        assert!(index.put("missing", vec![1], 1).is_err());
    }

    #[test]
    fn test_range_scan_in_key_order() {
        let dir = TempDir::new().unwrap();
        let mut index = OffsetIndex::create(dir.path().join("seg.bt"));
        index.create_partition("age_invert");

        for (age, offset) in [(30i64, 1u64), (10, 2), (20, 3), (-1, 4)] {
            index.put("age_invert", encode_i64_key(age), offset).unwrap();
        }

        let hits = index.range_scan("age_invert", &encode_i64_key(10), &encode_i64_key(25));
        assert_eq!(hits, vec![2, 3]);

        // Sentinel keys sort below zero and stay out of [0, n] scans.
        let hits = index.range_scan("age_invert", &encode_i64_key(0), &encode_i64_key(100));
        assert_eq!(hits, vec![2, 3, 1]);

        // Inverted bounds and unknown partitions scan to nothing.
        assert!(index
            .range_scan("age_invert", &encode_i64_key(9), &encode_i64_key(1))
            .is_empty());
        assert!(index
            .range_scan("nope", &encode_i64_key(0), &encode_i64_key(9))
            .is_empty());
    }

    #[test]
    fn test_next_after_and_first() {
        let dir = TempDir::new().unwrap();
        let mut index = OffsetIndex::create(dir.path().join("seg.bt"));
        index.create_partition("num");
        for age in [5i64, 15, 25] {
            index.put("num", encode_i64_key(age), age as u64).unwrap();
        }

        let (key, value) = index.first("num").unwrap();
        assert_eq!(decode_i64_key(&key), Some(5));
        assert_eq!(value, 5);

        let (key, value) = index.next_after("num", &encode_i64_key(5)).unwrap();
        assert_eq!(decode_i64_key(&key), Some(15));
        assert_eq!(value, 15);

        assert!(index.next_after("num", &encode_i64_key(25)).is_none());
    }

    #[test]
    fn test_commit_and_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("seg.bt");

        {
            let mut index = OffsetIndex::create(&path);
            index.create_partition("p");
            index.put("p", encode_str_key("k"), 99).unwrap();
            index.commit().unwrap();
        }

        let index = OffsetIndex::open(&path).unwrap();
        assert_eq!(index.get("p", &encode_str_key("k")), Some(99));
    }

    #[test]
    fn test_uncommitted_changes_are_not_visible_after_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("seg.bt");

        {
            let mut index = OffsetIndex::create(&path);
            index.create_partition("p");
            index.put("p", encode_str_key("committed"), 1).unwrap();
            index.commit().unwrap();
            index.put("p", encode_str_key("dropped"), 2).unwrap();
            // No second commit.
        }

        let index = OffsetIndex::open(&path).unwrap();
        assert_eq!(index.get("p", &encode_str_key("committed")), Some(1));
        assert_eq!(index.get("p", &encode_str_key("dropped")), None);
    }
}
