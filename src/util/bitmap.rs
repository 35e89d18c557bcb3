//! Growable doc-id bitmap with explicit set algebra.
//!
//! Inverted lists, tombstones, and query evaluation all operate on
//! [`DocIdSet`]. The set is backed by a [`BitVec`] anchored at a base doc id,
//! so a segment whose doc ids start high does not pay for the ids below its
//! range.

use bit_vec::BitVec;
use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Result, XiphosError};

/// A set of document ids.
///
/// Bit `i` represents doc id `base + i`. The set grows on demand and can be
/// serialized into a compact byte form for storage in a value log.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocIdSet {
    base: u64,
    bits: BitVec,
    count: u64,
}

impl DocIdSet {
    /// Create an empty set.
    pub fn new() -> Self {
        DocIdSet::default()
    }

    /// Add a doc id to the set. Adding an id twice is a no-op.
    pub fn insert(&mut self, doc_id: u64) {
        if self.bits.is_empty() {
            self.base = doc_id;
        } else if doc_id < self.base {
            self.rebase(doc_id);
        }
        let idx = (doc_id - self.base) as usize;
        if idx >= self.bits.len() {
            self.bits.grow(idx + 1 - self.bits.len(), false);
        }
        if self.bits.get(idx) != Some(true) {
            self.bits.set(idx, true);
            self.count += 1;
        }
    }

    /// Remove a doc id from the set. Removing an absent id is a no-op.
    pub fn remove(&mut self, doc_id: u64) {
        if doc_id < self.base {
            return;
        }
        let idx = (doc_id - self.base) as usize;
        if self.bits.get(idx) == Some(true) {
            self.bits.set(idx, false);
            self.count -= 1;
        }
    }

    /// Check whether a doc id is in the set.
    pub fn contains(&self, doc_id: u64) -> bool {
        if doc_id < self.base {
            return false;
        }
        let idx = (doc_id - self.base) as usize;
        self.bits.get(idx) == Some(true)
    }

    /// Number of doc ids in the set.
    pub fn len(&self) -> u64 {
        self.count
    }

    /// Check whether the set contains no doc ids.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Iterate the doc ids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        let base = self.base;
        self.bits
            .iter()
            .enumerate()
            .filter(|(_, bit)| *bit)
            .map(move |(idx, _)| base + idx as u64)
    }

    /// Add every doc id of `other` to this set.
    pub fn union_with(&mut self, other: &DocIdSet) {
        for doc_id in other.iter() {
            self.insert(doc_id);
        }
    }

    /// Remove every doc id not present in `other`.
    pub fn intersect_with(&mut self, other: &DocIdSet) {
        for idx in 0..self.bits.len() {
            if self.bits.get(idx) == Some(true) && !other.contains(self.base + idx as u64) {
                self.bits.set(idx, false);
                self.count -= 1;
            }
        }
    }

    /// Serialize into a length-stable byte form.
    pub fn to_bytes(&self) -> Vec<u8> {
        let bit_bytes = self.bits.to_bytes();
        let mut buf = vec![0u8; 16 + bit_bytes.len()];
        LittleEndian::write_u64(&mut buf[0..8], self.base);
        LittleEndian::write_u64(&mut buf[8..16], self.bits.len() as u64);
        buf[16..].copy_from_slice(&bit_bytes);
        buf
    }

    /// Deserialize a set previously produced by [`DocIdSet::to_bytes`].
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < 16 {
            return Err(XiphosError::serialization(
                "doc id set record shorter than its header",
            ));
        }
        let base = LittleEndian::read_u64(&data[0..8]);
        let nbits = LittleEndian::read_u64(&data[8..16]) as usize;
        let mut bits = BitVec::from_bytes(&data[16..]);
        if bits.len() < nbits {
            return Err(XiphosError::serialization(
                "doc id set record truncated",
            ));
        }
        bits.truncate(nbits);
        let count = bits.iter().filter(|bit| *bit).count() as u64;
        Ok(DocIdSet { base, bits, count })
    }

    /// Re-anchor the bitmap at a lower base doc id.
    fn rebase(&mut self, new_base: u64) {
        let shift = (self.base - new_base) as usize;
        let mut shifted = BitVec::from_elem(self.bits.len() + shift, false);
        for idx in 0..self.bits.len() {
            if self.bits.get(idx) == Some(true) {
                shifted.set(idx + shift, true);
            }
        }
        self.bits = shifted;
        self.base = new_base;
    }
}

impl FromIterator<u64> for DocIdSet {
    fn from_iter<I: IntoIterator<Item = u64>>(iter: I) -> Self {
        let mut set = DocIdSet::new();
        for doc_id in iter {
            set.insert(doc_id);
        }
        set
    }
}

/// Intersect a list of sets. An empty list yields the empty set, not
/// "match all".
pub fn intersect_all(sets: Vec<DocIdSet>) -> DocIdSet {
    let mut iter = sets.into_iter();
    let Some(mut result) = iter.next() else {
        return DocIdSet::new();
    };
    for set in iter {
        result.intersect_with(&set);
    }
    result
}

/// Union a list of sets. An empty list yields the empty set.
pub fn union_all(sets: Vec<DocIdSet>) -> DocIdSet {
    let mut iter = sets.into_iter();
    let Some(mut result) = iter.next() else {
        return DocIdSet::new();
    };
    for set in iter {
        result.union_with(&set);
    }
    result
}
