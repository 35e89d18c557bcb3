//! Append-only, memory-mapped value log.
//!
//! A [`ValueLog`] holds length-prefixed records addressed by the byte offset
//! returned from [`ValueLog::append`]. The first eight bytes of the mapped
//! region persist the write cursor, so reopening a log recovers the append
//! position without rescanning. The backing file grows in fixed-size chunks;
//! growth remaps the file and preserves every previously returned offset.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, LittleEndian};
use memmap2::MmapMut;

use crate::error::{Result, XiphosError};

/// Reserved header holding the little-endian write cursor.
const HEADER_LEN: u64 = 8;

/// Record framing: u64 payload length plus u32 payload checksum.
const RECORD_HEADER_LEN: u64 = 12;

/// Growth increment for the backing file.
const GROW_CHUNK: u64 = 1024 * 1024;

/// Append-only byte store backed by a growable memory map.
///
/// Writers are serialized by the owning seal step; reads on a sealed log may
/// happen concurrently from any number of readers.
pub struct ValueLog {
    path: PathBuf,
    file: File,
    map: MmapMut,
    capacity: u64,
    cursor: u64,
}

impl std::fmt::Debug for ValueLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueLog")
            .field("path", &self.path)
            .field("capacity", &self.capacity)
            .field("cursor", &self.cursor)
            .finish()
    }
}

impl ValueLog {
    /// Create a fresh log, truncating any existing file at `path`.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        file.set_len(GROW_CHUNK)?;
        let map = unsafe { MmapMut::map_mut(&file)? };

        let mut log = ValueLog {
            path,
            file,
            map,
            capacity: GROW_CHUNK,
            cursor: HEADER_LEN,
        };
        log.store_cursor();
        Ok(log)
    }

    /// Open an existing log, recovering the write cursor from the header.
    ///
    /// A missing or empty file is initialized like [`ValueLog::create`].
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        let len = file.metadata()?.len();
        if len == 0 {
            file.set_len(GROW_CHUNK)?;
        }
        let capacity = file.metadata()?.len();
        let map = unsafe { MmapMut::map_mut(&file)? };

        let stored = LittleEndian::read_u64(&map[0..HEADER_LEN as usize]);
        let cursor = if stored < HEADER_LEN || stored > capacity {
            HEADER_LEN
        } else {
            stored
        };

        let mut log = ValueLog {
            path,
            file,
            map,
            capacity,
            cursor,
        };
        if len == 0 {
            log.store_cursor();
        }
        Ok(log)
    }

    /// Append a length-prefixed, checksummed record and return its starting
    /// offset.
    pub fn append(&mut self, payload: &[u8]) -> Result<u64> {
        let needed = RECORD_HEADER_LEN + payload.len() as u64;
        self.ensure_capacity(self.cursor + needed)?;

        let offset = self.cursor;
        let start = offset as usize;
        LittleEndian::write_u64(&mut self.map[start..start + 8], payload.len() as u64);
        LittleEndian::write_u32(
            &mut self.map[start + 8..start + 12],
            crc32fast::hash(payload),
        );
        self.map[start + 12..start + 12 + payload.len()].copy_from_slice(payload);

        self.cursor += needed;
        self.store_cursor();
        Ok(offset)
    }

    /// Read back the record starting at `offset`.
    ///
    /// Only offsets previously returned by [`ValueLog::append`] are valid.
    pub fn read(&self, offset: u64) -> Result<Vec<u8>> {
        if offset < HEADER_LEN || offset + RECORD_HEADER_LEN > self.cursor {
            return Err(XiphosError::storage(format!(
                "offset {offset} is outside the written region of {}",
                self.path.display()
            )));
        }
        let start = offset as usize;
        let len = LittleEndian::read_u64(&self.map[start..start + 8]);
        let end = offset + RECORD_HEADER_LEN + len;
        if end > self.cursor {
            return Err(XiphosError::storage(format!(
                "record at offset {offset} overruns the written region of {}",
                self.path.display()
            )));
        }
        let stored_crc = LittleEndian::read_u32(&self.map[start + 8..start + 12]);
        let payload = &self.map[start + 12..end as usize];
        if crc32fast::hash(payload) != stored_crc {
            return Err(XiphosError::storage(format!(
                "checksum mismatch for record at offset {offset} in {}",
                self.path.display()
            )));
        }
        Ok(payload.to_vec())
    }

    /// Bytes written so far, including the header.
    pub fn len(&self) -> u64 {
        self.cursor
    }

    /// Check whether the log holds no records.
    pub fn is_empty(&self) -> bool {
        self.cursor == HEADER_LEN
    }

    /// Flush the mapped region to disk.
    pub fn sync(&self) -> Result<()> {
        self.map
            .flush()
            .map_err(|e| XiphosError::storage(format!("failed to flush value log: {e}")))
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn store_cursor(&mut self) {
        LittleEndian::write_u64(&mut self.map[0..HEADER_LEN as usize], self.cursor);
    }

    /// Grow and remap the backing file until `target` bytes fit.
    fn ensure_capacity(&mut self, target: u64) -> Result<()> {
        if target <= self.capacity {
            return Ok(());
        }
        let mut capacity = self.capacity;
        while target > capacity {
            capacity += GROW_CHUNK;
        }
        self.file.set_len(capacity)?;
        self.map = unsafe { MmapMut::map_mut(&self.file)? };
        self.capacity = capacity;
        Ok(())
    }
}
