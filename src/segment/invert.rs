//! Per-field inverted indexes.
//!
//! While a segment is resident, an invert is a hash map from term or number
//! to a doc-id bitmap. Sealing flushes every bitmap into the field's value
//! log and records its offset in the segment's offset index; after that the
//! invert serves reads from disk and the memory map is gone.

use std::sync::Arc;

use ahash::AHashMap;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use parking_lot::RwLock;
use tracing::warn;

use crate::analysis::Tokenizer;
use crate::error::{Result, XiphosError};
use crate::schema::FieldKind;
use crate::storage::{OffsetIndex, ValueLog, encode_i64_key, encode_str_key};
use crate::util::DocIdSet;

/// Key a malformed integer value is indexed under.
pub const INTEGER_SENTINEL: i64 = -1;

/// Key a malformed float value is indexed under (-1.00 in fixed point).
pub const FLOAT_SENTINEL: i64 = -100;

/// Key a malformed date value is indexed under.
pub const DATE_SENTINEL: i64 = -1;

/// State shared by both invert specializations.
#[derive(Debug)]
struct InvertCore {
    field_name: String,
    kind: FieldKind,
    /// Next doc id this invert will accept.
    cursor: u64,
    resident: bool,
    /// Offset-index partition holding this field's term offsets.
    partition: String,
    log: Option<ValueLog>,
    btree: Option<Arc<RwLock<OffsetIndex>>>,
}

impl InvertCore {
    fn resident(field_name: &str, kind: FieldKind, start_doc_id: u64) -> Self {
        InvertCore {
            field_name: field_name.to_string(),
            kind,
            cursor: start_doc_id,
            resident: true,
            partition: partition_name(field_name),
            log: None,
            btree: None,
        }
    }

    fn sealed(
        field_name: &str,
        kind: FieldKind,
        cursor: u64,
        log: ValueLog,
        btree: Arc<RwLock<OffsetIndex>>,
    ) -> Self {
        InvertCore {
            field_name: field_name.to_string(),
            kind,
            cursor,
            resident: false,
            partition: partition_name(field_name),
            log: Some(log),
            btree: Some(btree),
        }
    }

    fn check_append(&self, doc_id: u64) -> Result<()> {
        if !self.resident {
            return Err(XiphosError::invalid(format!(
                "field {} is sealed and no longer accepts documents",
                self.field_name
            )));
        }
        if doc_id != self.cursor {
            return Err(XiphosError::OutOfOrder {
                expected: self.cursor,
                got: doc_id,
            });
        }
        Ok(())
    }

    fn check_sealable(&self) -> Result<()> {
        if !self.resident {
            return Err(XiphosError::invalid(format!(
                "field {} is already sealed",
                self.field_name
            )));
        }
        Ok(())
    }

    /// Fetch a bitmap from the sealed representation by encoded key.
    fn read_sealed(&self, key: &[u8]) -> Result<Option<DocIdSet>> {
        let (Some(log), Some(btree)) = (&self.log, &self.btree) else {
            return Ok(None);
        };
        let Some(offset) = btree.read().get(&self.partition, key) else {
            return Ok(None);
        };
        let bytes = log.read(offset)?;
        Ok(Some(DocIdSet::from_bytes(&bytes)?))
    }
}

/// Offset-index partition name for a field's inverted list.
pub fn partition_name(field_name: &str) -> String {
    format!("{field_name}_invert")
}

/// Inverted index for text fields.
pub struct TextInvert {
    core: InvertCore,
    map: AHashMap<String, DocIdSet>,
    tokenizer: Arc<dyn Tokenizer>,
}

impl std::fmt::Debug for TextInvert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextInvert")
            .field("core", &self.core)
            .field("terms", &self.map.len())
            .finish()
    }
}

impl TextInvert {
    /// Create an empty resident invert.
    pub fn new(
        field_name: &str,
        kind: FieldKind,
        start_doc_id: u64,
        tokenizer: Arc<dyn Tokenizer>,
    ) -> Self {
        TextInvert {
            core: InvertCore::resident(field_name, kind, start_doc_id),
            map: AHashMap::new(),
            tokenizer,
        }
    }

    /// Wrap the sealed on-disk representation.
    pub fn open(
        field_name: &str,
        kind: FieldKind,
        cursor: u64,
        log: ValueLog,
        btree: Arc<RwLock<OffsetIndex>>,
        tokenizer: Arc<dyn Tokenizer>,
    ) -> Self {
        TextInvert {
            core: InvertCore::sealed(field_name, kind, cursor, log, btree),
            map: AHashMap::new(),
            tokenizer,
        }
    }

    /// Credit this doc id with every term derived from the value.
    pub fn add_document(&mut self, doc_id: u64, value: &str) -> Result<()> {
        self.core.check_append(doc_id)?;
        let terms = match self.core.kind {
            FieldKind::ExactText => vec![value.to_string()],
            FieldKind::TokenizedText => self.tokenizer.tokenize(value),
            kind => {
                return Err(XiphosError::schema(format!(
                    "field {} has non-text kind {kind:?}",
                    self.core.field_name
                )));
            }
        };
        for term in terms {
            self.map.entry(term).or_default().insert(doc_id);
        }
        self.core.cursor += 1;
        Ok(())
    }

    /// Advance the append cursor past a document that carries no value for
    /// this field.
    pub fn skip_document(&mut self, doc_id: u64) -> Result<()> {
        self.core.check_append(doc_id)?;
        self.core.cursor += 1;
        Ok(())
    }

    /// Exact-match lookup.
    pub fn query_term(&self, term: &str) -> Result<Option<DocIdSet>> {
        if self.core.resident {
            return Ok(self.map.get(term).cloned());
        }
        self.core.read_sealed(&encode_str_key(term))
    }

    /// Flush every term's bitmap into `log_path` and record offsets in
    /// `btree`. One-shot.
    pub fn seal(&mut self, log_path: &std::path::Path, btree: &mut OffsetIndex) -> Result<()> {
        self.core.check_sealable()?;
        let mut log = ValueLog::create(log_path)?;
        btree.create_partition(&self.core.partition);
        for (term, set) in &self.map {
            let offset = log.append(&set.to_bytes())?;
            btree.put(&self.core.partition, encode_str_key(term), offset)?;
        }
        log.sync()?;
        self.core.log = Some(log);
        self.map = AHashMap::new();
        self.core.resident = false;
        Ok(())
    }

    /// Hand the invert the committed offset index of its segment.
    pub fn attach_btree(&mut self, btree: Arc<RwLock<OffsetIndex>>) {
        self.core.btree = Some(btree);
    }

    /// Next doc id this invert will accept.
    pub fn cursor(&self) -> u64 {
        self.core.cursor
    }
}

/// Inverted index for numeric fields (integer, float, date).
#[derive(Debug)]
pub struct NumberInvert {
    core: InvertCore,
    map: AHashMap<i64, DocIdSet>,
}

impl NumberInvert {
    /// Create an empty resident invert.
    pub fn new(field_name: &str, kind: FieldKind, start_doc_id: u64) -> Self {
        NumberInvert {
            core: InvertCore::resident(field_name, kind, start_doc_id),
            map: AHashMap::new(),
        }
    }

    /// Wrap the sealed on-disk representation.
    pub fn open(
        field_name: &str,
        kind: FieldKind,
        cursor: u64,
        log: ValueLog,
        btree: Arc<RwLock<OffsetIndex>>,
    ) -> Self {
        NumberInvert {
            core: InvertCore::sealed(field_name, kind, cursor, log, btree),
            map: AHashMap::new(),
        }
    }

    /// Parse the raw value into its index key, coercing malformed input to
    /// the kind's sentinel.
    fn derive_key(&self, raw: &str) -> i64 {
        match self.core.kind {
            FieldKind::Integer => raw.parse::<i64>().unwrap_or_else(|_| {
                warn!(
                    field = %self.core.field_name,
                    value = raw,
                    "malformed integer, indexing sentinel"
                );
                INTEGER_SENTINEL
            }),
            FieldKind::Float => raw
                .parse::<f64>()
                .map(|value| (value * 100.0).trunc() as i64)
                .unwrap_or_else(|_| {
                    warn!(
                        field = %self.core.field_name,
                        value = raw,
                        "malformed float, indexing sentinel"
                    );
                    FLOAT_SENTINEL
                }),
            FieldKind::Date => parse_date(raw).unwrap_or_else(|_| {
                warn!(
                    field = %self.core.field_name,
                    value = raw,
                    "malformed date, indexing sentinel"
                );
                DATE_SENTINEL
            }),
            kind => {
                warn!(
                    field = %self.core.field_name,
                    ?kind,
                    "non-numeric kind routed to number invert"
                );
                INTEGER_SENTINEL
            }
        }
    }

    /// Credit this doc id under the value's numeric key.
    pub fn add_document(&mut self, doc_id: u64, raw: &str) -> Result<()> {
        self.core.check_append(doc_id)?;
        let key = self.derive_key(raw);
        self.map.entry(key).or_default().insert(doc_id);
        self.core.cursor += 1;
        Ok(())
    }

    /// Advance the append cursor past a document that carries no value for
    /// this field.
    pub fn skip_document(&mut self, doc_id: u64) -> Result<()> {
        self.core.check_append(doc_id)?;
        self.core.cursor += 1;
        Ok(())
    }

    /// Exact-match lookup on the numeric key.
    pub fn query_term(&self, key: i64) -> Result<Option<DocIdSet>> {
        if self.core.resident {
            return Ok(self.map.get(&key).cloned());
        }
        self.core.read_sealed(&encode_i64_key(key))
    }

    /// Union of every bucket in `[min, max]`. An empty window yields an
    /// empty set, not an error.
    pub fn query_range(&self, min: i64, max: i64) -> Result<DocIdSet> {
        let mut result = DocIdSet::new();
        if min > max {
            return Ok(result);
        }
        if self.core.resident {
            for (key, set) in &self.map {
                if *key >= min && *key <= max {
                    result.union_with(set);
                }
            }
            return Ok(result);
        }
        let (Some(log), Some(btree)) = (&self.core.log, &self.core.btree) else {
            return Ok(result);
        };
        let offsets = btree
            .read()
            .range_scan(&self.core.partition, &encode_i64_key(min), &encode_i64_key(max));
        for offset in offsets {
            let bytes = log.read(offset)?;
            result.union_with(&DocIdSet::from_bytes(&bytes)?);
        }
        Ok(result)
    }

    /// Smallest key in the sealed index, if any. Resident inverts do not
    /// support key iteration.
    pub fn first_key(&self) -> Option<(i64, u64)> {
        let btree = self.core.btree.as_ref()?;
        let (key, value) = btree.read().first(&self.core.partition)?;
        Some((crate::storage::decode_i64_key(&key)?, value))
    }

    /// Strict successor of `key` in the sealed index, if any.
    pub fn next_key_after(&self, key: i64) -> Option<(i64, u64)> {
        let btree = self.core.btree.as_ref()?;
        let (key, value) = btree.read().next_after(&self.core.partition, &encode_i64_key(key))?;
        Some((crate::storage::decode_i64_key(&key)?, value))
    }

    /// Flush every bucket's bitmap into `log_path` and record offsets in
    /// `btree`. One-shot.
    pub fn seal(&mut self, log_path: &std::path::Path, btree: &mut OffsetIndex) -> Result<()> {
        self.core.check_sealable()?;
        let mut log = ValueLog::create(log_path)?;
        btree.create_partition(&self.core.partition);
        for (key, set) in &self.map {
            let offset = log.append(&set.to_bytes())?;
            btree.put(&self.core.partition, encode_i64_key(*key), offset)?;
        }
        log.sync()?;
        self.core.log = Some(log);
        self.map = AHashMap::new();
        self.core.resident = false;
        Ok(())
    }

    /// Hand the invert the committed offset index of its segment.
    pub fn attach_btree(&mut self, btree: Arc<RwLock<OffsetIndex>>) {
        self.core.btree = Some(btree);
    }

    /// Next doc id this invert will accept.
    pub fn cursor(&self) -> u64 {
        self.core.cursor
    }
}

/// Parse one of the three supported date literal layouts into a Unix
/// timestamp: `YYYY-MM-DD`, `YYYY-MM-DD HH:MM`, `YYYY-MM-DD HH:MM:SS`.
pub fn parse_date(raw: &str) -> Result<i64> {
    let stamp = if raw.len() > 16 {
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
            .map_err(|e| XiphosError::parse(format!("invalid date time {raw:?}: {e}")))?
    } else if raw.len() > 10 {
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M")
            .map_err(|e| XiphosError::parse(format!("invalid date time {raw:?}: {e}")))?
    } else {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|e| XiphosError::parse(format!("invalid date {raw:?}: {e}")))?
            .and_time(NaiveTime::MIN)
    };
    Ok(stamp.and_utc().timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::SimpleTokenizer;
    use tempfile::TempDir;

    fn tokenizer() -> Arc<dyn Tokenizer> {
        Arc::new(SimpleTokenizer::new())
    }

    #[test]
    fn test_exact_text_single_term() {
        let mut invert = TextInvert::new("name", FieldKind::ExactText, 0, tokenizer());
        invert.add_document(0, "Alice Smith").unwrap();

        // The whole raw string is the sole term, case preserved.
        let set = invert.query_term("Alice Smith").unwrap().unwrap();
        assert!(set.contains(0));
        assert!(invert.query_term("alice").unwrap().is_none());
    }

    #[test]
    fn test_tokenized_text_fans_out() {
        let mut invert = TextInvert::new("body", FieldKind::TokenizedText, 0, tokenizer());
        invert.add_document(0, "The Quick Fox").unwrap();
        invert.add_document(1, "quick dog").unwrap();

        let set = invert.query_term("quick").unwrap().unwrap();
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![0, 1]);
        assert!(invert.query_term("the").unwrap().is_none());
    }

    #[test]
    fn test_out_of_order_doc_id_rejected() {
        let mut invert = TextInvert::new("name", FieldKind::ExactText, 0, tokenizer());
        invert.add_document(0, "a").unwrap();

        let err = invert.add_document(5, "b").unwrap_err();
        assert!(matches!(err, XiphosError::OutOfOrder { expected: 1, got: 5 }));
    }

    #[test]
    fn test_skip_advances_cursor() {
        let mut invert = TextInvert::new("name", FieldKind::ExactText, 0, tokenizer());
        invert.add_document(0, "a").unwrap();
        invert.skip_document(1).unwrap();
        invert.add_document(2, "b").unwrap();
        assert_eq!(invert.cursor(), 3);
    }

    #[test]
    fn test_number_parsing_and_sentinels() {
        let mut ages = NumberInvert::new("age", FieldKind::Integer, 0);
        ages.add_document(0, "30").unwrap();
        ages.add_document(1, "not a number").unwrap();
        assert!(ages.query_term(30).unwrap().unwrap().contains(0));
        assert!(ages.query_term(INTEGER_SENTINEL).unwrap().unwrap().contains(1));

        let mut prices = NumberInvert::new("price", FieldKind::Float, 0);
        prices.add_document(0, "19.99").unwrap();
        prices.add_document(1, "banana").unwrap();
        assert!(prices.query_term(1999).unwrap().unwrap().contains(0));
        assert!(prices.query_term(FLOAT_SENTINEL).unwrap().unwrap().contains(1));
    }

    #[test]
    fn test_date_layouts() {
        assert_eq!(parse_date("1970-01-01").unwrap(), 0);
        assert_eq!(parse_date("1970-01-01 00:01").unwrap(), 60);
        assert_eq!(parse_date("1970-01-01 00:00:30").unwrap(), 30);
        assert!(parse_date("not a date").is_err());

        let mut days = NumberInvert::new("day", FieldKind::Date, 0);
        days.add_document(0, "2024-05-01").unwrap();
        days.add_document(1, "nonsense").unwrap();
        let key = parse_date("2024-05-01").unwrap();
        assert!(days.query_term(key).unwrap().unwrap().contains(0));
        assert!(days.query_term(DATE_SENTINEL).unwrap().unwrap().contains(1));
    }

    #[test]
    fn test_query_range_resident() {
        let mut ages = NumberInvert::new("age", FieldKind::Integer, 0);
        for (doc_id, age) in ["5", "15", "25", "35"].iter().enumerate() {
            ages.add_document(doc_id as u64, age).unwrap();
        }
        let set = ages.query_range(10, 30).unwrap();
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![1, 2]);

        assert!(ages.query_range(100, 200).unwrap().is_empty());
        assert!(ages.query_range(30, 10).unwrap().is_empty());
    }

    #[test]
    fn test_seal_round_trip_text() {
        let dir = TempDir::new().unwrap();
        let mut invert = TextInvert::new("name", FieldKind::ExactText, 0, tokenizer());
        invert.add_document(0, "alice").unwrap();
        invert.add_document(1, "bob").unwrap();
        invert.add_document(2, "alice").unwrap();

        let before = invert.query_term("alice").unwrap().unwrap();

        let mut btree = OffsetIndex::create(dir.path().join("seg.bt"));
        invert.seal(&dir.path().join("name_invert.idx"), &mut btree).unwrap();
        btree.commit().unwrap();
        invert.attach_btree(Arc::new(RwLock::new(btree)));

        let after = invert.query_term("alice").unwrap().unwrap();
        assert_eq!(before, after);
        assert!(invert.query_term("carol").unwrap().is_none());
    }

    #[test]
    fn test_seal_round_trip_number_range() {
        let dir = TempDir::new().unwrap();
        let mut ages = NumberInvert::new("age", FieldKind::Integer, 0);
        for (doc_id, age) in ["5", "15", "25"].iter().enumerate() {
            ages.add_document(doc_id as u64, age).unwrap();
        }
        let before = ages.query_range(0, 20).unwrap();

        let mut btree = OffsetIndex::create(dir.path().join("seg.bt"));
        ages.seal(&dir.path().join("age_invert.idx"), &mut btree).unwrap();
        btree.commit().unwrap();
        ages.attach_btree(Arc::new(RwLock::new(btree)));

        let after = ages.query_range(0, 20).unwrap();
        assert_eq!(before, after);

        // Key iteration only works against the sealed representation.
        assert_eq!(ages.first_key().map(|(k, _)| k), Some(5));
        assert_eq!(ages.next_key_after(5).map(|(k, _)| k), Some(15));
        assert_eq!(ages.next_key_after(25), None);
    }

    #[test]
    fn test_seal_twice_is_an_error() {
        let dir = TempDir::new().unwrap();
        let mut invert = TextInvert::new("name", FieldKind::ExactText, 0, tokenizer());
        invert.add_document(0, "a").unwrap();

        let mut btree = OffsetIndex::create(dir.path().join("seg.bt"));
        invert.seal(&dir.path().join("name_invert.idx"), &mut btree).unwrap();
        assert!(invert.seal(&dir.path().join("name_invert.idx"), &mut btree).is_err());
        assert!(invert.add_document(1, "b").is_err());
    }
}
