//! # xiphos
//!
//! A segmented, inverted-index search and storage engine.
//!
//! Documents with typed fields are appended to a resident segment; when the
//! segment fills up or the index closes, it is sealed into an immutable,
//! memory-mapped on-disk form. Queries are boolean term trees combined with
//! numeric window filters, evaluated per segment over doc-id bitmaps, with
//! soft deletes applied through an index-level tombstone set.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use xiphos::analysis::SimpleTokenizer;
//! use xiphos::config::IndexConfig;
//! use xiphos::document::Document;
//! use xiphos::engine::Engine;
//! use xiphos::query::TermQuery;
//! use xiphos::schema::{FieldKind, FieldSpec};
//!
//! # fn main() -> xiphos::error::Result<()> {
//! let engine = Engine::new(
//!     IndexConfig::new("./data"),
//!     Arc::new(SimpleTokenizer::new()),
//! )?;
//!
//! engine.create_index(
//!     "people",
//!     vec![
//!         FieldSpec::new("id", FieldKind::PrimaryKey),
//!         FieldSpec::new("name", FieldKind::ExactText),
//!         FieldSpec::new("age", FieldKind::Integer),
//!     ],
//! )?;
//!
//! let doc = Document::new("a")
//!     .with_field("name", "alice")
//!     .with_field("age", "30");
//! engine.add_document("people", &doc)?;
//!
//! let hits = engine.search("people", &TermQuery::keyword("name", "alice"), &[])?;
//! assert_eq!(hits.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod index;
pub mod query;
pub mod schema;
pub mod segment;
pub mod storage;
pub mod util;

pub use analysis::{SimpleTokenizer, Tokenizer};
pub use config::IndexConfig;
pub use document::Document;
pub use engine::Engine;
pub use error::{Result, XiphosError};
pub use index::Index;
pub use query::{Filter, FilterKind, TermQuery};
pub use schema::{FieldKind, FieldSpec};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
