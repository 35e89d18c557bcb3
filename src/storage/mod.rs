//! Storage primitives: the append-only value log and the offset index that
//! locates records inside it.

pub mod offset_index;
pub mod value_log;

pub use offset_index::{OffsetIndex, decode_i64_key, encode_i64_key, encode_str_key, encode_u64_key};
pub use value_log::ValueLog;
