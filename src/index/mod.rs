//! External binary-search index: file layout, builder, and reader
//! (spec.md §4.3).
//!
//! An index is a flat file of fixed-width records, `<UPPERCASE_HASH>|<16-
//! digit-offset>\n`, sorted by hash, preceded by two pipe-delimited header
//! lines. A companion `.idx2` file holds a 4096-entry index-of-index:
//! offset[bucket] is the position of the first record whose hash starts
//! with the 3 hex nibbles `bucket`, or `NOT_SET` if no record does.

pub mod builder;
pub mod reader;

use std::path::{Path, PathBuf};

use crate::format::HashKind;

pub use builder::{build_index, IndexStats};
pub use reader::{IndexReader, LookupHit, LookupMode};

/// Number of possible 3-nibble hash prefixes: 2^12.
pub const BUCKET_COUNT: usize = 4096;
pub const BUCKET_TABLE_BYTES: usize = BUCKET_COUNT * 8;
pub const NOT_SET: u64 = u64::MAX;

/// Decimal digit width of the offset field in an index record.
pub const OFFSET_DIGITS: usize = 16;

/// Header sentinel strings. Deliberately one character longer than a SHA-1
/// hash (40 hex chars) so they always sort before any real record — taken
/// verbatim from the original binary-search index format.
pub const HEADER_TYPE_SENTINEL: &str =
    "00000000000000000000000000000000000000000";
pub const HEADER_NAME_SENTINEL: &str =
    "00000000000000000000000000000000000000001";

pub fn index_path(source: &Path, hash_kind: HashKind) -> PathBuf {
    let mut s = source.as_os_str().to_owned();
    s.push(hash_kind.idx_suffix());
    PathBuf::from(s)
}

pub fn idx2_path(index_path: &Path) -> PathBuf {
    let mut s = index_path.as_os_str().to_owned();
    s.push("2");
    PathBuf::from(s)
}

/// Per-record line length in bytes: hash digits, a pipe, 16 offset digits,
/// a newline (spec.md §4.3.3: "line length is considered hash_len + 18").
pub const fn record_len(hash_kind: HashKind) -> usize {
    hash_kind.hex_len() + 1 + OFFSET_DIGITS + 1
}
