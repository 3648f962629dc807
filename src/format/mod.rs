//! Text hash-set format detection and parsing (spec.md §4.2, §6).
//!
//! Four byte-exact formats (NSRL, md5sum, HashKeeper, EnCase) are detected
//! from the first bytes of a file and then walked record-by-record, each
//! record yielding a [`ParsedEntry`]: a hash, an optional name, and the byte
//! offset at which the record starts in the source file — exactly what the
//! binary-search index stores and what a `Full` lookup later seeks back to.

pub mod encase;
pub mod hashkeeper;
pub mod md5sum;
pub mod nsrl;

use crate::error::HdbResult;

/// Selects which hash algorithm an index is built/searched over. Mirrors
/// `TSK_HDB_HTYPE_ENUM` in the original source: MD5 and SHA-1 are the two
/// algorithms a binary-search index can be keyed on; SHA-256 is additional
/// metadata the SQLite backend can store but binary-search indexes are not
/// built over it (no text format here carries a SHA-256 column).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashKind {
    Md5,
    Sha1,
    Sha256,
}

impl HashKind {
    pub const fn hex_len(self) -> usize {
        match self {
            HashKind::Md5 => 32,
            HashKind::Sha1 => 40,
            HashKind::Sha256 => 64,
        }
    }

    pub const fn raw_len(self) -> usize {
        self.hex_len() / 2
    }

    pub const fn name(self) -> &'static str {
        match self {
            HashKind::Md5 => "md5",
            HashKind::Sha1 => "sha1",
            HashKind::Sha256 => "sha2_256",
        }
    }

    /// The `-md5.idx` / `-sha1.idx` file suffix used to derive an index
    /// file's name from its source path (spec.md §4.3.1).
    pub const fn idx_suffix(self) -> &'static str {
        match self {
            HashKind::Md5 => "-md5.idx",
            HashKind::Sha1 => "-sha1.idx",
            HashKind::Sha256 => "-sha2_256.idx",
        }
    }
}

/// Which of the four text formats (or SQLite) a source database is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Nsrl,
    Md5sum,
    HashKeeper,
    Encase,
}

impl SourceKind {
    /// The tag recorded on the index's second header line (spec.md §6).
    pub const fn source_type_tag(self) -> &'static str {
        match self {
            SourceKind::Nsrl => "nsrl",
            SourceKind::Md5sum => "md5sum",
            SourceKind::HashKeeper => "hk",
            SourceKind::Encase => "encase",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "nsrl" => Some(SourceKind::Nsrl),
            "md5sum" => Some(SourceKind::Md5sum),
            "hk" => Some(SourceKind::HashKeeper),
            "encase" => Some(SourceKind::Encase),
            _ => None,
        }
    }

    /// The hash type an index is built over when the caller doesn't pick
    /// one explicitly. EnCase and md5sum/HashKeeper carry only MD5; NSRL's
    /// default is SHA-1, though it also carries an MD5 column and can be
    /// indexed by either (spec.md §4.3.1: "a chosen hash type (MD5 or
    /// SHA-1)") — see [`SourceKind::supports_hash_kind`].
    pub const fn primary_hash_kind(self) -> HashKind {
        match self {
            SourceKind::Nsrl => HashKind::Sha1,
            SourceKind::Md5sum | SourceKind::HashKeeper | SourceKind::Encase => HashKind::Md5,
        }
    }

    /// Whether this source format's text records carry the given hash type
    /// at all. NSRL carries both SHA-1 (primary key) and MD5 columns; the
    /// other three formats carry only MD5.
    pub const fn supports_hash_kind(self, hash_kind: HashKind) -> bool {
        match self {
            SourceKind::Nsrl => matches!(hash_kind, HashKind::Sha1 | HashKind::Md5),
            SourceKind::Md5sum | SourceKind::HashKeeper | SourceKind::Encase => {
                matches!(hash_kind, HashKind::Md5)
            }
        }
    }
}

/// A single decoded record from a text hash-set source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEntry {
    /// Upper-case hex hash, exactly `hash_len` characters.
    pub hash: String,
    pub name: Option<String>,
    /// Byte offset of the start of this record in the source file.
    pub offset: u64,
}

/// Sniff the first bytes of a file and identify which text format (if any)
/// it is. Returns `None` if no detector claims it (the caller then tries
/// the SQLite signature check, per spec.md §4.1's detector order).
pub fn sniff(first_bytes: &[u8]) -> Option<SourceKind> {
    if encase::sniff(first_bytes) {
        Some(SourceKind::Encase)
    } else if nsrl::sniff(first_bytes) {
        Some(SourceKind::Nsrl)
    } else if md5sum::sniff(first_bytes) {
        Some(SourceKind::Md5sum)
    } else if hashkeeper::sniff(first_bytes) {
        Some(SourceKind::HashKeeper)
    } else {
        None
    }
}

/// Split a CSV line into its top-level comma-separated fields, honoring
/// double-quoted fields (a comma inside quotes does not split). Surrounding
/// quotes are stripped from each returned field. Used by the NSRL and
/// HashKeeper parsers, both of which are fully-quoted CSV.
pub(crate) fn split_quoted_csv(line: &[u8]) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = Vec::new();
    let mut in_quotes = false;
    let mut i = 0;
    while i < line.len() {
        let b = line[i];
        match b {
            b'"' => in_quotes = !in_quotes,
            b',' if !in_quotes => {
                fields.push(String::from_utf8_lossy(&field).into_owned());
                field.clear();
            }
            _ => field.push(b),
        }
        i += 1;
    }
    fields.push(String::from_utf8_lossy(&field).into_owned());
    fields
}

/// Count of lines that failed format validation during a scan — spec.md §7:
/// "lines that fail format validation during index build ... counted and
/// reported at the end", never an abort.
#[derive(Debug, Default, Clone, Copy)]
pub struct FormatErrorCount(pub usize);

/// Shared contract for reading a single record back out of a source file at
/// a known byte offset, used to resolve a name during a `Full` lookup.
pub trait RecordAt {
    fn read_record_at(path: &std::path::Path, offset: u64) -> HdbResult<ParsedEntry>;
}
