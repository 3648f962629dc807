//! Polymorphic handle & lifecycle (spec.md §4.1, §5, §9).
//!
//! `HashDb` is a sum type over the five concrete backends instead of the
//! original's vtable-through-function-pointers inheritance (Design Notes
//! §9: "maps cleanly to a sum type with one variant per backend ... avoid
//! inheritance, avoid downcasts"). Every public operation dispatches via a
//! single `match` and never reaches for a trait object.

pub mod binsearch;
pub mod idxonly;
pub mod sqlite;

use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::{HdbError, HdbResult};
use crate::format::HashKind;
use crate::index::IndexStats;

pub use binsearch::BinSearchDb;
pub use idxonly::IndexOnlyDb;
pub use sqlite::SqliteDb;

/// `Quick` proves presence only; `Full` additionally resolves every
/// associated name via the per-match callback (spec.md §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupMode {
    Quick,
    Full,
}

/// Whether the hash is known. `Full` lookups that find nothing still
/// return `NotFound`, same as `Quick`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupOutcome {
    Found,
    NotFound,
}

/// A callback's answer to "keep walking duplicate matches?" — replaces the
/// source's cross-module C++ exception with a typed tri-state a caller can
/// use to stop iteration without erroring (Design Notes §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackControl {
    Continue,
    Stop,
}

/// Per-match callback signature for `Full` lookups: `(hash, name)`.
pub type LookupCallback<'a> = dyn FnMut(&str, &str) -> HdbResult<CallbackControl> + 'a;

/// Everything `lookup_verbose` can return about a known hash (spec.md §4.1,
/// scenario 4 in §8).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashInfo {
    pub id: Option<i64>,
    pub md5: Option<String>,
    pub sha1: Option<String>,
    pub sha256: Option<String>,
    pub names: Vec<String>,
    pub comments: Vec<String>,
}

/// Flags accepted by [`open`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenFlags {
    /// Construct an [`IndexOnlyDb`] even if the source file is present.
    pub index_only: bool,
    /// If the source file is absent, fall back to index-only instead of
    /// returning `MissingFile` (spec.md §8: "Source file missing, index
    /// present -> open with index-only flag succeeds").
    pub best_effort: bool,
}

/// The five concrete backends behind the single public capability surface
/// (spec.md §4.1's operation table), selected on `open` and never changed
/// for the life of a handle.
pub enum HashDb {
    BinSearch(BinSearchDb),
    IndexOnly(IndexOnlyDb),
    Sqlite(SqliteDb),
}

const SQLITE_MAGIC: &[u8; 16] = b"SQLite format 3\0";
/// Sniffing EnCase requires the full fixed header; everything else only
/// needs a handful of leading bytes, but reading this much up front means
/// exactly one file read per `open` regardless of which detector matches.
const SNIFF_WINDOW: usize = 4096;

fn read_sniff_window(path: &Path) -> HdbResult<Vec<u8>> {
    let mut file =
        std::fs::File::open(path).map_err(|e| HdbError::io("opening database for sniffing", e))?;
    let mut buf = vec![0u8; SNIFF_WINDOW];
    let mut total = 0;
    loop {
        let n = file
            .read(&mut buf[total..])
            .map_err(|e| HdbError::io("reading database header", e))?;
        if n == 0 {
            break;
        }
        total += n;
        if total == buf.len() {
            break;
        }
    }
    buf.truncate(total);
    Ok(buf)
}

/// Detect which of the five backends `path` is and construct the matching
/// handle. Detector order (spec.md §4.1): SQLite signature, NSRL header,
/// md5sum first line, EnCase magic, HashKeeper CSV header. Exactly one
/// detector must claim the file, or `UnknownType` is returned.
pub fn open(path: impl AsRef<Path>, flags: OpenFlags) -> HdbResult<HashDb> {
    let path = path.as_ref();

    if !path.exists() {
        if flags.best_effort || flags.index_only {
            return IndexOnlyDb::open(path).map(HashDb::IndexOnly);
        }
        return Err(HdbError::MissingFile(path.to_path_buf()));
    }

    if flags.index_only {
        return IndexOnlyDb::open(path).map(HashDb::IndexOnly);
    }

    let window = read_sniff_window(path)?;

    if window.len() >= SQLITE_MAGIC.len() && &window[..SQLITE_MAGIC.len()] == SQLITE_MAGIC {
        return SqliteDb::open(path).map(HashDb::Sqlite);
    }

    if let Some(source_kind) = crate::format::sniff(&window) {
        return Ok(HashDb::BinSearch(BinSearchDb::new(
            path.to_path_buf(),
            source_kind,
        )));
    }

    Err(HdbError::UnknownType)
}

impl HashDb {
    pub fn make_index(&mut self, hash_kind: HashKind, memory_budget: usize) -> HdbResult<IndexStats> {
        match self {
            HashDb::BinSearch(db) => db.make_index(hash_kind, memory_budget),
            HashDb::IndexOnly(db) => db.make_index(hash_kind, memory_budget),
            HashDb::Sqlite(_) => Err(HdbError::UnsupportedOperation(
                "make_index is not supported on the SQLite backend",
            )),
        }
    }

    pub fn has_index(&self, hash_kind: HashKind) -> bool {
        match self {
            HashDb::BinSearch(db) => db.has_index(hash_kind),
            HashDb::IndexOnly(db) => db.has_index(hash_kind),
            HashDb::Sqlite(_) => false,
        }
    }

    pub fn lookup(
        &mut self,
        hash: &str,
        mode: LookupMode,
        cb: &mut LookupCallback<'_>,
    ) -> HdbResult<LookupOutcome> {
        match self {
            HashDb::BinSearch(db) => db.lookup(hash, mode, cb),
            HashDb::IndexOnly(db) => db.lookup(hash, mode, cb),
            HashDb::Sqlite(db) => db.lookup(hash, mode, cb),
        }
    }

    pub fn lookup_verbose(&mut self, hash: &str) -> HdbResult<Option<HashInfo>> {
        match self {
            HashDb::BinSearch(db) => db.lookup_verbose(hash),
            HashDb::IndexOnly(db) => db.lookup_verbose(hash),
            HashDb::Sqlite(db) => db.lookup_verbose(hash),
        }
    }

    pub fn accepts_updates(&self) -> bool {
        matches!(self, HashDb::Sqlite(_))
    }

    pub fn add_entry(
        &mut self,
        filename: Option<&str>,
        md5: &str,
        sha1: Option<&str>,
        sha256: Option<&str>,
        comment: Option<&str>,
    ) -> HdbResult<()> {
        match self {
            HashDb::Sqlite(db) => db.add_entry(filename, md5, sha1, sha256, comment),
            _ => Err(HdbError::UnsupportedOperation(
                "add_entry is only supported on the SQLite backend",
            )),
        }
    }

    pub fn begin_transaction(&mut self) -> HdbResult<()> {
        match self {
            HashDb::Sqlite(db) => db.begin_transaction(),
            _ => Err(HdbError::UnsupportedOperation(
                "transactions are only supported on the SQLite backend",
            )),
        }
    }

    pub fn commit_transaction(&mut self) -> HdbResult<()> {
        match self {
            HashDb::Sqlite(db) => db.commit_transaction(),
            _ => Err(HdbError::UnsupportedOperation(
                "transactions are only supported on the SQLite backend",
            )),
        }
    }

    pub fn rollback_transaction(&mut self) -> HdbResult<()> {
        match self {
            HashDb::Sqlite(db) => db.rollback_transaction(),
            _ => Err(HdbError::UnsupportedOperation(
                "transactions are only supported on the SQLite backend",
            )),
        }
    }

    pub fn close(self) -> HdbResult<()> {
        match self {
            HashDb::BinSearch(db) => db.close(),
            HashDb::IndexOnly(db) => db.close(),
            HashDb::Sqlite(db) => db.close(),
        }
    }

    /// The display name derived from the handle's path (spec.md §4.5).
    pub fn display_name(&self) -> &str {
        match self {
            HashDb::BinSearch(db) => db.display_name(),
            HashDb::IndexOnly(db) => db.display_name(),
            HashDb::Sqlite(db) => db.display_name(),
        }
    }

    pub fn source_path(&self) -> Option<&PathBuf> {
        match self {
            HashDb::BinSearch(db) => Some(db.source_path()),
            HashDb::IndexOnly(_) => None,
            HashDb::Sqlite(db) => Some(db.source_path()),
        }
    }
}

#[cfg(test)]
mod scenarios;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::HashKind;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn open_detects_md5sum_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "hashes.md5",
            "D41D8CD98F00B204E9800998ECF8427E  a.txt\n",
        );
        let db = open(&path, OpenFlags::default()).unwrap();
        assert!(matches!(db, HashDb::BinSearch(_)));
        assert_eq!(db.display_name(), "hashes.md5");
    }

    #[test]
    fn open_rejects_unrecognized_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "junk.bin", "not a known hash-set format at all\n");
        let err = open(&path, OpenFlags::default()).unwrap_err();
        assert!(matches!(err, HdbError::UnknownType));
    }

    #[test]
    fn open_missing_file_without_best_effort_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.md5");
        let err = open(&path, OpenFlags::default()).unwrap_err();
        assert!(matches!(err, HdbError::MissingFile(_)));
    }

    #[test]
    fn open_missing_file_with_best_effort_is_index_only() {
        let dir = tempfile::tempdir().unwrap();
        let source = write(
            dir.path(),
            "hashes.md5",
            "D41D8CD98F00B204E9800998ECF8427E  a.txt\n",
        );
        let mut db = open(&source, OpenFlags::default()).unwrap();
        db.make_index(HashKind::Md5, 0).unwrap();
        std::fs::remove_file(&source).unwrap();

        let db = open(&source, OpenFlags { best_effort: true, ..Default::default() }).unwrap();
        assert!(matches!(db, HashDb::IndexOnly(_)));
    }
}
