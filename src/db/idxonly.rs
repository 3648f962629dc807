//! `IndexOnlyDb` — the degenerate variant for when a source database's
//! text/binary file is absent but one or both of its indexes survive
//! (spec.md §4.1, §4.3.3, §9).
//!
//! Behaves like [`super::BinSearchDb`] except: `make_index` always fails
//! with `UnsupportedOperation` (Open Question 2, Design Notes §9 — the
//! canonical behavior, not the silent-success alternative seen in one of
//! the original source files), and every `Full` lookup degrades to
//! `Quick` because there is no source file left to resolve a name from.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{HdbError, HdbResult};
use crate::format::HashKind;
use crate::index::reader::IndexReader;
use crate::index::{index_path, IndexStats};
use crate::path::display_name;

use super::{HashInfo, LookupCallback, LookupMode, LookupOutcome};

#[derive(Default)]
struct Readers {
    md5: Option<IndexReader>,
    sha1: Option<IndexReader>,
}

impl Readers {
    fn slot(&mut self, hash_kind: HashKind) -> &mut Option<IndexReader> {
        match hash_kind {
            HashKind::Md5 => &mut self.md5,
            HashKind::Sha1 => &mut self.sha1,
            HashKind::Sha256 => unreachable!("no text format carries a SHA-256 binary-search index"),
        }
    }
}

pub struct IndexOnlyDb {
    /// The path the caller opened — a source path whose file is missing,
    /// or an index path directly. Index file names are derived from it the
    /// same way `BinSearchDb` derives them from a real source path.
    base_path: PathBuf,
    display_name: String,
    readers: Mutex<Readers>,
}

impl IndexOnlyDb {
    /// Open in index-only mode: tries MD5 first, then SHA-1 (the same
    /// order `idxonly.c`'s `hdb_idxonly_open` probes), per spec.md §9's
    /// "index-only variant with no source".
    pub fn open(base_path: &Path) -> HdbResult<Self> {
        let md5_idx = index_path(base_path, HashKind::Md5);
        let sha1_idx = index_path(base_path, HashKind::Sha1);
        if !md5_idx.exists() && !sha1_idx.exists() {
            return Err(HdbError::MissingFile(base_path.to_path_buf()));
        }

        let display_name = Self::derive_display_name(base_path, &md5_idx, &sha1_idx)?;

        Ok(Self {
            base_path: base_path.to_path_buf(),
            display_name,
            readers: Mutex::new(Readers::default()),
        })
    }

    /// spec.md §4.5: "for text-index-only databases, prefer the name
    /// recorded in the index header's second line; fall back to the
    /// derived name on parse failure."
    fn derive_display_name(base_path: &Path, md5_idx: &Path, sha1_idx: &Path) -> HdbResult<String> {
        for (idx_path, hash_kind) in [(md5_idx, HashKind::Md5), (sha1_idx, HashKind::Sha1)] {
            if idx_path.exists() {
                if let Ok(reader) = IndexReader::open(idx_path, hash_kind, None) {
                    drop(reader);
                    if let Some(name) = read_header_name(idx_path) {
                        return Ok(name);
                    }
                }
            }
        }
        Ok(display_name(&base_path.to_string_lossy()))
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn make_index(&mut self, _hash_kind: HashKind, _memory_budget: usize) -> HdbResult<IndexStats> {
        Err(HdbError::UnsupportedOperation(
            "make_index is not supported on an index-only database (no source file)",
        ))
    }

    pub fn has_index(&self, hash_kind: HashKind) -> bool {
        index_path(&self.base_path, hash_kind).exists()
    }

    fn hash_kind_for(&self, hash: &str) -> HdbResult<HashKind> {
        match hash.len() {
            32 => Ok(HashKind::Md5),
            40 => Ok(HashKind::Sha1),
            _ => Err(HdbError::InvalidHash(hash.to_string())),
        }
    }

    fn open_reader<'a>(
        &self,
        readers: &'a mut Readers,
        hash_kind: HashKind,
    ) -> HdbResult<&'a mut IndexReader> {
        let slot = readers.slot(hash_kind);
        if slot.is_none() {
            let idx_path = index_path(&self.base_path, hash_kind);
            let reader = IndexReader::open(&idx_path, hash_kind, None)?;
            *slot = Some(reader);
        }
        Ok(slot.as_mut().unwrap())
    }

    /// `Full` lookups degrade to `Quick`: the callback is invoked with an
    /// empty name exactly once per spec.md §4.3.3, since there is no
    /// source file to resolve a real one from.
    pub fn lookup(
        &mut self,
        hash: &str,
        mode: LookupMode,
        cb: &mut LookupCallback<'_>,
    ) -> HdbResult<LookupOutcome> {
        let hash_kind = self.hash_kind_for(hash)?;
        let mut readers = self.readers.lock().unwrap();
        let reader = self.open_reader(&mut readers, hash_kind)?;
        let found = reader.lookup_quick(hash)?;
        if !found {
            return Ok(LookupOutcome::NotFound);
        }
        if mode == LookupMode::Full {
            cb(hash, "")?;
        }
        Ok(LookupOutcome::Found)
    }

    pub fn lookup_verbose(&mut self, hash: &str) -> HdbResult<Option<HashInfo>> {
        let hash_kind = self.hash_kind_for(hash)?;
        let outcome = self.lookup(hash, LookupMode::Quick, &mut |_, _| {
            Ok(super::CallbackControl::Continue)
        })?;
        if outcome == LookupOutcome::NotFound {
            return Ok(None);
        }
        let mut info = HashInfo::default();
        match hash_kind {
            HashKind::Md5 => info.md5 = Some(hash.to_ascii_uppercase()),
            HashKind::Sha1 => info.sha1 = Some(hash.to_ascii_uppercase()),
            HashKind::Sha256 => unreachable!(),
        }
        Ok(Some(info))
    }

    pub fn close(self) -> HdbResult<()> {
        Ok(())
    }
}

/// Read just the header's name line out of an already-validated index
/// file, without constructing a full reader (used only to pick a display
/// name, cheap even though it reopens the file).
fn read_header_name(idx_path: &Path) -> Option<String> {
    use std::io::BufRead;
    let file = std::fs::File::open(idx_path).ok()?;
    let mut lines = std::io::BufReader::new(file).lines();
    let _type_line = lines.next()?.ok()?;
    let name_line = lines.next()?.ok()?;
    let (_, name) = name_line.split_once('|')?;
    Some(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::CallbackControl;
    use crate::format::SourceKind;
    use crate::index::builder::build_index;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn opens_from_index_alone_and_quick_lookup_finds() {
        let dir = tempfile::tempdir().unwrap();
        let source = write(
            dir.path(),
            "hashes.md5",
            "D41D8CD98F00B204E9800998ECF8427E  a.txt\n",
        );
        build_index(&source, SourceKind::Md5sum, HashKind::Md5, 0).unwrap();
        std::fs::remove_file(&source).unwrap();

        let mut db = IndexOnlyDb::open(&source).unwrap();
        let outcome = db
            .lookup("D41D8CD98F00B204E9800998ECF8427E", LookupMode::Quick, &mut |_, _| {
                Ok(CallbackControl::Continue)
            })
            .unwrap();
        assert_eq!(outcome, LookupOutcome::Found);
    }

    #[test]
    fn full_lookup_degrades_to_empty_name() {
        let dir = tempfile::tempdir().unwrap();
        let source = write(
            dir.path(),
            "hashes.md5",
            "D41D8CD98F00B204E9800998ECF8427E  a.txt\n",
        );
        build_index(&source, SourceKind::Md5sum, HashKind::Md5, 0).unwrap();
        std::fs::remove_file(&source).unwrap();

        let mut db = IndexOnlyDb::open(&source).unwrap();
        let mut seen = None;
        db.lookup("D41D8CD98F00B204E9800998ECF8427E", LookupMode::Full, &mut |_, name| {
            seen = Some(name.to_string());
            Ok(CallbackControl::Continue)
        })
        .unwrap();
        assert_eq!(seen.as_deref(), Some(""));
    }

    #[test]
    fn make_index_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let source = write(
            dir.path(),
            "hashes.md5",
            "D41D8CD98F00B204E9800998ECF8427E  a.txt\n",
        );
        build_index(&source, SourceKind::Md5sum, HashKind::Md5, 0).unwrap();
        std::fs::remove_file(&source).unwrap();

        let mut db = IndexOnlyDb::open(&source).unwrap();
        let err = db.make_index(HashKind::Md5, 0).unwrap_err();
        assert!(matches!(err, HdbError::UnsupportedOperation(_)));
    }

    #[test]
    fn open_without_any_index_is_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = IndexOnlyDb::open(&dir.path().join("nope.md5")).unwrap_err();
        assert!(matches!(err, HdbError::MissingFile(_)));
    }
}
