//! `BinSearchDb` — the NSRL/md5sum/HashKeeper/EnCase variant (spec.md §4.1,
//! §4.3). Wraps a source text/binary database plus its lazily-opened
//! `.idx`/`.idx2` index files behind a single non-reentrant lock
//! (spec.md §5; Design Notes §9 on why the original's recursive mutex
//! becomes a plain `Mutex` here: public methods never call each other
//! while holding the guard).

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{HdbError, HdbResult};
use crate::format::{encase, hashkeeper, md5sum, nsrl, HashKind, SourceKind};
use crate::index::builder::build_index;
use crate::index::reader::IndexReader;
use crate::index::{index_path, IndexStats};
use crate::path::display_name;

use super::{CallbackControl, HashInfo, LookupCallback, LookupMode, LookupOutcome};

/// Lazily-opened per-hash-kind index reader state, guarded by the handle's
/// lock (spec.md §5: "the first `lookup` opens the index file ... the
/// mutex also guards lazy initialization").
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

/// Walk consecutive lines starting at `start`, parsing each with `parse`,
/// and collect names for as long as the parsed hash keeps matching `hash`
/// (case-insensitive). The line at `start` is always accepted regardless
/// of what it parses to, since it is exactly where the index says the hash
/// lives; a parse failure there falls back to a single empty name so the
/// caller always gets one entry per matched record.
fn forward_scan_names<F>(bytes: &[u8], start: u64, hash: &str, mut parse: F) -> Vec<String>
where
    F: FnMut(&[u8], u64) -> Option<(String, Option<String>)>,
{
    let mut names = Vec::new();
    let mut pos = start as usize;
    while pos < bytes.len() {
        let line_end = bytes[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|i| pos + i)
            .unwrap_or(bytes.len());
        let line = &bytes[pos..line_end];
        match parse(line, pos as u64) {
            Some((h, name)) if names.is_empty() || h.eq_ignore_ascii_case(hash) => {
                names.push(name.unwrap_or_default());
                pos = line_end + 1;
            }
            _ => break,
        }
    }
    if names.is_empty() {
        names.push(String::new());
    }
    names
}

pub struct BinSearchDb {
    source_path: PathBuf,
    source_kind: SourceKind,
    display_name: String,
    readers: Mutex<Readers>,
}

impl BinSearchDb {
    pub fn new(source_path: PathBuf, source_kind: SourceKind) -> Self {
        let display_name = display_name(&source_path.to_string_lossy());
        Self {
            source_path,
            source_kind,
            display_name,
            readers: Mutex::new(Readers::default()),
        }
    }

    pub fn source_path(&self) -> &PathBuf {
        &self.source_path
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn make_index(&mut self, hash_kind: HashKind, memory_budget: usize) -> HdbResult<IndexStats> {
        let stats = build_index(&self.source_path, self.source_kind, hash_kind, memory_budget)?;
        // Invalidate any already-open reader for this hash kind so a
        // freshly rebuilt index is picked up on the next lookup.
        let mut readers = self.readers.lock().unwrap();
        *readers.slot(hash_kind) = None;
        Ok(stats)
    }

    pub fn has_index(&self, hash_kind: HashKind) -> bool {
        if !self.source_kind.supports_hash_kind(hash_kind) {
            return false;
        }
        index_path(&self.source_path, hash_kind).exists()
    }

    fn open_reader<'a>(
        &self,
        readers: &'a mut Readers,
        hash_kind: HashKind,
    ) -> HdbResult<&'a mut IndexReader> {
        let slot = readers.slot(hash_kind);
        if slot.is_none() {
            let idx_path = index_path(&self.source_path, hash_kind);
            let reader = IndexReader::open(&idx_path, hash_kind, Some(self.source_kind))?;
            *slot = Some(reader);
        }
        Ok(slot.as_mut().unwrap())
    }

    fn hash_kind_for(&self, hash: &str) -> HdbResult<HashKind> {
        match hash.len() {
            32 => Ok(HashKind::Md5),
            40 => Ok(HashKind::Sha1),
            _ => Err(HdbError::InvalidHash(hash.to_string())),
        }
    }

    /// Recover every name for a run of consecutive same-hash records
    /// starting at `offset` in the source file. The index stores only the
    /// first occurrence of a run of adjacent identical hashes (`builder.rs`
    /// suppresses the rest at scan time), so a `Full` lookup has to walk
    /// the *source* forward from the matched offset rather than rely on
    /// the index to enumerate duplicates — mirrors the original
    /// `md5sum_getentry`/`nsrl_getentry` (spec.md §4.3.2 step 6).
    fn read_names_at(&self, offset: u64, hash: &str) -> HdbResult<Vec<String>> {
        match self.source_kind {
            SourceKind::Nsrl => {
                let bytes = std::fs::read(&self.source_path)
                    .map_err(|e| HdbError::io("reading NSRL source for verbose lookup", e))?;
                let header_end = memchr::memchr(b'\n', &bytes).unwrap_or(bytes.len());
                let header = &bytes[..header_end];
                let Some(form) = nsrl::classify(header) else {
                    return Ok(vec![String::new()]);
                };
                // The hash's own length tells us which NSRL column is
                // being walked — a 32-char query is an MD5 lookup, a
                // 40-char query is the SHA-1 primary key.
                if hash.len() == HashKind::Md5.hex_len() {
                    Ok(forward_scan_names(&bytes, offset, hash, |line, off| {
                        nsrl::parse_md5_row(line, form, off).map(|e| (e.hash, e.name))
                    }))
                } else {
                    Ok(forward_scan_names(&bytes, offset, hash, |line, off| {
                        nsrl::parse_row(line, form, off).map(|e| (e.hash, e.name))
                    }))
                }
            }
            SourceKind::Md5sum => {
                let bytes = std::fs::read(&self.source_path)
                    .map_err(|e| HdbError::io("reading md5sum source for verbose lookup", e))?;
                Ok(forward_scan_names(&bytes, offset, hash, |line, _| {
                    md5sum::parse_line(line).map(|(h, name)| (h, Some(name)))
                }))
            }
            SourceKind::HashKeeper => {
                let bytes = std::fs::read(&self.source_path)
                    .map_err(|e| HdbError::io("reading HashKeeper source for verbose lookup", e))?;
                Ok(forward_scan_names(&bytes, offset, hash, |line, off| {
                    hashkeeper::parse_row(line, off).map(|e| (e.hash, e.name))
                }))
            }
            SourceKind::Encase => {
                // EnCase records carry no name at all — spec.md §4.2.
                Ok(vec![String::new()])
            }
        }
    }

    pub fn lookup(
        &mut self,
        hash: &str,
        mode: LookupMode,
        cb: &mut LookupCallback<'_>,
    ) -> HdbResult<LookupOutcome> {
        let hash_kind = self.hash_kind_for(hash)?;
        if !self.source_kind.supports_hash_kind(hash_kind) {
            return Err(HdbError::InvalidHash(hash.to_string()));
        }

        let mut readers = self.readers.lock().unwrap();
        let reader = self.open_reader(&mut readers, hash_kind)?;

        match mode {
            LookupMode::Quick => {
                if reader.lookup_quick(hash)? {
                    Ok(LookupOutcome::Found)
                } else {
                    Ok(LookupOutcome::NotFound)
                }
            }
            LookupMode::Full => {
                let hits = reader.lookup_full(hash)?;
                if hits.is_empty() {
                    return Ok(LookupOutcome::NotFound);
                }
                drop(readers);
                // De-dup only against the immediately previous name, not
                // every name seen so far (matches the original's `pname`
                // comparison in `md5sum.c`): a later repeat of an earlier
                // name is still reported.
                let mut prev_name: Option<String> = None;
                'hits: for hit in hits {
                    for name in self.read_names_at(hit.source_offset, hash)? {
                        if prev_name.as_deref() == Some(name.as_str()) {
                            prev_name = Some(name);
                            continue;
                        }
                        prev_name = Some(name.clone());
                        if cb(hash, &name)? == CallbackControl::Stop {
                            break 'hits;
                        }
                    }
                }
                Ok(LookupOutcome::Found)
            }
        }
    }

    pub fn lookup_verbose(&mut self, hash: &str) -> HdbResult<Option<HashInfo>> {
        let hash_kind = self.hash_kind_for(hash)?;
        let mut names = Vec::new();
        let outcome = self.lookup(hash, LookupMode::Full, &mut |_, name| {
            names.push(name.to_string());
            Ok(CallbackControl::Continue)
        })?;
        if outcome == LookupOutcome::NotFound {
            return Ok(None);
        }
        let mut info = HashInfo {
            names,
            ..HashInfo::default()
        };
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
