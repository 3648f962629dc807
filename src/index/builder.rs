//! Index builder (spec.md §4.3.1).
//!
//! Scans a source database in its native format, emitting `(hash, offset)`
//! pairs with adjacent-duplicate suppression applied in *scan order* (not
//! sorted order — this mirrors the original `*_makeindex` functions, which
//! compare each entry only against the single most recently emitted hash).
//! The surviving entries are fed through [`crate::mergesort`] and written
//! out as a sorted index file plus its `.idx2` index-of-index.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::common::io::read_file_bytes;
use crate::error::{HdbError, HdbResult};
use crate::format::{encase, hashkeeper, md5sum, nsrl, HashKind, SourceKind};
use crate::mergesort::core::default_temp_dir;
use crate::mergesort::{ExternalSorter, SortEntry, DEFAULT_MEMORY_BUDGET};
use crate::path::display_name;

use super::{
    idx2_path, index_path, record_len, BUCKET_COUNT, BUCKET_TABLE_BYTES, HEADER_NAME_SENTINEL,
    HEADER_TYPE_SENTINEL, NOT_SET, OFFSET_DIGITS,
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IndexStats {
    pub records_written: u64,
    pub duplicates_skipped: u64,
    pub format_errors: u64,
}

/// Accumulates `(hash, offset)` pairs into the external sorter, applying
/// consecutive-duplicate suppression against the previously pushed hash.
struct Collector<'a> {
    sorter: &'a mut ExternalSorter,
    stats: IndexStats,
    prev_hash: Option<String>,
    seq: u64,
}

impl<'a> Collector<'a> {
    fn new(sorter: &'a mut ExternalSorter) -> Self {
        Self {
            sorter,
            stats: IndexStats::default(),
            prev_hash: None,
            seq: 0,
        }
    }

    fn push(&mut self, hash: String, offset: u64) -> HdbResult<()> {
        if self.prev_hash.as_deref() == Some(hash.as_str()) {
            self.stats.duplicates_skipped += 1;
            return Ok(());
        }
        self.sorter
            .push(SortEntry {
                hash: hash.clone(),
                offset,
                seq: self.seq,
            })
            .map_err(|e| HdbError::io("writing merge-sort run", e))?;
        self.seq += 1;
        self.stats.records_written += 1;
        self.prev_hash = Some(hash);
        Ok(())
    }

    fn format_error(&mut self) {
        self.stats.format_errors += 1;
    }
}

/// Build a `.idx`/`.idx2` pair for `source_path`, keyed on `hash_kind`.
/// `memory_budget` bounds the size of each in-memory sort run before it
/// spills to a temp file (0 selects [`DEFAULT_MEMORY_BUDGET`]).
pub fn build_index(
    source_path: &Path,
    source_kind: SourceKind,
    hash_kind: HashKind,
    memory_budget: usize,
) -> HdbResult<IndexStats> {
    if !source_kind.supports_hash_kind(hash_kind) {
        return Err(HdbError::UnsupportedOperation(
            "this source format does not carry the requested hash type",
        ));
    }

    let budget = if memory_budget == 0 {
        DEFAULT_MEMORY_BUDGET
    } else {
        memory_budget
    };
    let mut sorter =
        ExternalSorter::new(default_temp_dir(source_path)).with_memory_budget(budget);

    let stats = {
        let mut collector = Collector::new(&mut sorter);
        match source_kind {
            SourceKind::Nsrl => scan_nsrl(source_path, hash_kind, &mut collector)?,
            SourceKind::Md5sum => scan_md5sum(source_path, &mut collector)?,
            SourceKind::HashKeeper => scan_hashkeeper(source_path, &mut collector)?,
            SourceKind::Encase => scan_encase(source_path, &mut collector)?,
        }
        collector.stats
    };

    tracing::debug!(
        source = %source_path.display(),
        records = stats.records_written,
        duplicates = stats.duplicates_skipped,
        format_errors = stats.format_errors,
        "scanned source database"
    );

    if stats.records_written == 0 {
        tracing::error!(source = %source_path.display(), "make_index aborted: no valid hash records found");
        return Err(HdbError::Corrupt(format!(
            "{}: no valid hash records found",
            source_path.display()
        )));
    }

    write_index(source_path, source_kind, hash_kind, sorter, &stats)?;
    Ok(stats)
}

fn scan_nsrl(source_path: &Path, hash_kind: HashKind, collector: &mut Collector) -> HdbResult<()> {
    let file = File::open(source_path).map_err(|e| HdbError::io("opening NSRL source", e))?;
    let mut entries = nsrl::NsrlEntries::new(BufReader::new(file), hash_kind);
    loop {
        match entries.next() {
            None => break,
            Some(Err(e)) => return Err(HdbError::io("reading NSRL source", e)),
            Some(Ok(None)) => collector.format_error(),
            Some(Ok(Some(entry))) => collector.push(entry.hash, entry.offset)?,
        }
    }
    Ok(())
}

fn scan_md5sum(source_path: &Path, collector: &mut Collector) -> HdbResult<()> {
    let file = File::open(source_path).map_err(|e| HdbError::io("opening md5sum source", e))?;
    let mut entries = md5sum::Md5sumEntries::new(BufReader::new(file));
    loop {
        match entries.next() {
            None => break,
            Some(Err(e)) => return Err(HdbError::io("reading md5sum source", e)),
            Some(Ok(None)) => collector.format_error(),
            Some(Ok(Some(entry))) => collector.push(entry.hash, entry.offset)?,
        }
    }
    Ok(())
}

fn scan_hashkeeper(source_path: &Path, collector: &mut Collector) -> HdbResult<()> {
    let file = File::open(source_path).map_err(|e| HdbError::io("opening HashKeeper source", e))?;
    let mut entries = hashkeeper::HashKeeperEntries::new(BufReader::new(file));
    loop {
        match entries.next() {
            None => break,
            Some(Err(e)) => return Err(HdbError::io("reading HashKeeper source", e)),
            Some(Ok(None)) => collector.format_error(),
            Some(Ok(Some(entry))) => collector.push(entry.hash, entry.offset)?,
        }
    }
    Ok(())
}

fn scan_encase(source_path: &Path, collector: &mut Collector) -> HdbResult<()> {
    let buf = read_file_bytes(source_path).map_err(|e| HdbError::io("reading EnCase source", e))?;
    encase::validate_header(&buf)?;
    for record in encase::EncaseRecords::new(&buf) {
        collector.push(record.md5_hex, record.offset)?;
    }
    Ok(())
}

fn write_index(
    source_path: &Path,
    source_kind: SourceKind,
    hash_kind: HashKind,
    sorter: ExternalSorter,
    stats: &IndexStats,
) -> HdbResult<()> {
    let idx_path = index_path(source_path, hash_kind);
    let file = File::create(&idx_path).map_err(|e| HdbError::io("creating index file", e))?;
    let mut w = BufWriter::new(file);

    let type_line = format!("{HEADER_TYPE_SENTINEL}|{}\n", source_kind.source_type_tag());
    let name = display_name(&source_path.to_string_lossy());
    let name_line = format!("{HEADER_NAME_SENTINEL}|{name}\n");
    w.write_all(type_line.as_bytes())
        .map_err(|e| HdbError::io("writing index header", e))?;
    w.write_all(name_line.as_bytes())
        .map_err(|e| HdbError::io("writing index header", e))?;

    let record_width = record_len(hash_kind) as u64;
    let mut pos = (type_line.len() + name_line.len()) as u64;
    let mut buckets = vec![NOT_SET; BUCKET_COUNT];
    let mut itoa_buf = itoa::Buffer::new();

    let merged = sorter
        .finish()
        .map_err(|e| HdbError::io("merging sort runs", e))?;
    let mut written = 0u64;
    for entry in merged {
        let entry = entry.map_err(|e| HdbError::io("reading merged sort run", e))?;
        let printed = itoa_buf.format(entry.offset);
        let pad = OFFSET_DIGITS.saturating_sub(printed.len());

        w.write_all(entry.hash.as_bytes())
            .map_err(|e| HdbError::io("writing index record", e))?;
        w.write_all(b"|")
            .map_err(|e| HdbError::io("writing index record", e))?;
        for _ in 0..pad {
            w.write_all(b"0")
                .map_err(|e| HdbError::io("writing index record", e))?;
        }
        w.write_all(printed.as_bytes())
            .map_err(|e| HdbError::io("writing index record", e))?;
        w.write_all(b"\n")
            .map_err(|e| HdbError::io("writing index record", e))?;

        if let Ok(bucket) = u16::from_str_radix(&entry.hash[..3], 16) {
            let bucket = bucket as usize;
            if buckets[bucket] == NOT_SET {
                buckets[bucket] = pos;
            }
        }
        pos += record_width;
        written += 1;
    }
    w.flush().map_err(|e| HdbError::io("flushing index file", e))?;
    debug_assert_eq!(written, stats.records_written);

    write_idx2(&idx2_path(&idx_path), &buckets)
}

fn write_idx2(path: &Path, buckets: &[u64]) -> HdbResult<()> {
    debug_assert_eq!(buckets.len(), BUCKET_COUNT);
    let mut raw = Vec::with_capacity(BUCKET_TABLE_BYTES);
    for &offset in buckets {
        raw.extend_from_slice(&offset.to_le_bytes());
    }
    let file = File::create(path).map_err(|e| HdbError::io("creating index-of-index file", e))?;
    let mut w = BufWriter::new(file);
    w.write_all(&raw)
        .map_err(|e| HdbError::io("writing index-of-index file", e))?;
    w.flush()
        .map_err(|e| HdbError::io("flushing index-of-index file", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn write_source(dir: &std::path::Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn builds_md5sum_index_with_duplicate_suppression() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_source(
            dir.path(),
            "hashes.md5",
            "D41D8CD98F00B204E9800998ECF8427E  a.txt\nD41D8CD98F00B204E9800998ECF8427E  a2.txt\nAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA  b.txt\n",
        );
        let stats = build_index(&source, SourceKind::Md5sum, HashKind::Md5, 0).unwrap();
        assert_eq!(stats.records_written, 2);
        assert_eq!(stats.duplicates_skipped, 1);

        let idx_path = index_path(&source, HashKind::Md5);
        let mut content = String::new();
        File::open(&idx_path).unwrap().read_to_string(&mut content).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], format!("{HEADER_TYPE_SENTINEL}|md5sum"));
        assert!(lines[1].starts_with(HEADER_NAME_SENTINEL));
        assert_eq!(lines.len(), 4);
        assert!(lines[2] < lines[3]);

        let idx2 = std::fs::read(idx2_path(&idx_path)).unwrap();
        assert_eq!(idx2.len(), BUCKET_TABLE_BYTES);
    }

    #[test]
    fn rejects_wrong_hash_kind_for_format() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_source(dir.path(), "hashes.md5", "D41D8CD98F00B204E9800998ECF8427E  a.txt\n");
        let err = build_index(&source, SourceKind::Md5sum, HashKind::Sha1, 0).unwrap_err();
        assert!(matches!(err, HdbError::UnsupportedOperation(_)));
    }

    #[test]
    fn builds_nsrl_index_keyed_on_md5_column() {
        let dir = tempfile::tempdir().unwrap();
        let data = concat!(
            "\"SHA-1\",\"FileName\",\"FileSize\",\"ProductCode\",\"OpSystemCode\",\"MD4\",\"MD5\",\"CRC32\",\"SpecialCode\"\n",
            "\"DA39A3EE5E6B4B0D3255BFEF95601890AFD80709\",\"empty.txt\",\"0\",\"1\",\"1\",\"\",\"D41D8CD98F00B204E9800998ECF8427E\",\"0\",\"\"\n",
        );
        let source = write_source(dir.path(), "nsrl.txt", data);
        let stats = build_index(&source, SourceKind::Nsrl, HashKind::Md5, 0).unwrap();
        assert_eq!(stats.records_written, 1);

        let idx_path = index_path(&source, HashKind::Md5);
        let mut content = String::new();
        File::open(&idx_path).unwrap().read_to_string(&mut content).unwrap();
        assert!(content.contains("D41D8CD98F00B204E9800998ECF8427E"));
    }

    #[test]
    fn empty_source_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_source(dir.path(), "empty.md5", "");
        let err = build_index(&source, SourceKind::Md5sum, HashKind::Md5, 0).unwrap_err();
        assert!(matches!(err, HdbError::Corrupt(_)));
    }
}
