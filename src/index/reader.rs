//! Binary-search index reader (spec.md §4.3.2, §4.3.3).

use std::cmp::Ordering;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::common::hex::is_hex_of_len;
use crate::error::{HdbError, HdbResult};
use crate::format::{HashKind, SourceKind};

use super::{
    idx2_path, BUCKET_COUNT, BUCKET_TABLE_BYTES, HEADER_NAME_SENTINEL, HEADER_TYPE_SENTINEL,
    NOT_SET, OFFSET_DIGITS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupMode {
    Quick,
    Full,
}

/// One occurrence of a hash found by a `Full` lookup: the byte offset in
/// the *source database* (not the index) at which its record lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupHit {
    pub source_offset: u64,
}

pub struct IndexReader {
    file: File,
    idx_off: u64,
    idx_size: u64,
    record_len: u64,
    hash_len: usize,
    buckets: Option<Vec<u64>>,
}

impl IndexReader {
    /// Open an index file, parse its two header lines, and load the
    /// `.idx2` index-of-index if present. `declared_source_kind` is the
    /// format the caller expects the index to have been built over;
    /// `None` means "index-only", which accepts any recognized tag
    /// (spec.md §4.3.2: "verify that the declared source type is
    /// compatible with the detected source type (or is index-only)").
    pub fn open(
        idx_path: &Path,
        hash_kind: HashKind,
        declared_source_kind: Option<SourceKind>,
    ) -> HdbResult<Self> {
        let file = File::open(idx_path).map_err(|e| HdbError::io("opening index file", e))?;
        let idx_size = file
            .metadata()
            .map_err(|e| HdbError::io("statting index file", e))?
            .len();

        let (line1, line2) = {
            let mut header_reader = BufReader::new(&file);
            let mut l1 = String::new();
            header_reader
                .read_line(&mut l1)
                .map_err(|e| HdbError::io("reading index header", e))?;
            let mut l2 = String::new();
            header_reader
                .read_line(&mut l2)
                .map_err(|e| HdbError::io("reading index header", e))?;
            (l1, l2)
        };

        if !line1.starts_with(HEADER_TYPE_SENTINEL) {
            return Err(HdbError::Corrupt("index missing type header line".into()));
        }
        if !line2.starts_with(HEADER_NAME_SENTINEL) {
            return Err(HdbError::Corrupt("index missing name header line".into()));
        }

        let tag = line1
            .trim_start_matches(HEADER_TYPE_SENTINEL)
            .trim_start_matches('|')
            .trim_end_matches(['\r', '\n']);
        let header_kind = SourceKind::from_tag(tag).ok_or(HdbError::UnknownType)?;
        if let Some(expected) = declared_source_kind {
            if expected != header_kind {
                return Err(HdbError::Corrupt(format!(
                    "index declares source type {header_kind:?}, database is {expected:?}"
                )));
            }
        }

        let crlf = line1.ends_with("\r\n");
        let hash_len = hash_kind.hex_len();
        let record_len = (hash_len + 1 + OFFSET_DIGITS + 1 + usize::from(crlf)) as u64;
        let idx_off = (line1.len() + line2.len()) as u64;

        if idx_size < idx_off || (idx_size - idx_off) % record_len != 0 {
            return Err(HdbError::Corrupt(
                "index file size is not a multiple of the record length".into(),
            ));
        }

        let buckets = load_idx2(idx_path)?;

        Ok(Self {
            file,
            idx_off,
            idx_size,
            record_len,
            hash_len,
            buckets,
        })
    }

    fn read_record(&mut self, offset: u64) -> HdbResult<(String, u64)> {
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| HdbError::io("seeking index file", e))?;
        let mut buf = vec![0u8; self.record_len as usize];
        self.file
            .read_exact(&mut buf)
            .map_err(|e| HdbError::io("reading index record", e))?;
        if buf.get(self.hash_len) != Some(&b'|') {
            return Err(HdbError::Corrupt(format!(
                "malformed index record at offset {offset}"
            )));
        }
        let hash = String::from_utf8(buf[..self.hash_len].to_vec())
            .map_err(|_| HdbError::Corrupt(format!("non-UTF8 hash at offset {offset}")))?;
        let trailer = if buf.ends_with(b"\r\n") { 2 } else { 1 };
        let digits_end = self.record_len as usize - trailer;
        let digits = std::str::from_utf8(&buf[self.hash_len + 1..digits_end])
            .map_err(|_| HdbError::Corrupt(format!("non-UTF8 offset field at {offset}")))?;
        let source_offset = digits.trim_start_matches('0').parse::<u64>().unwrap_or(0);
        Ok((hash, source_offset))
    }

    fn bounds_for(&self, hash: &str) -> HdbResult<Option<(u64, u64)>> {
        match &self.buckets {
            None => Ok(Some((self.idx_off, self.idx_size))),
            Some(buckets) => {
                let bucket = u16::from_str_radix(&hash[..3], 16)
                    .map_err(|_| HdbError::InvalidHash(hash.to_string()))?
                    as usize;
                let low = buckets[bucket];
                if low == NOT_SET {
                    return Ok(None);
                }
                let mut probe = bucket + 1;
                let up = loop {
                    if probe == BUCKET_COUNT {
                        break self.idx_size;
                    }
                    if buckets[probe] != NOT_SET {
                        break buckets[probe];
                    }
                    probe += 1;
                };
                Ok(Some((low, up)))
            }
        }
    }

    /// Binary-search `[low, up)` by record-count arithmetic. Returns the
    /// matched record's index-file offset and the search bracket at the
    /// point of the match, which bounds the duplicate walk.
    fn binary_search(
        &mut self,
        hash: &str,
        mut low: u64,
        mut up: u64,
    ) -> HdbResult<Option<(u64, u64, u64)>> {
        let mut prev_offset: Option<u64> = None;
        loop {
            if up == low {
                return Ok(None);
            }
            let mut offset = (up - low) / 2;
            offset -= offset % self.record_len;
            offset += low;
            if Some(offset) == prev_offset {
                return Ok(None);
            }
            prev_offset = Some(offset);

            let (record_hash, _) = self.read_record(offset)?;
            match record_hash.as_str().cmp(hash) {
                Ordering::Less => low = offset + self.record_len,
                Ordering::Greater => up = offset,
                Ordering::Equal => return Ok(Some((offset, low, up))),
            }
        }
    }

    fn normalize_hash(&self, hash: &str) -> HdbResult<String> {
        if !is_hex_of_len(hash.as_bytes(), self.hash_len) {
            return Err(HdbError::InvalidHash(hash.to_string()));
        }
        Ok(hash.to_ascii_uppercase())
    }

    pub fn lookup_quick(&mut self, hash: &str) -> HdbResult<bool> {
        let hash = self.normalize_hash(hash)?;
        let Some((low, up)) = self.bounds_for(&hash)? else {
            return Ok(false);
        };
        Ok(self.binary_search(&hash, low, up)?.is_some())
    }

    /// All occurrences of `hash`, in index-file (first-occurrence) order.
    pub fn lookup_full(&mut self, hash: &str) -> HdbResult<Vec<LookupHit>> {
        let hash = self.normalize_hash(hash)?;
        let Some((low, up)) = self.bounds_for(&hash)? else {
            return Ok(Vec::new());
        };
        let Some((matched, low, up)) = self.binary_search(&hash, low, up)? else {
            return Ok(Vec::new());
        };

        let (_, matched_offset) = self.read_record(matched)?;

        let mut before = Vec::new();
        let mut back = matched as i64 - self.record_len as i64;
        while back >= low as i64 {
            let (record_hash, source_offset) = self.read_record(back as u64)?;
            if record_hash != hash {
                break;
            }
            before.push(source_offset);
            back -= self.record_len as i64;
        }
        before.reverse();

        let mut after = Vec::new();
        let mut fwd = matched + self.record_len;
        while fwd < up {
            let (record_hash, source_offset) = self.read_record(fwd)?;
            if record_hash != hash {
                break;
            }
            after.push(source_offset);
            fwd += self.record_len;
        }

        let mut hits: Vec<LookupHit> = before
            .into_iter()
            .map(|source_offset| LookupHit { source_offset })
            .collect();
        hits.push(LookupHit {
            source_offset: matched_offset,
        });
        hits.extend(after.into_iter().map(|source_offset| LookupHit { source_offset }));
        Ok(hits)
    }

}

fn load_idx2(idx_path: &Path) -> HdbResult<Option<Vec<u64>>> {
    let path = idx2_path(idx_path);
    let mut file = match File::open(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(
                path = %path.display(),
                "no index-of-index file; lookups on this index fall back to unbucketed binary search"
            );
            return Ok(None);
        }
        Err(e) => return Err(HdbError::io("opening index-of-index file", e)),
    };
    let mut raw = Vec::new();
    file.read_to_end(&mut raw)
        .map_err(|e| HdbError::io("reading index-of-index file", e))?;
    if raw.len() != BUCKET_TABLE_BYTES {
        tracing::warn!(
            path = %path.display(),
            size = raw.len(),
            expected = BUCKET_TABLE_BYTES,
            "index-of-index file has the wrong size; ignoring it"
        );
        return Ok(None);
    }
    let mut buckets = Vec::with_capacity(BUCKET_COUNT);
    for chunk in raw.chunks_exact(8) {
        buckets.push(u64::from_le_bytes(chunk.try_into().unwrap()));
    }
    Ok(Some(buckets))
}
