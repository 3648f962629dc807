//! EnCase binary hash-set format (spec.md §4.2, §6).
//!
//! Unlike the other three formats this is not line-oriented text: a fixed
//! 8-byte magic at offset 0, a UTF-16LE database name at offset 1032 (up to
//! 78 bytes / 39 wide chars), and fixed 18-byte records starting at offset
//! 1152 — the first 16 bytes are a raw (non-hex) MD5, the trailing 2 bytes
//! are unused here. Offsets taken from `original_source/tsk/hashdb/encase_index.c`.

use crate::common::hex;
use crate::error::{HdbError, HdbResult};

pub const MAGIC: [u8; 8] = [0x48, 0x41, 0x53, 0x48, 0x0D, 0x0A, 0xFF, 0x00];
pub const NAME_OFFSET: usize = 1032;
pub const NAME_MAX_BYTES: usize = 78;
pub const RECORDS_OFFSET: u64 = 1152;
pub const RECORD_LEN: u64 = 18;
pub const MD5_LEN: usize = 16;

pub fn sniff(first_bytes: &[u8]) -> bool {
    first_bytes.len() >= MAGIC.len() && first_bytes[..MAGIC.len()] == MAGIC
}

/// Decode the UTF-16LE database name embedded in the file header. Lossy:
/// unpaired surrogates become the replacement character rather than
/// aborting the whole read.
pub fn read_header_name(header: &[u8]) -> Option<String> {
    let bytes = header.get(NAME_OFFSET..NAME_OFFSET + NAME_MAX_BYTES)?;
    let nul_wide = bytes
        .chunks_exact(2)
        .position(|pair| pair == [0, 0])
        .map(|idx| idx * 2)
        .unwrap_or(bytes.len());
    let units: Vec<u16> = bytes[..nul_wide]
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    Some(String::from_utf16_lossy(&units))
}

/// A single EnCase record: a raw MD5 digest and the file offset it lives at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncaseRecord {
    pub md5_hex: String,
    pub offset: u64,
}

fn record_at(buf: &[u8]) -> Option<EncaseRecord> {
    let md5 = buf.get(..MD5_LEN)?;
    Some(EncaseRecord {
        md5_hex: hex::encode(md5).to_ascii_uppercase(),
        offset: 0,
    })
}

/// Iterates fixed 18-byte records over an in-memory buffer (the caller mmaps
/// or reads the whole EnCase file — it has no line structure to stream).
pub struct EncaseRecords<'a> {
    buf: &'a [u8],
    pos: u64,
}

impl<'a> EncaseRecords<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: RECORDS_OFFSET,
        }
    }
}

impl<'a> Iterator for EncaseRecords<'a> {
    type Item = EncaseRecord;

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.pos as usize;
        let end = start + RECORD_LEN as usize;
        let slice = self.buf.get(start..end)?;
        let mut rec = record_at(slice)?;
        rec.offset = self.pos;
        self.pos += RECORD_LEN;
        Some(rec)
    }
}

/// Validate the magic and return the parsed header name, or `Corrupt` if the
/// buffer is too short to even hold a header.
pub fn validate_header(buf: &[u8]) -> HdbResult<Option<String>> {
    if buf.len() < RECORDS_OFFSET as usize {
        return Err(HdbError::Corrupt(
            "EnCase file shorter than fixed header".into(),
        ));
    }
    if !sniff(buf) {
        return Err(HdbError::Corrupt("EnCase magic mismatch".into()));
    }
    Ok(read_header_name(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_header_with_name(name: &str) -> Vec<u8> {
        let mut buf = vec![0u8; RECORDS_OFFSET as usize];
        buf[..MAGIC.len()].copy_from_slice(&MAGIC);
        let wide: Vec<u8> = name
            .encode_utf16()
            .flat_map(|u| u.to_le_bytes())
            .collect();
        buf[NAME_OFFSET..NAME_OFFSET + wide.len()].copy_from_slice(&wide);
        buf
    }

    #[test]
    fn sniffs_magic() {
        let header = make_header_with_name("test_set");
        assert!(sniff(&header));
    }

    #[test]
    fn rejects_wrong_magic() {
        assert!(!sniff(&[0u8; 16]));
    }

    #[test]
    fn decodes_utf16le_name() {
        let header = make_header_with_name("NSRL Modern");
        assert_eq!(read_header_name(&header).as_deref(), Some("NSRL Modern"));
    }

    #[test]
    fn iterates_fixed_width_records() {
        let mut buf = make_header_with_name("set");
        let md5_a = [0xAAu8; MD5_LEN];
        let md5_b = [0xBBu8; MD5_LEN];
        buf.extend_from_slice(&md5_a);
        buf.extend_from_slice(&[0, 0]);
        buf.extend_from_slice(&md5_b);
        buf.extend_from_slice(&[0, 0]);

        let records: Vec<_> = EncaseRecords::new(&buf).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].md5_hex, "A".repeat(32).to_ascii_uppercase());
        assert_eq!(records[0].offset, RECORDS_OFFSET);
        assert_eq!(records[1].offset, RECORDS_OFFSET + RECORD_LEN);
    }

    #[test]
    fn validate_header_rejects_truncated_file() {
        let err = validate_header(&[0u8; 10]).unwrap_err();
        assert!(matches!(err, HdbError::Corrupt(_)));
    }
}
