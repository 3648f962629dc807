//! NSRL (National Software Reference Library) text format (spec.md §4.2, §6).
//!
//! Fully double-quoted CSV. Two column orderings exist and are told apart by
//! fixed character offsets in the header line — not by splitting and
//! counting columns, which is fragile against embedded commas. The offsets
//! below are taken from the original `nsrl_index.c`'s `get_format_ver`:
//!
//! Form1: `"SHA-1","FileName","FileSize","ProductCode","OpSystemCode","MD4","MD5","CRC32","SpecialCode"`
//! Form2: `"SHA-1","MD5","CRC32","FileName","FileSize","ProductCode","OpSystemCode","SpecialCode"`

use std::io::BufRead;

use super::{split_quoted_csv, HashKind, ParsedEntry};
use crate::common::io::OffsetLines;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NsrlForm {
    Form1,
    Form2,
}

pub(crate) fn classify(header: &[u8]) -> Option<NsrlForm> {
    let at = |i: usize| header.get(i).copied();
    if at(9) == Some(b'F')
        && at(20) == Some(b'F')
        && at(24) == Some(b'S')
        && at(31) == Some(b'P')
        && at(45) == Some(b'O')
    {
        Some(NsrlForm::Form1)
    } else if at(9) == Some(b'M')
        && at(15) == Some(b'C')
        && at(23) == Some(b'F')
        && at(34) == Some(b'F')
        && at(45) == Some(b'P')
    {
        Some(NsrlForm::Form2)
    } else {
        None
    }
}

/// A line is only accepted if it begins with a double-quoted 40-char SHA-1
/// followed by `","` (spec.md §4.2).
fn is_valid_data_line(line: &[u8]) -> bool {
    const SHA1_LEN: usize = 40;
    line.len() > SHA1_LEN + 3
        && line[0] == b'"'
        && line[SHA1_LEN + 1] == b'"'
        && line[SHA1_LEN + 2] == b','
}

pub fn sniff(first_bytes: &[u8]) -> bool {
    let line_end = memchr::memchr(b'\n', first_bytes).unwrap_or(first_bytes.len());
    let header = &first_bytes[..line_end];
    header.len() >= 45
        && header.starts_with(b"\"SHA-1\"")
        && classify(header).is_some()
}

/// Parse a single NSRL data row (not the header) into a `ParsedEntry`. The
/// SHA-1 column is always field 0; the filename column depends on `form`.
pub(crate) fn parse_row(line: &[u8], form: NsrlForm, offset: u64) -> Option<ParsedEntry> {
    if !is_valid_data_line(line) {
        return None;
    }
    let fields = split_quoted_csv(line);
    let sha1 = fields.first()?;
    if sha1.len() != 40 || !sha1.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let name_idx = match form {
        NsrlForm::Form1 => 1,
        NsrlForm::Form2 => 3,
    };
    let name = fields.get(name_idx).cloned();
    let mut hash = sha1.to_ascii_uppercase();
    hash.truncate(40);
    Some(ParsedEntry { hash, name, offset })
}

/// The MD5 column for a row, when present (Form1 column 6, Form2 column 1).
pub fn md5_at(line: &[u8], form: NsrlForm) -> Option<String> {
    let fields = split_quoted_csv(line);
    let idx = match form {
        NsrlForm::Form1 => 6,
        NsrlForm::Form2 => 1,
    };
    fields.get(idx).cloned()
}

/// Parse a single NSRL data row keyed by its MD5 column instead of its
/// SHA-1 column, for `make_index(HashKind::Md5, ...)` over an NSRL source
/// (spec.md §4.3.1: the builder takes "a chosen hash type (MD5 or
/// SHA-1)"). Still gated on [`is_valid_data_line`] since that is what
/// tells a real NSRL data row apart from a malformed one.
pub(crate) fn parse_md5_row(line: &[u8], form: NsrlForm, offset: u64) -> Option<ParsedEntry> {
    if !is_valid_data_line(line) {
        return None;
    }
    let md5 = md5_at(line, form)?;
    if md5.len() != 32 || !md5.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let fields = split_quoted_csv(line);
    let name_idx = match form {
        NsrlForm::Form1 => 1,
        NsrlForm::Form2 => 3,
    };
    let name = fields.get(name_idx).cloned();
    Some(ParsedEntry {
        hash: md5.to_ascii_uppercase(),
        name,
        offset,
    })
}

pub struct NsrlEntries<R> {
    lines: OffsetLines<R>,
    form: Option<NsrlForm>,
    header_seen: bool,
    hash_kind: HashKind,
}

impl<R: BufRead> NsrlEntries<R> {
    /// `hash_kind` selects which column each yielded entry is keyed on —
    /// SHA-1 (the default primary key) or MD5.
    pub fn new(reader: R, hash_kind: HashKind) -> Self {
        Self {
            lines: OffsetLines::new(reader),
            form: None,
            header_seen: false,
            hash_kind,
        }
    }
}

impl<R: BufRead> Iterator for NsrlEntries<R> {
    type Item = std::io::Result<Option<ParsedEntry>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next_line() {
                Ok(Some(l)) => l,
                Ok(None) => return None,
                Err(e) => return Some(Err(e)),
            };

            if !self.header_seen {
                self.header_seen = true;
                self.form = classify(&line.bytes);
                // Header line never yields an entry.
                continue;
            }

            let Some(form) = self.form else {
                // Could not classify the header; every row is a format error.
                return Some(Ok(None));
            };

            if line.overlong {
                // A truncated line cannot be trusted even if it happens to
                // parse; count it as a format error rather than index it.
                return Some(Ok(None));
            }

            return Some(Ok(match self.hash_kind {
                HashKind::Sha1 => parse_row(&line.bytes, form, line.offset),
                HashKind::Md5 => parse_md5_row(&line.bytes, form, line.offset),
                HashKind::Sha256 => None,
            }));
        }
    }
}
