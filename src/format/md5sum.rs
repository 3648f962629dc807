//! `md5sum`-style text format (spec.md §4.2, §6).
//!
//! Two line shapes are accepted and yield the same `(hash, name)` tuple:
//! - GNU: `<32-hex-md5>  <filename>` (two spaces, or one space and a `*`
//!   marking binary mode, per GNU coreutils convention)
//! - BSD: `MD5 (<filename>) = <32-hex-md5>`
//!
//! Non-matching lines are skipped silently but counted.

use std::io::BufRead;

use super::ParsedEntry;
use crate::common::hex::is_hex_of_len;
use crate::common::io::OffsetLines;

pub fn sniff(first_bytes: &[u8]) -> bool {
    let line_end = memchr::memchr(b'\n', first_bytes).unwrap_or(first_bytes.len());
    let line = &first_bytes[..line_end];
    parse_line(line).is_some()
}

fn parse_gnu(line: &[u8]) -> Option<(String, String)> {
    if line.len() < 34 {
        return None;
    }
    let (hash, rest) = line.split_at(32);
    if !is_hex_of_len(hash, 32) {
        return None;
    }
    let rest = rest.strip_prefix(b" ")?;
    let (mode, rest) = rest.split_first()?;
    if *mode != b' ' && *mode != b'*' {
        return None;
    }
    if rest.is_empty() {
        return None;
    }
    let hash = String::from_utf8_lossy(hash).to_ascii_uppercase();
    let name = String::from_utf8_lossy(rest).into_owned();
    Some((hash, name))
}

fn parse_bsd(line: &[u8]) -> Option<(String, String)> {
    let line = line.strip_prefix(b"MD5 (")?;
    let close = memchr::memchr(b')', line)?;
    let name = String::from_utf8_lossy(&line[..close]).into_owned();
    let rest = &line[close + 1..];
    let rest = rest.strip_prefix(b" = ")?;
    if !is_hex_of_len(rest, 32) {
        return None;
    }
    let hash = String::from_utf8_lossy(rest).to_ascii_uppercase();
    Some((hash, name))
}

pub(crate) fn parse_line(line: &[u8]) -> Option<(String, String)> {
    parse_gnu(line).or_else(|| parse_bsd(line))
}

pub struct Md5sumEntries<R> {
    lines: OffsetLines<R>,
}

impl<R: BufRead> Md5sumEntries<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: OffsetLines::new(reader),
        }
    }
}

impl<R: BufRead> Iterator for Md5sumEntries<R> {
    type Item = std::io::Result<Option<ParsedEntry>>;

    fn next(&mut self) -> Option<Self::Item> {
        let line = match self.lines.next_line() {
            Ok(Some(l)) => l,
            Ok(None) => return None,
            Err(e) => return Some(Err(e)),
        };
        if line.overlong {
            return Some(Ok(None));
        }
        let parsed = parse_line(&line.bytes).map(|(hash, name)| ParsedEntry {
            hash,
            name: Some(name),
            offset: line.offset,
        });
        Some(Ok(parsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn sniffs_gnu_style() {
        assert!(sniff(b"d41d8cd98f00b204e9800998ecf8427e  a.txt\n"));
    }

    #[test]
    fn sniffs_bsd_style() {
        assert!(sniff(b"MD5 (a.txt) = d41d8cd98f00b204e9800998ecf8427e\n"));
    }

    #[test]
    fn parses_duplicate_hash_in_order() {
        let data = b"D41D8CD98F00B204E9800998ECF8427E  a.txt\nD41D8CD98F00B204E9800998ECF8427E  b.txt\n";
        let mut entries = Md5sumEntries::new(Cursor::new(&data[..]));
        let e1 = entries.next().unwrap().unwrap().unwrap();
        let e2 = entries.next().unwrap().unwrap().unwrap();
        assert_eq!(e1.name.as_deref(), Some("a.txt"));
        assert_eq!(e2.name.as_deref(), Some("b.txt"));
        assert_eq!(e1.hash, e2.hash);
        assert!(entries.next().is_none());
    }

    #[test]
    fn skips_non_matching_lines_without_error() {
        let data = b"not a checksum line\nd41d8cd98f00b204e9800998ecf8427e  ok.txt\n";
        let mut entries = Md5sumEntries::new(Cursor::new(&data[..]));
        assert!(entries.next().unwrap().unwrap().is_none());
        assert!(entries.next().unwrap().unwrap().is_some());
    }
}
