//! HashKeeper CSV text format (spec.md §4.2, §6).
//!
//! Header: `"file_id","hashset_id","file_name","directory","hash","file_size",...`
//! Columns (0-indexed): 0 file_id, 1 hashset_id, 2 file_name, 3 directory,
//! 4 hash. Extracting the display name requires concatenating
//! `directory\filename` with a backslash, even on non-Windows hosts,
//! because HashKeeper files encode Windows paths (spec.md §4.2).

use std::io::BufRead;

use super::{split_quoted_csv, ParsedEntry};
use crate::common::hex::is_hex_of_len;
use crate::common::io::OffsetLines;

const HEADER_PREFIX: &str = "\"file_id\",\"hashset_id\",\"file_name\",\"directory\",\"hash\"";

pub fn sniff(first_bytes: &[u8]) -> bool {
    let line_end = memchr::memchr(b'\n', first_bytes).unwrap_or(first_bytes.len());
    let header = &first_bytes[..line_end];
    header.len() >= HEADER_PREFIX.len() && header.starts_with(HEADER_PREFIX.as_bytes())
}

pub(crate) fn parse_row(line: &[u8], offset: u64) -> Option<ParsedEntry> {
    let fields = split_quoted_csv(line);
    let directory = fields.get(3).map(String::as_str).unwrap_or("");
    let file_name = fields.get(2)?;
    let hash = fields.get(4)?;
    if !is_hex_of_len(hash.as_bytes(), 32) {
        return None;
    }
    let name = if directory.is_empty() {
        file_name.clone()
    } else {
        format!("{directory}\\{file_name}")
    };
    Some(ParsedEntry {
        hash: hash.to_ascii_uppercase(),
        name: Some(name),
        offset,
    })
}

pub struct HashKeeperEntries<R> {
    lines: OffsetLines<R>,
    header_seen: bool,
}

impl<R: BufRead> HashKeeperEntries<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: OffsetLines::new(reader),
            header_seen: false,
        }
    }
}

impl<R: BufRead> Iterator for HashKeeperEntries<R> {
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
                continue;
            }
            if line.overlong {
                return Some(Ok(None));
            }
            return Some(Ok(parse_row(&line.bytes, line.offset)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const HEADER: &str = "\"file_id\",\"hashset_id\",\"file_name\",\"directory\",\"hash\",\"file_size\"\n";

    #[test]
    fn sniffs_header() {
        assert!(sniff(HEADER.as_bytes()));
    }

    #[test]
    fn joins_directory_and_filename_with_backslash() {
        let data = format!(
            "{HEADER}\"1\",\"1\",\"evil.exe\",\"C:\\malware\",\"e4d909c290d0fb1ca068ffaddf22cbd0\",\"100\"\n"
        );
        let mut entries = HashKeeperEntries::new(Cursor::new(data.as_bytes()));
        let row = entries.next().unwrap().unwrap().unwrap();
        assert_eq!(row.name.as_deref(), Some("C:\\malware\\evil.exe"));
        assert_eq!(row.hash, "E4D909C290D0FB1CA068FFADDF22CBD0");
    }

    #[test]
    fn falls_back_to_bare_filename_without_directory() {
        let data = format!(
            "{HEADER}\"1\",\"1\",\"evil.exe\",\"\",\"e4d909c290d0fb1ca068ffaddf22cbd0\",\"100\"\n"
        );
        let mut entries = HashKeeperEntries::new(Cursor::new(data.as_bytes()));
        let row = entries.next().unwrap().unwrap().unwrap();
        assert_eq!(row.name.as_deref(), Some("evil.exe"));
    }
}
