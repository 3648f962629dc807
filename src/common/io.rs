use std::fs::File;
use std::io::{self, BufRead};
use std::path::Path;

use memmap2::Mmap;

/// Threshold above which we use mmap instead of buffered read.
/// mmap has overhead from page table setup; for small files buffered read wins.
const MMAP_THRESHOLD: u64 = 64 * 1024; // 64KB

/// Read a file, choosing mmap for large files and buffered read for small ones.
pub fn read_file_bytes(path: &Path) -> io::Result<Vec<u8>> {
    let metadata = std::fs::metadata(path)?;

    if metadata.len() >= MMAP_THRESHOLD {
        let file = File::open(path)?;
        // SAFETY: read-only mapping; the source database is not written to
        // while a lookup or index build holds this mapping.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(mmap.to_vec())
    } else {
        std::fs::read(path)
    }
}

/// Memory-map a file for zero-copy access.
///
/// Caller must ensure the file is not modified while the mapping is alive.
pub fn mmap_file(path: &Path) -> io::Result<Mmap> {
    let file = File::open(path)?;
    // SAFETY: read-only mapping; file must not be truncated during use.
    unsafe { Mmap::map(&file) }
}

/// Every text-format parser shares this bound: a line longer than this is
/// not a valid hash-set record and is skipped (counted, never panics).
pub const MAX_LINE_LEN: usize = 512;

/// A line read by [`OffsetLines`], tagged with the byte offset at which it
/// started. This offset is exactly what the binary-search index stores and
/// what a later `Full` lookup seeks back to.
pub struct OffsetLine {
    pub offset: u64,
    pub bytes: Vec<u8>,
    /// Set when the raw line exceeded [`MAX_LINE_LEN`] and was truncated for
    /// parsing purposes; callers should count this as a format error.
    pub overlong: bool,
}

/// Line reader that records the starting byte offset of every record and
/// enforces a maximum line length, so a single corrupt line can never grow
/// unbounded memory use while scanning a hash-set file.
pub struct OffsetLines<R> {
    reader: R,
    pos: u64,
}

impl<R: BufRead> OffsetLines<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, pos: 0 }
    }

    /// Read the next record. Returns `Ok(None)` at EOF.
    pub fn next_line(&mut self) -> io::Result<Option<OffsetLine>> {
        let start = self.pos;
        let mut buf = Vec::new();
        let mut overlong = false;

        loop {
            let avail = match self.reader.fill_buf() {
                Ok(buf) => buf,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if avail.is_empty() {
                break;
            }
            match memchr::memchr(b'\n', avail) {
                Some(i) => {
                    if buf.len() < MAX_LINE_LEN {
                        buf.extend_from_slice(&avail[..i.min(MAX_LINE_LEN - buf.len())]);
                    } else {
                        overlong = true;
                    }
                    let consumed = i + 1;
                    self.pos += consumed as u64;
                    self.reader.consume(consumed);
                    break;
                }
                None => {
                    let n = avail.len();
                    if buf.len() < MAX_LINE_LEN {
                        let take = (MAX_LINE_LEN - buf.len()).min(n);
                        buf.extend_from_slice(&avail[..take]);
                    }
                    if buf.len() >= MAX_LINE_LEN {
                        overlong = true;
                    }
                    self.pos += n as u64;
                    self.reader.consume(n);
                }
            }
        }

        if buf.is_empty() && self.pos == start {
            return Ok(None);
        }

        if buf.last() == Some(&b'\r') {
            buf.pop();
        }

        Ok(Some(OffsetLine {
            offset: start,
            bytes: buf,
            overlong,
        }))
    }
}

#[cfg(test)]
mod offset_line_tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn tracks_offsets_across_lines() {
        let data = b"abc\ndefgh\n\nlast";
        let mut lines = OffsetLines::new(Cursor::new(&data[..]));

        let l1 = lines.next_line().unwrap().unwrap();
        assert_eq!(l1.offset, 0);
        assert_eq!(l1.bytes, b"abc");

        let l2 = lines.next_line().unwrap().unwrap();
        assert_eq!(l2.offset, 4);
        assert_eq!(l2.bytes, b"defgh");

        let l3 = lines.next_line().unwrap().unwrap();
        assert_eq!(l3.offset, 10);
        assert_eq!(l3.bytes, b"");

        let l4 = lines.next_line().unwrap().unwrap();
        assert_eq!(l4.offset, 11);
        assert_eq!(l4.bytes, b"last");

        assert!(lines.next_line().unwrap().is_none());
    }

    #[test]
    fn flags_overlong_lines() {
        let mut long_line = vec![b'x'; MAX_LINE_LEN + 50];
        long_line.push(b'\n');
        long_line.extend_from_slice(b"ok\n");
        let mut lines = OffsetLines::new(Cursor::new(long_line));

        let l1 = lines.next_line().unwrap().unwrap();
        assert!(l1.overlong);
        assert_eq!(l1.bytes.len(), MAX_LINE_LEN);

        let l2 = lines.next_line().unwrap().unwrap();
        assert!(!l2.overlong);
        assert_eq!(l2.bytes, b"ok");
    }

    #[test]
    fn strips_trailing_cr() {
        let mut lines = OffsetLines::new(Cursor::new(&b"abc\r\ndef"[..]));
        let l1 = lines.next_line().unwrap().unwrap();
        assert_eq!(l1.bytes, b"abc");
        let l2 = lines.next_line().unwrap().unwrap();
        assert_eq!(l2.bytes, b"def");
    }
}
