//! Hash-hex validation and case conversion.
//!
//! The digest algorithms themselves (MD5/SHA-1/SHA-256 computation) are out
//! of scope for this crate — it consumes hashes, it does not compute them.
//! What it does need is cheap, allocation-free validation that a hex string
//! is well-formed for a given hash length, and uppercasing, since index
//! files store hashes upper-case per spec.md §3.

/// Returns true if `s` is exactly `len` bytes of ASCII hex digits.
pub fn is_hex_of_len(s: &[u8], len: usize) -> bool {
    s.len() == len && s.iter().all(|b| b.is_ascii_hexdigit())
}

/// Uppercase an ASCII hex string in place (no allocation beyond the input).
pub fn uppercase_hex(s: &mut [u8]) {
    for b in s.iter_mut() {
        b.make_ascii_uppercase();
    }
}

/// Decode an even-length hex string into raw bytes, e.g. for converting an
/// MD5 hex string into the 16-byte blob the SQLite backend stores.
pub fn decode(s: &[u8]) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    let text = std::str::from_utf8(s).ok()?;
    hex::decode(text).ok()
}

/// Encode raw bytes as lower-case hex. Upper-casing (where required by the
/// index file format) is a separate, explicit step — callers should not
/// assume a particular case from this function.
pub fn encode(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_length_and_hex() {
        assert!(is_hex_of_len(b"d41d8cd98f00b204e9800998ecf8427e", 32));
        assert!(!is_hex_of_len(b"d41d8cd98f00b204e9800998ecf8427", 32));
        assert!(!is_hex_of_len(b"zz1d8cd98f00b204e9800998ecf8427e", 32));
    }

    #[test]
    fn uppercases_in_place() {
        let mut buf = b"d41d8cd9".to_vec();
        uppercase_hex(&mut buf);
        assert_eq!(&buf, b"D41D8CD9");
    }

    #[test]
    fn round_trips_bytes() {
        let bytes = [0xE4, 0xD9, 0x09, 0xC2];
        let text = encode(&bytes);
        assert_eq!(text, "e4d909c2");
        assert_eq!(decode(text.as_bytes()).unwrap(), bytes);
    }
}
