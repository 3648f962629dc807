//! Cross-cutting path and display-name derivation (spec.md §4.5).
//!
//! Grounded on the teacher's `common::gnu_name`, which derives a
//! human-facing name from a path/binary name by stripping a fixed prefix;
//! here the derivation strips a directory prefix and a `.idx` suffix
//! instead of a `f` prefix, but the "derive a short name from a longer
//! path, deterministically" shape is the same.

/// Max length (in bytes) of a derived display name, per spec.md §4.5.
pub const NAME_MAX: usize = 512;

/// Derive a database's display name from its path: strip the directory
/// prefix (accepting both `/` and `\` as separators, since HashKeeper/NSRL
/// hash sets commonly arrive with Windows-style paths even on POSIX hosts),
/// strip a trailing `.idx` suffix if present, and truncate to
/// [`NAME_MAX`] bytes at a UTF-8 char boundary.
pub fn display_name(path: &str) -> String {
    let base = path
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(path);

    let stripped = base.strip_suffix(".idx").unwrap_or(base);

    if stripped.len() <= NAME_MAX {
        stripped.to_string()
    } else {
        let mut end = NAME_MAX;
        while end > 0 && !stripped.is_char_boundary(end) {
            end -= 1;
        }
        stripped[..end].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_posix_directory() {
        assert_eq!(display_name("/var/hashsets/nsrl.idx"), "nsrl");
    }

    #[test]
    fn strips_windows_style_directory_on_any_host() {
        assert_eq!(display_name(r"C:\hashsets\encase-md5.idx"), "encase-md5");
    }

    #[test]
    fn leaves_non_idx_names_untouched() {
        assert_eq!(display_name("/data/NSRLFile.txt"), "NSRLFile.txt");
    }

    #[test]
    fn truncates_long_names_at_char_boundary() {
        let long = "a".repeat(NAME_MAX + 100);
        let path = format!("/x/{long}.idx");
        let name = display_name(&path);
        assert_eq!(name.len(), NAME_MAX);
    }
}
