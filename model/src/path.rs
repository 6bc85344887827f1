//! Byte-path handling.
//!
//! Paths are raw byte strings, not required to be valid UTF-8. The separator
//! is ASCII `/` (0x2F). The empty path and `.` both denote the tree root.

pub const SEPARATOR: u8 = b'/';

/// True for the two spellings of the root prefix.
pub fn is_root(path: &[u8]) -> bool {
    path.is_empty() || path == b"."
}

/// Joins a prefix path with a suffix path, normalizing root components away.
pub fn join_paths(prefix: &[u8], suffix: &[u8]) -> Vec<u8> {
    if is_root(prefix) {
        return if is_root(suffix) { Vec::new() } else { suffix.to_vec() };
    }
    if is_root(suffix) {
        return prefix.to_vec();
    }
    let mut joined = Vec::with_capacity(prefix.len() + 1 + suffix.len());
    joined.extend_from_slice(prefix);
    joined.push(SEPARATOR);
    joined.extend_from_slice(suffix);
    joined
}

/// Renders a byte path for logs; lossy on non-UTF-8 names.
pub fn display(path: &[u8]) -> String {
    String::from_utf8_lossy(path).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_paths() {
        assert_eq!(join_paths(b"", b"lib/a.c"), b"lib/a.c".to_vec());
        assert_eq!(join_paths(b".", b"lib/a.c"), b"lib/a.c".to_vec());
        assert_eq!(join_paths(b"lib", b"a.c"), b"lib/a.c".to_vec());
        assert_eq!(join_paths(b"lib", b""), b"lib".to_vec());
        assert_eq!(join_paths(b"lib", b"."), b"lib".to_vec());
        assert_eq!(join_paths(b"", b""), Vec::<u8>::new());
        assert_eq!(join_paths(b".", b"."), Vec::<u8>::new());
    }

    #[test]
    fn test_join_paths_non_utf8() {
        let prefix = [0xff, 0xfe];
        let joined = join_paths(&prefix, b"x");
        assert_eq!(joined, vec![0xff, 0xfe, SEPARATOR, b'x']);
    }
}
