//! hashfile::istextfile
//!
//! Text/binary heuristic used by the `md5-dos2unix` hash.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Number of leading bytes inspected.
pub const DEFAULT_CHUNK_SIZE: usize = 512;

/// Share of non-text bytes above which a block is binary.
const MAX_NONTEXT_RATIO: f64 = 0.30;

fn is_text_char(b: u8) -> bool {
    (32..127).contains(&b) || matches!(b, b'\n' | b'\r' | b'\t' | 0x0c | 0x08)
}

/// True if `block` looks like text.
///
/// Empty blocks are text. Any NUL byte makes the block binary. Otherwise the
/// block is binary when more than 30% of its bytes are outside printable
/// ASCII and common whitespace.
pub fn istextblock(block: &[u8]) -> bool {
    if block.is_empty() {
        return true;
    }
    if block.contains(&0) {
        return false;
    }
    let nontext = block.iter().filter(|&&b| !is_text_char(b)).count();
    (nontext as f64) / (block.len() as f64) <= MAX_NONTEXT_RATIO
}

/// Apply [`istextblock`] to the first [`DEFAULT_CHUNK_SIZE`] bytes of `path`.
pub fn istextfile(path: &Path) -> io::Result<bool> {
    let mut buf = Vec::with_capacity(DEFAULT_CHUNK_SIZE);
    File::open(path)?
        .take(DEFAULT_CHUNK_SIZE as u64)
        .read_to_end(&mut buf)?;
    Ok(istextblock(&buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn empty_is_text() {
        assert!(istextblock(b""));
    }

    #[test]
    fn nul_is_binary() {
        assert!(!istextblock(b"hello\x00world"));
    }

    #[test]
    fn plain_text() {
        assert!(istextblock(b"hello\r\nworld\tfoo\x0c\x08"));
    }

    #[test]
    fn high_bytes_count_as_nontext() {
        // 3 of 10 bytes are high: exactly at the limit
        assert!(istextblock(b"abcdefg\xff\xfe\xfd"));
        // 4 of 10 bytes are high: over the limit
        assert!(!istextblock(b"abcdef\xff\xfe\xfd\xfc"));
    }

    #[test]
    fn reads_only_leading_chunk() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("file");
        let mut data = vec![b'a'; DEFAULT_CHUNK_SIZE];
        data.extend_from_slice(&[0u8; 64]);
        std::fs::write(&path, &data).unwrap();
        assert!(istextfile(&path).unwrap());
    }
}
