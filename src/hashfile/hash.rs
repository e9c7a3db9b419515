//! hashfile::hash
//!
//! Streaming file hashing.
//!
//! # Algorithms
//!
//! - `md5` (default)
//! - `md5-dos2unix`: md5 over content with CRLF normalized to LF, applied
//!   per chunk when the chunk looks like text
//! - `sha256`
//! - `sha512`
//!
//! # Example
//!
//! ```
//! use dvc_data::hashfile::hash::hash_reader;
//!
//! let digest = hash_reader(&b"foo"[..], "md5").unwrap();
//! assert_eq!(digest, "acbd18db4cc2f85cedef654fccc4a4d8");
//! ```

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use md5::Md5;
use sha2::{Digest, Sha256, Sha512};
use thiserror::Error;
use tracing::{debug, info};

use super::istextfile::{istextblock, DEFAULT_CHUNK_SIZE};
use super::state::StateBase;
use crate::core::hash_info::{HashInfo, HASH_DIR_SUFFIX};
use crate::core::meta::Meta;

/// Default algorithm for new objects.
pub const DEFAULT_ALGORITHM: &str = "md5";

/// Every algorithm accepted by [`Hasher::new`].
pub const ALGORITHMS: &[&str] = &["md5", "md5-dos2unix", "sha256", "sha512"];

/// Read size used when streaming files.
pub const CHUNK_SIZE: usize = 1 << 20;

/// Files above this size log a one-time notice before hashing.
pub const LARGE_FILE_SIZE: u64 = 1 << 30;

/// Errors from hashing.
#[derive(Debug, Error)]
pub enum HashError {
    #[error("unsupported hash algorithm '{0}'")]
    UnsupportedAlgorithm(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub fn is_supported(name: &str) -> bool {
    ALGORITHMS.contains(&name)
}

enum Inner {
    Md5(Md5),
    Sha256(Sha256),
    Sha512(Sha512),
}

/// Incremental hasher for one of [`ALGORITHMS`].
pub struct Hasher {
    inner: Inner,
    dos2unix: bool,
    name: String,
}

impl Hasher {
    pub fn new(name: &str) -> Result<Self, HashError> {
        let name_lower = name.to_ascii_lowercase();
        let (inner, dos2unix) = match name_lower.as_str() {
            "md5" => (Inner::Md5(Md5::new()), false),
            "md5-dos2unix" => (Inner::Md5(Md5::new()), true),
            "sha256" => (Inner::Sha256(Sha256::new()), false),
            "sha512" => (Inner::Sha512(Sha512::new()), false),
            _ => return Err(HashError::UnsupportedAlgorithm(name.to_string())),
        };
        Ok(Self {
            inner,
            dos2unix,
            name: name_lower,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Feed one read chunk.
    ///
    /// With `md5-dos2unix` the chunk is normalized when its leading bytes
    /// look like text.
    pub fn update(&mut self, chunk: &[u8]) {
        if self.dos2unix && !chunk.is_empty() {
            let head = &chunk[..chunk.len().min(DEFAULT_CHUNK_SIZE)];
            if istextblock(head) {
                let normalized = dos2unix(chunk);
                self.update_raw(&normalized);
                return;
            }
        }
        self.update_raw(chunk);
    }

    fn update_raw(&mut self, data: &[u8]) {
        match &mut self.inner {
            Inner::Md5(h) => h.update(data),
            Inner::Sha256(h) => h.update(data),
            Inner::Sha512(h) => h.update(data),
        }
    }

    /// Lowercase hex digest.
    pub fn finalize(self) -> String {
        match self.inner {
            Inner::Md5(h) => hex::encode(h.finalize()),
            Inner::Sha256(h) => hex::encode(h.finalize()),
            Inner::Sha512(h) => hex::encode(h.finalize()),
        }
    }
}

/// Replace every `\r\n` with `\n`.
pub fn dos2unix(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        if data[i] == b'\r' && data.get(i + 1) == Some(&b'\n') {
            out.push(b'\n');
            i += 2;
        } else {
            out.push(data[i]);
            i += 1;
        }
    }
    out
}

/// Hash everything `reader` yields, in [`CHUNK_SIZE`] reads.
pub fn hash_reader<R: Read>(mut reader: R, name: &str) -> Result<String, HashError> {
    let mut hasher = Hasher::new(name)?;
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = read_full(&mut reader, &mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize())
}

/// Hash an in-memory buffer.
pub fn hash_bytes(data: &[u8], name: &str) -> Result<String, HashError> {
    hash_reader(data, name)
}

/// Fill `buf` as far as the reader allows, so chunk boundaries do not depend
/// on how the OS splits reads.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Hash the contents of a local file.
pub fn file_hash(path: &Path, name: &str) -> Result<String, HashError> {
    hash_reader(File::open(path)?, name)
}

/// Hash a file, consulting and updating `state`.
///
/// A cached value is only reused when it was computed with the same
/// algorithm.
pub fn hash_file(
    path: &Path,
    name: &str,
    state: Option<&dyn StateBase>,
) -> Result<(Meta, HashInfo), HashError> {
    if let Some(state) = state {
        if let Some((meta, hash_info)) = state.get(path) {
            if hash_info.name() == Some(name) && !hash_info.is_empty() {
                debug!(path = %path.display(), "using cached hash");
                return Ok((meta, hash_info));
            }
        }
    }

    let meta = Meta::from_path(path)?;
    if meta.size.unwrap_or(0) > LARGE_FILE_SIZE {
        info!(
            "Computing {} for a large file '{}'. This is only done once.",
            name,
            path.display()
        );
    }

    let value = file_hash(path, name)?;
    debug_assert!(!value.ends_with(HASH_DIR_SUFFIX));
    let hash_info = HashInfo::new(name, value);

    if let Some(state) = state {
        state.save(path, &hash_info, meta.size);
    }

    Ok((meta, hash_info))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn known_md5_digests() {
        assert_eq!(hash_bytes(b"foo", "md5").unwrap(), "acbd18db4cc2f85cedef654fccc4a4d8");
        assert_eq!(hash_bytes(b"bar", "md5").unwrap(), "37b51d194a7513e45b56f6524f2d51f2");
        assert_eq!(hash_bytes(b"foo\n", "md5").unwrap(), "d3b07384d113edec49eaa6238ad5ff00");
    }

    #[test]
    fn sha_digests() {
        assert_eq!(
            hash_bytes(b"", "sha256").unwrap(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(hash_bytes(b"foo", "sha512").unwrap().len(), 128);
    }

    #[test]
    fn dos2unix_normalizes_text_only() {
        assert_eq!(
            hash_bytes(b"foo\r\n", "md5-dos2unix").unwrap(),
            hash_bytes(b"foo\n", "md5").unwrap()
        );

        let binary = b"\x00\x01\r\n";
        assert_eq!(
            hash_bytes(binary, "md5-dos2unix").unwrap(),
            hash_bytes(binary, "md5").unwrap()
        );
    }

    #[test]
    fn dos2unix_keeps_lone_carriage_returns() {
        assert_eq!(dos2unix(b"a\rb\r\nc\r"), b"a\rb\nc\r");
    }

    #[test]
    fn unsupported_algorithm() {
        assert!(matches!(
            Hasher::new("crc32"),
            Err(HashError::UnsupportedAlgorithm(_))
        ));
        assert!(is_supported("sha256"));
        assert!(!is_supported("blake2"));
    }

    #[test]
    fn hash_file_without_state() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("foo");
        std::fs::write(&path, "foo").unwrap();

        let (meta, hi) = hash_file(&path, "md5", None).unwrap();
        assert_eq!(meta.size, Some(3));
        assert_eq!(hi, HashInfo::new("md5", "acbd18db4cc2f85cedef654fccc4a4d8"));
    }
}
