//! hashfile::link
//!
//! Materializing cache objects in the workspace.
//!
//! Checkout places each object with the first link type that works between
//! the cache directory and the destination. Reflinks are recognised but not
//! implemented, so they always fall through to the next type.

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;
use tracing::debug;

use crate::core::fsutil;

/// Ways to place an object at a workspace path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkType {
    Reflink,
    Hardlink,
    Symlink,
    Copy,
}

/// Cache types used when nothing is configured.
pub const DEFAULT_CACHE_TYPES: &[LinkType] = &[LinkType::Reflink, LinkType::Copy];

#[derive(Debug, Error)]
#[error("unknown link type '{0}', must be one of: reflink, hardlink, symlink, copy")]
pub struct UnknownLinkType(pub String);

impl FromStr for LinkType {
    type Err = UnknownLinkType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reflink" => Ok(LinkType::Reflink),
            "hardlink" => Ok(LinkType::Hardlink),
            "symlink" => Ok(LinkType::Symlink),
            "copy" => Ok(LinkType::Copy),
            other => Err(UnknownLinkType(other.to_string())),
        }
    }
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LinkType::Reflink => "reflink",
            LinkType::Hardlink => "hardlink",
            LinkType::Symlink => "symlink",
            LinkType::Copy => "copy",
        };
        f.write_str(name)
    }
}

impl LinkType {
    /// Create `to` from `from` with this link type. `to` must not exist.
    pub fn link(self, from: &Path, to: &Path) -> io::Result<()> {
        match self {
            LinkType::Reflink => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "reflink is not supported",
            )),
            LinkType::Hardlink => fs::hard_link(from, to),
            LinkType::Symlink => symlink(from, to),
            LinkType::Copy => {
                fs::copy(from, to)?;
                // Copies are workspace files, not protected objects
                let mode = fsutil::permission_bits(from)?;
                fsutil::set_mode(to, (mode | 0o644) & !0o022)
            }
        }
    }
}

#[cfg(unix)]
fn symlink(from: &Path, to: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(from, to)
}

#[cfg(windows)]
fn symlink(from: &Path, to: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(from, to)
}

/// Link types from `types` that actually work from `from_dir` to `to_dir`.
///
/// Each candidate is probed with a scratch file so that, for example,
/// hardlinks across devices are rejected up front.
pub fn test_links(types: &[LinkType], from_dir: &Path, to_dir: &Path) -> Vec<LinkType> {
    let mut ret = Vec::new();
    if fs::create_dir_all(from_dir).is_err() || fs::create_dir_all(to_dir).is_err() {
        return ret;
    }

    let src = fsutil::tmp_fname(&from_dir.join(".link-probe"));
    if fs::write(&src, b"probe").is_err() {
        return ret;
    }

    for &typ in types {
        let dst = fsutil::tmp_fname(&to_dir.join(".link-probe"));
        match typ.link(&src, &dst) {
            Ok(()) => ret.push(typ),
            Err(e) => debug!(link = %typ, error = %e, "link type is not available"),
        }
        let _ = fsutil::remove(&dst);
    }
    let _ = fsutil::remove(&src);
    ret
}

/// True when `path` is neither a symlink nor a hardlink.
pub fn is_copy(path: &Path) -> bool {
    match fs::symlink_metadata(path) {
        Ok(meta) => !meta.file_type().is_symlink() && fsutil::nlink_of(&meta) <= 1,
        Err(_) => false,
    }
}
