//! hashfile::utils
//!
//! Change-detection tokens for files and directories.

use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use super::hash::hash_bytes;
use super::ignore::{self, Ignore};
use super::pyjson;
use crate::core::fsutil;

/// md5 over the sorted JSON of `path -> mtime`.
///
/// Catches moves and renames inside a directory, which a plain max(mtime)
/// would miss.
pub fn tokenize_mtimes(files_mtimes: &BTreeMap<String, f64>) -> String {
    let data = pyjson::to_vec(files_mtimes).unwrap_or_default();
    hash_bytes(&data, "md5").unwrap_or_default()
}

/// `(mtime, size)` of a path.
///
/// For a file the mtime is nanoseconds since the epoch. For a directory it
/// is a token over every non-ignored file below it, and the size is the sum
/// of their sizes. Broken symlinks inside directories are skipped.
pub fn get_mtime_and_size(path: &Path, ignore: Option<&dyn Ignore>) -> io::Result<(String, u64)> {
    let info = fsutil::local_info(path)?;
    if !info.is_dir() {
        return Ok((fsutil::to_nanoseconds(info.mtime).to_string(), info.size));
    }

    let mut size = 0;
    let mut files_mtimes = BTreeMap::new();
    for file in ignore::find(path, ignore)? {
        let stats = match fsutil::local_info(&file) {
            Ok(stats) => stats,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };
        size += stats.size;
        files_mtimes.insert(file.to_string_lossy().into_owned(), stats.mtime);
    }

    Ok((tokenize_mtimes(&files_mtimes), size))
}
