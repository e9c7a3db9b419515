//! core::fsutil
//!
//! Local filesystem helpers shared by the object database, the state
//! database and checkout.
//!
//! Everything here works on plain paths. Walks are sorted so that builds
//! are reproducible, and they never descend into symlinked directories.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Kind of a filesystem entry after following symlinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Directory,
    Other,
}

/// `lstat`/`stat` summary of a local path.
#[derive(Debug, Clone)]
pub struct LocalInfo {
    pub size: u64,
    pub kind: FileKind,
    pub islink: bool,
    pub mode: u32,
    pub ino: u64,
    pub nlink: u64,
    /// Seconds since the epoch, with sub-second precision.
    pub mtime: f64,
    /// Link target when `islink`.
    pub destination: Option<PathBuf>,
}

impl LocalInfo {
    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }

    pub fn is_exec(&self) -> bool {
        self.mode & 0o111 != 0
    }
}

/// Stat `path`, following a trailing symlink but remembering that it was one.
///
/// A broken symlink yields `NotFound`.
pub fn local_info(path: &Path) -> io::Result<LocalInfo> {
    let lmeta = fs::symlink_metadata(path)?;
    let islink = lmeta.file_type().is_symlink();
    let meta = if islink { fs::metadata(path)? } else { lmeta };

    let kind = if meta.is_dir() {
        FileKind::Directory
    } else if meta.is_file() {
        FileKind::File
    } else {
        FileKind::Other
    };

    let destination = if islink {
        Some(fs::read_link(path)?)
    } else {
        None
    };

    Ok(LocalInfo {
        size: meta.len(),
        kind,
        islink,
        mode: mode_of(&meta),
        ino: ino_of(&meta),
        nlink: nlink_of(&meta),
        mtime: mtime_of(&meta),
        destination,
    })
}

pub fn mtime_of(meta: &fs::Metadata) -> f64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(unix)]
pub fn mode_of(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::MetadataExt;
    meta.mode()
}

#[cfg(not(unix))]
pub fn mode_of(meta: &fs::Metadata) -> u32 {
    let base = if meta.is_dir() { 0o040755 } else { 0o100644 };
    if meta.permissions().readonly() {
        base & !0o222
    } else {
        base
    }
}

#[cfg(unix)]
pub fn ino_of(meta: &fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    meta.ino()
}

#[cfg(not(unix))]
pub fn ino_of(_meta: &fs::Metadata) -> u64 {
    0
}

#[cfg(unix)]
pub fn nlink_of(meta: &fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    meta.nlink()
}

#[cfg(not(unix))]
pub fn nlink_of(_meta: &fs::Metadata) -> u64 {
    1
}

/// Inode of `path` (following symlinks).
pub fn inode(path: &Path) -> io::Result<u64> {
    Ok(ino_of(&fs::metadata(path)?))
}

/// Set permission bits on `path`. No-op on platforms without unix modes.
#[cfg(unix)]
pub fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
pub fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_readonly(mode & 0o222 == 0);
    fs::set_permissions(path, perms)
}

/// Permission bits of `path` without the file type.
pub fn permission_bits(path: &Path) -> io::Result<u32> {
    Ok(mode_of(&fs::metadata(path)?) & 0o7777)
}

pub fn to_nanoseconds(ts: f64) -> i128 {
    (ts * 1_000_000_000.0).round() as i128
}

/// `ls -l` style mode string, e.g. `-rw-r--r--`.
pub fn filemode(mode: u32) -> String {
    let kind = match mode & 0o170000 {
        0o040000 => 'd',
        0o120000 => 'l',
        0o020000 => 'c',
        0o060000 => 'b',
        0o010000 => 'p',
        0o140000 => 's',
        0o100000 => '-',
        _ => '?',
    };
    let mut out = String::with_capacity(10);
    out.push(kind);

    let triples = [
        (0o400, 0o200, 0o100, 0o4000, 's', 'S'),
        (0o040, 0o020, 0o010, 0o2000, 's', 'S'),
        (0o004, 0o002, 0o001, 0o1000, 't', 'T'),
    ];
    for (r, w, x, special, set_exec, set_noexec) in triples {
        out.push(if mode & r != 0 { 'r' } else { '-' });
        out.push(if mode & w != 0 { 'w' } else { '-' });
        out.push(match (mode & x != 0, mode & special != 0) {
            (true, true) => set_exec,
            (false, true) => set_noexec,
            (true, false) => 'x',
            (false, false) => '-',
        });
    }
    out
}

/// One level of a directory walk.
#[derive(Debug, Clone)]
pub struct WalkEntry {
    pub root: PathBuf,
    pub dirs: Vec<String>,
    pub files: Vec<String>,
}

/// Top-down walk of `top`, sorted by name at every level.
///
/// Symlinks to directories are listed in `dirs` but not descended into.
/// Symlinks to files, including broken ones, are listed in `files`.
pub fn walk(top: &Path) -> io::Result<Vec<WalkEntry>> {
    let mut out = Vec::new();
    let mut stack = vec![top.to_path_buf()];

    while let Some(root) = stack.pop() {
        let mut dirs = Vec::new();
        let mut files = Vec::new();
        let mut descend = Vec::new();

        for entry in fs::read_dir(&root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let ftype = entry.file_type()?;
            if ftype.is_dir() {
                descend.push(name.clone());
                dirs.push(name);
            } else if ftype.is_symlink() && entry.path().is_dir() {
                dirs.push(name);
            } else {
                files.push(name);
            }
        }

        dirs.sort();
        files.sort();
        descend.sort();
        for name in descend.iter().rev() {
            stack.push(root.join(name));
        }
        out.push(WalkEntry { root, dirs, files });
    }

    Ok(out)
}

/// Every file below `top`, in walk order.
pub fn find(top: &Path) -> io::Result<Vec<PathBuf>> {
    Ok(walk(top)?
        .into_iter()
        .flat_map(|e| {
            let root = e.root;
            e.files.into_iter().map(move |f| root.join(f))
        })
        .collect())
}

/// Unique temporary sibling name for `path`.
pub fn tmp_fname(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));
    PathBuf::from(name)
}

/// Write `contents` to `path` atomically (temp file, fsync, rename).
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = tmp_fname(path);
    let result = (|| {
        let mut file = File::create(&tmp)?;
        file.write_all(contents)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

/// Remove a file, symlink or directory tree. Missing paths are not an error.
pub fn remove(path: &Path) -> io::Result<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// `path` relative to `base` when it is below it, otherwise unchanged.
pub fn relpath(path: &Path, base: &Path) -> PathBuf {
    path.strip_prefix(base)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| path.to_path_buf())
}
