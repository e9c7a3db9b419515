//! check-link command - Show how workspace files are linked to the cache

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};

use crate::cli::Context;
use crate::core::fsutil::{self, filemode};

/// Inode to path of every object file under `object_dir`.
fn object_inodes(object_dir: &Path) -> Result<HashMap<u64, PathBuf>> {
    let mut ret = HashMap::new();
    let entries = fs::read_dir(object_dir)
        .with_context(|| format!("failed to read '{}'", object_dir.display()))?;
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() || entry.file_name().len() != 2 {
            continue;
        }
        for obj in fs::read_dir(entry.path())? {
            let obj = obj?;
            if obj.file_type()?.is_file() {
                let meta = fs::symlink_metadata(obj.path())?;
                ret.insert(fsutil::ino_of(&meta), obj.path());
            }
        }
    }
    Ok(ret)
}

/// Print `mode path kind [target]` for every file at or below `path`.
///
/// `kind` is `symlink`, `hardlink` (to an object in `object_dir`),
/// `broken` or `unknown`.
pub fn check_link(ctx: &Context, path: &Path, object_dir: Option<&Path>) -> Result<()> {
    let object_dir = match object_dir {
        Some(dir) => ctx.resolve(dir)?,
        None => ctx.repo()?.object_dir(),
    };
    let path = match ctx.cwd {
        Some(_) => ctx.resolve(path)?,
        None => path.to_path_buf(),
    };
    let path = path.as_path();
    let files = if path.is_file() {
        vec![path.to_path_buf()]
    } else {
        fsutil::find(path).with_context(|| format!("failed to walk '{}'", path.display()))?
    };

    let mut inodes: Option<HashMap<u64, PathBuf>> = None;
    for file in files {
        let (mode, infos) = match fsutil::local_info(&file) {
            Ok(info) => {
                let mut infos = vec!["unknown".to_string()];
                if let Some(dest) = &info.destination {
                    infos = vec!["symlink".to_string(), dest.display().to_string()];
                } else if info.nlink > 1 {
                    if inodes.is_none() {
                        inodes = Some(object_inodes(&object_dir)?);
                    }
                    if let Some(obj) = inodes.as_ref().and_then(|m| m.get(&info.ino)) {
                        infos = vec!["hardlink".to_string(), obj.display().to_string()];
                    }
                }
                (info.mode, infos)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound && file.is_symlink() => {
                let dest = fs::read_link(&file)?;
                (0, vec!["broken".to_string(), dest.display().to_string()])
            }
            Err(e) => return Err(e).with_context(|| format!("failed to stat '{}'", file.display())),
        };
        println!("{} {} {}", filemode(mode), file.display(), infos.join(" "));
    }
    Ok(())
}
