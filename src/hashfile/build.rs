//! hashfile::build
//!
//! Turn a workspace path into objects.
//!
//! Building never touches the cache. It hashes the path (reusing state
//! where possible) and stages every resulting object in a [`ReferenceDB`]
//! that points back at the workspace files. Transferring from the staging
//! store to a [`HashFileDB`] is what actually stores the data.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use super::db::{HashFileDB, ReferenceDB};
use super::hash::{hash_bytes, hash_file, HashError};
use super::ignore::{self, Ignore, DEFAULT_IGNORE_FILE};
use super::obj::HashFile;
use super::tree::{Tree, TreeKey};
use super::Object;
use crate::core::fsutil;
use crate::core::hash_info::HashInfo;
use crate::core::meta::Meta;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("No such file or directory: '{}'", .0.display())]
    NotFound(PathBuf),

    #[error("{file} file should not be in collected dir path: '{}'", .path.display())]
    IgnoreInCollectedDir { file: &'static str, path: PathBuf },

    #[error(transparent)]
    Hash(#[from] HashError),

    #[error("{}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
}

impl BuildError {
    fn io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            BuildError::NotFound(path.to_path_buf())
        } else {
            BuildError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

#[derive(Default, Clone, Copy)]
pub struct BuildOptions<'a> {
    /// Hash only; file objects are not staged.
    pub dry_run: bool,
    pub ignore: Option<&'a dyn Ignore>,
}

/// Hash `path` and stage the resulting objects.
///
/// Returns the staging store, the meta of `path` and the built object: a
/// file object for a file, a digested tree for a directory.
pub fn build(
    odb: &HashFileDB,
    path: &Path,
    name: &str,
    opts: &BuildOptions<'_>,
) -> Result<(ReferenceDB, Meta, Object), BuildError> {
    let info = fsutil::local_info(path).map_err(|e| BuildError::io(path, e))?;
    let mut staging = ReferenceDB::new(name);

    if info.is_dir() {
        let (meta, tree) = build_tree(odb, &mut staging, path, name, opts)?;
        debug!("built tree '{}'", tree.oid().unwrap_or_default());
        Ok((staging, meta, Object::Tree(tree)))
    } else {
        let (meta, obj) = build_file(odb, &mut staging, path, name, opts.dry_run)?;
        Ok((staging, meta, Object::File(obj)))
    }
}

/// Build an object from in-memory content, e.g. data piped on stdin.
pub fn build_bytes(data: &[u8], name: &str) -> Result<(ReferenceDB, Meta, Object), BuildError> {
    let value = hash_bytes(data, name)?;
    let mut staging = ReferenceDB::new(name);
    staging.add_bytes(&value, data.to_vec());
    let obj = HashFile::new(PathBuf::from("-"), HashInfo::new(name, value));
    Ok((staging, Meta::with_size(data.len() as u64), Object::File(obj)))
}

fn build_file(
    odb: &HashFileDB,
    staging: &mut ReferenceDB,
    path: &Path,
    name: &str,
    dry_run: bool,
) -> Result<(Meta, HashFile), BuildError> {
    let (meta, hash_info) = hash_file(path, name, Some(odb.state())).map_err(|e| match e {
        HashError::Io(e) => BuildError::io(path, e),
        other => BuildError::Hash(other),
    })?;
    let oid = hash_info.value().unwrap_or_default().to_string();
    if !dry_run {
        staging.add(path.to_path_buf(), &oid);
    }
    Ok((meta, HashFile::new(path.to_path_buf(), hash_info)))
}

fn build_tree(
    odb: &HashFileDB,
    staging: &mut ReferenceDB,
    path: &Path,
    name: &str,
    opts: &BuildOptions<'_>,
) -> Result<(Meta, Tree), BuildError> {
    let mut tree_meta = Meta::dir();
    let mut size = 0;
    let mut nfiles = 0;
    let mut tree = Tree::new();

    let levels = ignore::walk(path, opts.ignore).map_err(|e| BuildError::io(path, e))?;
    for level in levels {
        if level.files.iter().any(|f| f == DEFAULT_IGNORE_FILE) {
            return Err(BuildError::IgnoreInCollectedDir {
                file: DEFAULT_IGNORE_FILE,
                path: level.root.join(DEFAULT_IGNORE_FILE),
            });
        }

        let rel_key: TreeKey = level
            .root
            .strip_prefix(path)
            .unwrap_or(Path::new(""))
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();

        for fname in &level.files {
            let (meta, obj) = build_file(odb, staging, &level.root.join(fname), name, opts.dry_run)?;
            let mut key = rel_key.clone();
            key.push(fname.clone());
            size += meta.size.unwrap_or(0);
            nfiles += 1;
            tree.add(key, Some(meta), obj.hash_info);
        }
    }

    tree.digest(name)?;
    if let Some(oid) = tree.oid() {
        staging.add_bytes(oid, tree.as_bytes());
    }
    tree_meta.size = Some(size);
    tree_meta.nfiles = Some(nfiles);
    Ok((tree_meta, tree))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashfile::db::ObjectStore;
    use crate::hashfile::ignore::IgnoreNames;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, HashFileDB) {
        let temp = TempDir::new().unwrap();
        let odb = HashFileDB::new(temp.path().join("cache"));
        (temp, odb)
    }

    #[test]
    fn build_file_stages_reference() {
        let (temp, odb) = setup();
        let path = temp.path().join("foo");
        fs::write(&path, "foo").unwrap();

        let (staging, meta, obj) = build(&odb, &path, "md5", &BuildOptions::default()).unwrap();
        assert_eq!(meta.size, Some(3));
        assert_eq!(obj.oid(), Some("acbd18db4cc2f85cedef654fccc4a4d8"));
        assert!(staging.exists("acbd18db4cc2f85cedef654fccc4a4d8"));
        // Nothing is written to the cache
        assert!(!odb.path().exists());
    }

    #[test]
    fn build_dir_digests_tree() {
        let (temp, odb) = setup();
        let data = temp.path().join("data");
        fs::create_dir(&data).unwrap();
        fs::write(data.join("bar"), "bar\n").unwrap();
        fs::write(data.join("baz"), "baz\n").unwrap();

        let (staging, meta, obj) = build(&odb, &data, "md5", &BuildOptions::default()).unwrap();
        assert_eq!(obj.oid(), Some("1f69c66028c35037e8bf67e5bc4ceb6a.dir"));
        assert!(meta.isdir);
        assert_eq!(meta.size, Some(8));
        assert_eq!(meta.nfiles, Some(2));
        assert_eq!(staging.len(), 3);
        assert!(staging.exists("1f69c66028c35037e8bf67e5bc4ceb6a.dir"));
    }

    #[test]
    fn nested_keys_and_dry_run() {
        let (temp, odb) = setup();
        let data = temp.path().join("data");
        fs::create_dir_all(data.join("sub/deeper")).unwrap();
        fs::write(data.join("sub/deeper/x"), "x").unwrap();

        let opts = BuildOptions {
            dry_run: true,
            ..BuildOptions::default()
        };
        let (staging, _, obj) = build(&odb, &data, "md5", &opts).unwrap();
        let tree = obj.as_tree().unwrap();
        let key: Vec<String> = vec!["sub".into(), "deeper".into(), "x".into()];
        assert!(tree.get(&key).is_some());
        // Only the tree itself is staged
        assert_eq!(staging.len(), 1);
    }

    #[test]
    fn dvcignore_inside_dir_is_rejected() {
        let (temp, odb) = setup();
        let data = temp.path().join("data");
        fs::create_dir(&data).unwrap();
        fs::write(data.join(".dvcignore"), "").unwrap();

        let err = build(&odb, &data, "md5", &BuildOptions::default()).unwrap_err();
        assert!(err
            .to_string()
            .starts_with(".dvcignore file should not be in collected dir path:"));
    }

    #[test]
    fn ignore_filters_files() {
        let (temp, odb) = setup();
        let data = temp.path().join("data");
        fs::create_dir(&data).unwrap();
        fs::write(data.join("keep"), "k").unwrap();
        fs::write(data.join("skip"), "s").unwrap();

        let ignore = IgnoreNames::new(["skip"]);
        let opts = BuildOptions {
            ignore: Some(&ignore),
            ..BuildOptions::default()
        };
        let (_, meta, _) = build(&odb, &data, "md5", &opts).unwrap();
        assert_eq!(meta.nfiles, Some(1));
    }

    #[test]
    fn missing_path_is_not_found() {
        let (temp, odb) = setup();
        let err = build(&odb, &temp.path().join("nope"), "md5", &BuildOptions::default()).unwrap_err();
        assert!(matches!(err, BuildError::NotFound(_)));
    }

    #[test]
    fn bytes_build() {
        let (staging, meta, obj) = build_bytes(b"foo", "md5").unwrap();
        assert_eq!(meta.size, Some(3));
        assert_eq!(staging.read(obj.oid().unwrap()).unwrap(), b"foo");
    }
}
