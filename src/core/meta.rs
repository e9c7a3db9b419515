//! core::meta
//!
//! Filesystem metadata attached to objects and index entries.

use std::io;
use std::path::Path;

use serde_json::{Map, Number, Value};

use crate::core::fsutil;

/// Size, file count and local identity of a path.
///
/// `to_dict` only emits fields that carry information, so a bare
/// `Meta::default()` serializes to `{}`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Meta {
    pub isdir: bool,
    pub size: Option<u64>,
    pub nfiles: Option<u64>,
    pub isexec: bool,
    pub inode: Option<u64>,
    pub mtime: Option<f64>,
    pub md5: Option<String>,
}

impl Meta {
    pub const PARAM_ISDIR: &'static str = "isdir";
    pub const PARAM_SIZE: &'static str = "size";
    pub const PARAM_NFILES: &'static str = "nfiles";
    pub const PARAM_ISEXEC: &'static str = "isexec";
    pub const PARAM_INODE: &'static str = "inode";
    pub const PARAM_MTIME: &'static str = "mtime";
    pub const PARAM_MD5: &'static str = "md5";

    /// Meta for a file of known size.
    pub fn with_size(size: u64) -> Self {
        Self {
            size: Some(size),
            ..Self::default()
        }
    }

    /// Empty directory meta with zeroed counters.
    pub fn dir() -> Self {
        Self {
            isdir: true,
            size: Some(0),
            nfiles: Some(0),
            ..Self::default()
        }
    }

    /// Build from a local stat result.
    pub fn from_info(info: &fsutil::LocalInfo) -> Self {
        let isdir = info.is_dir();
        Self {
            isdir,
            size: if isdir { None } else { Some(info.size) },
            nfiles: None,
            isexec: !isdir && info.is_exec(),
            inode: Some(info.ino),
            mtime: Some(info.mtime),
            md5: None,
        }
    }

    /// Stat `path` and build its meta.
    pub fn from_path(path: &Path) -> io::Result<Self> {
        Ok(Self::from_info(&fsutil::local_info(path)?))
    }

    pub fn to_dict(&self) -> Map<String, Value> {
        let mut ret = Map::new();
        if self.isdir {
            ret.insert(Self::PARAM_ISDIR.into(), Value::Bool(true));
        }
        if let Some(size) = self.size {
            ret.insert(Self::PARAM_SIZE.into(), Value::from(size));
        }
        if let Some(nfiles) = self.nfiles {
            ret.insert(Self::PARAM_NFILES.into(), Value::from(nfiles));
        }
        if self.isexec {
            ret.insert(Self::PARAM_ISEXEC.into(), Value::Bool(true));
        }
        if let Some(inode) = self.inode {
            ret.insert(Self::PARAM_INODE.into(), Value::from(inode));
        }
        if let Some(mtime) = self.mtime.and_then(Number::from_f64) {
            ret.insert(Self::PARAM_MTIME.into(), Value::Number(mtime));
        }
        if let Some(md5) = &self.md5 {
            ret.insert(Self::PARAM_MD5.into(), Value::String(md5.clone()));
        }
        ret
    }

    pub fn from_dict(d: &Map<String, Value>) -> Self {
        Self {
            isdir: d.get(Self::PARAM_ISDIR).and_then(Value::as_bool).unwrap_or(false),
            size: d.get(Self::PARAM_SIZE).and_then(Value::as_u64),
            nfiles: d.get(Self::PARAM_NFILES).and_then(Value::as_u64),
            isexec: d.get(Self::PARAM_ISEXEC).and_then(Value::as_bool).unwrap_or(false),
            inode: d.get(Self::PARAM_INODE).and_then(Value::as_u64),
            mtime: d.get(Self::PARAM_MTIME).and_then(Value::as_f64),
            md5: d.get(Self::PARAM_MD5).and_then(Value::as_str).map(String::from),
        }
    }

    /// Value of the hash field named `name`, if meta carries one.
    pub fn hash_value(&self, name: &str) -> Option<&str> {
        match name {
            Self::PARAM_MD5 => self.md5.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn to_dict_skips_unset_fields() {
        assert!(Meta::default().to_dict().is_empty());

        let meta = Meta {
            size: Some(3),
            isexec: false,
            ..Meta::default()
        };
        let d = meta.to_dict();
        assert_eq!(d.len(), 1);
        assert_eq!(d["size"], 3);
    }

    #[test]
    fn dict_roundtrip_keeps_flags() {
        let meta = Meta {
            isdir: false,
            size: Some(10),
            nfiles: Some(2),
            isexec: true,
            inode: Some(42),
            mtime: Some(1.5),
            md5: Some("abc".into()),
        };
        assert_eq!(Meta::from_dict(&meta.to_dict()), meta);
    }

    #[test]
    fn from_path_reads_size_and_kind() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("foo");
        std::fs::write(&file, "foo").unwrap();

        let meta = Meta::from_path(&file).unwrap();
        assert_eq!(meta.size, Some(3));
        assert!(!meta.isdir);
        assert!(meta.inode.is_some());

        let meta = Meta::from_path(temp.path()).unwrap();
        assert!(meta.isdir);
        assert_eq!(meta.size, None);
    }
}
