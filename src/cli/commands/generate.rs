//! gensparse, genrand and gentree commands - Generate test data

use std::f64::consts::PI;
use std::fs::{self, File};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use anyhow::{bail, Context as _, Result};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

use crate::cli::Context;
use crate::ui::output::human_readable_to_bytes;

const WRITE_CHUNK: usize = 1 << 20;

fn parse_size(size: &str) -> Result<u64> {
    human_readable_to_bytes(size).with_context(|| format!("invalid size '{size}'"))
}

/// Create a sparse file of `size` bytes.
pub fn gensparse(ctx: &Context, file: &Path, size: &str) -> Result<()> {
    let size = parse_size(size)?;
    if size == 0 {
        bail!("size must be at least one byte");
    }
    let path = ctx.resolve(file)?;
    let mut f = File::create(&path).with_context(|| format!("failed to create '{}'", path.display()))?;
    f.seek(SeekFrom::Start(size - 1))?;
    f.write_all(b"\0")?;
    Ok(())
}

fn write_random(path: &Path, size: u64, rng: &mut impl RngCore) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create '{}'", path.display()))?;
    let mut out = BufWriter::new(file);
    let mut buf = vec![0u8; WRITE_CHUNK];
    let mut left = size;
    while left > 0 {
        let n = left.min(WRITE_CHUNK as u64) as usize;
        rng.fill_bytes(&mut buf[..n]);
        out.write_all(&buf[..n])?;
        left -= n as u64;
    }
    out.flush()?;
    Ok(())
}

/// Create a file of `size` random bytes.
pub fn genrand(ctx: &Context, file: &Path, size: &str) -> Result<()> {
    let size = parse_size(size)?;
    write_random(&ctx.resolve(file)?, size, &mut rand::rng())
}

/// Normally distributed integer around `num` with a standard deviation of
/// `sigma * num`, clamped at zero.
fn rand_gauss_int(rng: &mut impl Rng, num: u64, sigma: f64) -> u64 {
    // Box-Muller
    let u1: f64 = 1.0 - rng.random::<f64>();
    let u2: f64 = rng.random::<f64>();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos();
    let mean = num as f64;
    (mean + z * sigma * mean).round().max(0.0) as u64
}

/// Digits needed to print numbers below `n`.
fn width(n: u64) -> usize {
    (n.max(1) as f64).log10() as usize + 1
}

struct TreeShape {
    dirs_per_dir: u64,
    files_per_dir: u64,
    file_size: u64,
}

fn fill_tree(root: &Path, shape: &TreeShape, depth: u32, rng: &mut StdRng) -> Result<()> {
    let nfiles = rand_gauss_int(rng, shape.files_per_dir, 0.2);
    let digits = width(shape.files_per_dir);
    for num in 0..nfiles {
        let size = rand_gauss_int(rng, shape.file_size, 0.2);
        write_random(&root.join(format!("{num:0digits$}.txt")), size, rng)?;
    }

    if depth < 1 {
        return Ok(());
    }

    let ndirs = rand_gauss_int(rng, shape.dirs_per_dir, 0.2);
    let digits = width(shape.dirs_per_dir);
    for num in 0..ndirs {
        let dir = root.join(format!("dir{num:0digits$}"));
        fs::create_dir(&dir).with_context(|| format!("failed to create '{}'", dir.display()))?;
        fill_tree(&dir, shape, depth - 1, rng)?;
    }
    Ok(())
}

/// Generate a random directory tree of roughly `num` files and `size`
/// bytes, `depth` levels deep. The same seed yields the same tree.
pub fn gentree(ctx: &Context, path: &Path, num: usize, size: &str, depth: u32, seed: u64) -> Result<()> {
    if num == 0 {
        bail!("number of files must be positive");
    }
    let num = num as u64;
    let files_per_dir = (num / 1000).max(1);
    let total_dirs = num as f64 / files_per_dir as f64;
    let dirs_per_dir = total_dirs.powf(1.0 / f64::from(depth)).round() as u64;
    let file_size = (parse_size(size)? as f64 / num as f64).round() as u64;

    let path = ctx.resolve(path)?;
    if path.exists() {
        bail!("'{}' already exists", path.display());
    }
    fs::create_dir_all(&path).with_context(|| format!("failed to create '{}'", path.display()))?;
    println!(
        "total_dirs={total_dirs:?}, dirs_per_dir={dirs_per_dir}, \
         files_per_dir={files_per_dir}, file_size={file_size}, depth={depth}"
    );

    let shape = TreeShape {
        dirs_per_dir,
        files_per_dir,
        file_size,
    };
    fill_tree(&path, &shape, depth, &mut StdRng::seed_from_u64(seed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ctx(temp: &TempDir) -> Context {
        Context {
            cwd: Some(temp.path().to_path_buf()),
            ..Context::default()
        }
    }

    #[test]
    fn generated_files_have_requested_size() {
        let temp = TempDir::new().unwrap();
        gensparse(&ctx(&temp), Path::new("sparse"), "1kb").unwrap();
        genrand(&ctx(&temp), Path::new("rand"), "100").unwrap();
        assert_eq!(fs::metadata(temp.path().join("sparse")).unwrap().len(), 1024);
        assert_eq!(fs::metadata(temp.path().join("rand")).unwrap().len(), 100);
    }

    #[test]
    fn gentree_is_reproducible() {
        let temp = TempDir::new().unwrap();
        gentree(&ctx(&temp), Path::new("a"), 20, "2kb", 2, 7).unwrap();
        gentree(&ctx(&temp), Path::new("b"), 20, "2kb", 2, 7).unwrap();

        let listing = |root: &Path| -> Vec<(String, u64)> {
            let mut files: Vec<(String, u64)> = crate::core::fsutil::find(root)
                .unwrap()
                .into_iter()
                .map(|p| {
                    let rel = p.strip_prefix(root).unwrap().to_string_lossy().into_owned();
                    (rel, fs::metadata(&p).unwrap().len())
                })
                .collect();
            files.sort();
            files
        };
        let a = listing(&temp.path().join("a"));
        assert!(!a.is_empty());
        assert_eq!(a, listing(&temp.path().join("b")));

        assert!(gentree(&ctx(&temp), Path::new("a"), 20, "0", 2, 7).is_err());
    }
}
