//! ui::output
//!
//! Output formatting and display.
//!
//! # Design
//!
//! Command results go to stdout and respect the quiet flag. Errors and
//! warnings go to stderr.

use std::fmt::Display;
use std::num::ParseIntError;

use thiserror::Error;

/// Output verbosity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// Quiet mode - minimal output
    Quiet,
    /// Normal mode - standard output
    Normal,
    /// Debug mode - verbose output
    Debug,
}

impl Verbosity {
    /// Create verbosity from flags.
    pub fn from_flags(quiet: bool, debug: bool) -> Self {
        if quiet {
            Verbosity::Quiet
        } else if debug {
            Verbosity::Debug
        } else {
            Verbosity::Normal
        }
    }
}

/// Print a message (respects quiet mode).
pub fn print(message: impl Display, verbosity: Verbosity) {
    if verbosity != Verbosity::Quiet {
        println!("{}", message);
    }
}

/// Print an error message (always shown).
pub fn error(message: impl Display) {
    eprintln!("error: {}", message);
}

/// Print a warning message (respects quiet mode).
pub fn warn(message: impl Display, verbosity: Verbosity) {
    if verbosity != Verbosity::Quiet {
        eprintln!("warning: {}", message);
    }
}

const SIZE_UNITS: [&str; 8] = ["", "k", "M", "G", "T", "P", "E", "Z"];

/// Human readable size with three significant digits, e.g. `1.00kB`,
/// `12.3MB`, `512B`.
pub fn format_sizeof(num: u64) -> String {
    let mut num = num as f64;
    for unit in SIZE_UNITS {
        if num.abs() < 999.5 {
            if num.abs() < 99.95 {
                if num.abs() < 9.995 {
                    return format!("{num:1.2}{unit}B");
                }
                return format!("{num:2.1}{unit}B");
            }
            return format!("{num:3.0}{unit}B");
        }
        num /= 1024.0;
    }
    format!("{num:3.1}YB")
}

const MULTIPLIERS: [(&str, u64); 8] = [
    ("kib", 1 << 10),
    ("mib", 1 << 20),
    ("gib", 1 << 30),
    ("tib", 1 << 40),
    ("kb", 1 << 10),
    ("mb", 1 << 20),
    ("gb", 1 << 30),
    ("tb", 1 << 40),
];

#[derive(Debug, Error)]
pub enum SizeError {
    #[error(transparent)]
    Parse(#[from] ParseIntError),

    #[error("size '{0}' is too large")]
    Overflow(String),
}

/// Parse sizes like `100`, `1kb`, `10MiB`. All multipliers are powers
/// of 1024.
pub fn human_readable_to_bytes(value: &str) -> Result<u64, SizeError> {
    let value = value.trim().to_lowercase();
    for (suffix, multiplier) in MULTIPLIERS {
        if let Some(number) = value.strip_suffix(suffix) {
            return number
                .parse::<u64>()?
                .checked_mul(multiplier)
                .ok_or(SizeError::Overflow(value));
        }
    }
    Ok(value.parse()?)
}

/// Lay out `rows` (the first one being the header) in left-aligned
/// columns, dropping columns that are empty in every non-header row.
pub fn format_table(rows: &[Vec<String>]) -> Vec<String> {
    let Some(header) = rows.first() else {
        return Vec::new();
    };
    let columns: Vec<usize> = (0..header.len())
        .filter(|&i| rows[1..].iter().any(|row| row.get(i).is_some_and(|c| !c.is_empty())))
        .collect();
    let widths: Vec<usize> = columns
        .iter()
        .map(|&i| {
            rows.iter()
                .map(|row| row.get(i).map_or(0, |c| c.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    rows.iter()
        .map(|row| {
            columns
                .iter()
                .zip(&widths)
                .map(|(&i, &width)| {
                    let cell = row.get(i).map_or("", String::as_str);
                    format!("{cell:<width$}")
                })
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect()
}

pub fn print_table(rows: &[Vec<String>]) {
    for line in format_table(rows) {
        println!("{}", line);
    }
}
