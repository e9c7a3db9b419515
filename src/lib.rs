//! dvc-data - Content-addressed data management
//!
//! dvc-data hashes files and directories, stores them in a content-addressed
//! object database, and describes directories as tree objects that can be
//! diffed, transferred between databases, and checked out into a workspace
//! with copies or links.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface layer (parses args, delegates to handlers)
//! - [`core`] - Hash info, metadata, filesystem helpers, config and the repository
//! - [`hashfile`] - Hashing, object databases, trees, build/diff/transfer/checkout
//! - [`index`] - Path-keyed data index over trees and storages
//! - [`bench`] - Benchmark result comparison
//! - [`ui`] - Output formatting and prompts
//!
//! # Invariants
//!
//! 1. An object's path in a database is derived from its oid alone
//! 2. Objects are written through a temporary file and renamed into place
//! 3. Tree objects list their entries sorted by key
//! 4. Mutating commands hold the repository lock

pub mod bench;
pub mod cli;
pub mod core;
pub mod hashfile;
pub mod index;
pub mod ui;
