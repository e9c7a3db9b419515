//! core
//!
//! Domain types, configuration, and repository plumbing.
//!
//! # Modules
//!
//! - [`hash_info`] - Hash name/value pairs
//! - [`meta`] - File and directory metadata
//! - [`fsutil`] - Local filesystem helpers
//! - [`paths`] - Control directory layout
//! - [`ops`] - Repository locking
//! - [`config`] - Configuration schema and loading
//! - [`repo`] - Repository discovery and object database setup

pub mod config;
pub mod fsutil;
pub mod hash_info;
pub mod meta;
pub mod ops;
pub mod paths;
pub mod repo;
