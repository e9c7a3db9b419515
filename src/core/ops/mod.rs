//! core::ops
//!
//! Repository-wide locking for mutating commands.
//!
//! # Modules
//!
//! - [`lock`] - Exclusive repository lock
//!
//! # Architecture
//!
//! Every command that writes to the object database or the state database
//! acquires the exclusive repo lock first and holds it until it returns.
//! Read-only commands (`o2p`, `cat`, `ls`, `du`, ...) run without it.

pub mod lock;

pub use lock::{LockError, RepoLock};
