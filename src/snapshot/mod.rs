//! Snapshot files
//!
//! Offline copies of query results. A snapshot holds the raw rows behind a
//! `VersionSet` and loads back into one bound to a caller-chosen date range.
//!
//! # Design Principles
//!
//! - Atomic visibility (temp file, fsync, rename)
//! - Every loaded row is re-validated

mod file;

pub use file::{load_snapshot, save_snapshot};
