//! Identity and hashing
//!
//! Per-state validation, bookkeeping field extraction and content hashing.
//! Two states of the same object with identical user fields always produce
//! the same hash, regardless of key order or validity bounds.

mod hash;
mod normalizer;

pub use hash::{canonical_encoding, content_hash};
pub use normalizer::{NormalizedState, Normalizer};
