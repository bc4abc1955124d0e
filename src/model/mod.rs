//! Version record model
//!
//! This module provides:
//! - `Value` - Tagged field value used for all user fields
//! - `Oid` - Caller-assigned object identity
//! - `VersionRecord` - One time-bounded state of one object
//! - Timestamp parsing shared by ingest and query
//!
//! # Invariants
//!
//! - For a given oid at most one record has an open `end`
//! - The `[start, end)` intervals of one oid never overlap
//! - Once `end` is set a record never changes again

mod oid;
mod record;
mod time;
mod value;

pub use oid::Oid;
pub use record::{
    by_start, is_reserved, new_record_id, VersionRecord, END_FIELD, ERROR_FIELD, HASH_FIELD,
    ID_FIELD, OID_FIELD, RESERVED_FIELDS, START_FIELD, VERSION_FIELD,
};
pub use time::{from_epoch_seconds, open_end, parse_timestamp, to_epoch_micros, Timestamp};
pub use value::{FieldMap, Value, DATE_TAG};
