//! VersionRecord - one observed state of one object during one validity interval
//!
//! Invariants:
//! - `start < end` whenever `end` is set
//! - Only `end` ever changes after creation, and only from open to bounded
//! - `hash` covers the oid and user fields, never the bookkeeping fields

use uuid::Uuid;

use super::oid::Oid;
use super::time::{open_end, Timestamp};
use super::value::{FieldMap, Value};
use crate::errors::{TimelineError, TimelineResult};

/// Record id field (assigned by the store)
pub const ID_FIELD: &str = "_id";
/// Object identity field
pub const OID_FIELD: &str = "_oid";
/// Content digest field
pub const HASH_FIELD: &str = "_hash";
/// Inclusive validity begin
pub const START_FIELD: &str = "_start";
/// Exclusive validity end (null = open)
pub const END_FIELD: &str = "_end";
/// Schema-version tag
pub const VERSION_FIELD: &str = "_v";
/// Error/diagnostic slot
pub const ERROR_FIELD: &str = "_e";

/// All bookkeeping fields; none of them contributes to the content hash.
pub const RESERVED_FIELDS: [&str; 7] = [
    ID_FIELD,
    OID_FIELD,
    HASH_FIELD,
    START_FIELD,
    END_FIELD,
    VERSION_FIELD,
    ERROR_FIELD,
];

/// Returns true if `name` is a bookkeeping field.
#[inline]
pub fn is_reserved(name: &str) -> bool {
    RESERVED_FIELDS.contains(&name)
}

/// Generates a fresh opaque record id.
pub fn new_record_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// A single time-bounded version of an object.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionRecord {
    id: String,
    oid: Oid,
    hash: String,
    start: Timestamp,
    end: Option<Timestamp>,
    version_counter: u32,
    fields: FieldMap,
}

impl VersionRecord {
    /// Creates a record from its parts.
    pub fn new(
        id: impl Into<String>,
        oid: Oid,
        hash: impl Into<String>,
        start: Timestamp,
        end: Option<Timestamp>,
        version_counter: u32,
        fields: FieldMap,
    ) -> Self {
        Self {
            id: id.into(),
            oid,
            hash: hash.into(),
            start,
            end,
            version_counter,
            fields,
        }
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[inline]
    pub fn oid(&self) -> &Oid {
        &self.oid
    }

    #[inline]
    pub fn hash(&self) -> &str {
        &self.hash
    }

    #[inline]
    pub fn start(&self) -> Timestamp {
        self.start
    }

    /// `None` means the version is still current.
    #[inline]
    pub fn end(&self) -> Option<Timestamp> {
        self.end
    }

    #[inline]
    pub fn version_counter(&self) -> u32 {
        self.version_counter
    }

    /// User fields, without bookkeeping fields.
    #[inline]
    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    /// Returns a user field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Returns true if this is the current version of its object.
    #[inline]
    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }

    /// Ordering key for `end`; open sorts after every bounded end.
    #[inline]
    pub fn end_key(&self) -> Timestamp {
        self.end.unwrap_or_else(open_end)
    }

    /// Point-in-time membership: `start <= date < end`.
    pub fn covers(&self, date: Timestamp) -> bool {
        self.start <= date && self.end.map_or(true, |end| end > date)
    }

    /// Returns true if `[start, end)` intersects this record's interval.
    pub fn overlaps(&self, start: Timestamp, end: Option<Timestamp>) -> bool {
        let other_end = end.unwrap_or_else(open_end);
        self.start < other_end && start < self.end_key()
    }

    /// Closes an open version at `end`.
    ///
    /// # Errors
    ///
    /// Fails if the record is already closed or `end` is not after `start`.
    pub fn close(&mut self, end: Timestamp) -> TimelineResult<()> {
        if let Some(existing) = self.end {
            return Err(TimelineError::validation(format!(
                "version {} of {} already ended at {}",
                self.id, self.oid, existing
            )));
        }
        if end <= self.start {
            return Err(TimelineError::validation(format!(
                "cannot end version {} of {} at {}: not after its start {}",
                self.id, self.oid, end, self.start
            )));
        }
        self.end = Some(end);
        Ok(())
    }

    /// Returns a copy with one extra user field.
    pub fn with_field(&self, name: impl Into<String>, value: Value) -> Self {
        let mut copy = self.clone();
        copy.fields.insert(name.into(), value);
        copy
    }

    /// Returns a copy keeping only the named user fields.
    ///
    /// Bookkeeping fields are always kept.
    pub fn project(&self, names: &[String]) -> Self {
        let mut copy = self.clone();
        copy.fields.retain(|name, _| names.iter().any(|n| n == name));
        copy
    }

    /// Looks up a field by name, including bookkeeping fields.
    pub fn value_of(&self, name: &str) -> Option<Value> {
        match name {
            ID_FIELD => Some(Value::Text(self.id.clone())),
            OID_FIELD => Some(self.oid.to_value()),
            HASH_FIELD => Some(Value::Text(self.hash.clone())),
            START_FIELD => Some(Value::Timestamp(self.start)),
            END_FIELD => Some(self.end.map_or(Value::Null, Value::Timestamp)),
            VERSION_FIELD => Some(Value::Int(self.version_counter as i64)),
            _ => self.fields.get(name).cloned(),
        }
    }

    /// Flattens the record into a single field map with bookkeeping keys.
    pub fn to_field_map(&self) -> FieldMap {
        let mut map = self.fields.clone();
        map.insert(ID_FIELD.to_string(), Value::Text(self.id.clone()));
        map.insert(OID_FIELD.to_string(), self.oid.to_value());
        map.insert(HASH_FIELD.to_string(), Value::Text(self.hash.clone()));
        map.insert(START_FIELD.to_string(), Value::Timestamp(self.start));
        map.insert(
            END_FIELD.to_string(),
            self.end.map_or(Value::Null, Value::Timestamp),
        );
        map.insert(
            VERSION_FIELD.to_string(),
            Value::Int(self.version_counter as i64),
        );
        map
    }

    /// Rebuilds a record from a flattened field map.
    ///
    /// # Errors
    ///
    /// Returns `TL_VALIDATION_FAILED` if a bookkeeping field is missing or
    /// has the wrong type.
    pub fn from_field_map(mut map: FieldMap) -> TimelineResult<Self> {
        let id = match map.remove(ID_FIELD) {
            Some(Value::Text(id)) => id,
            other => return Err(bad_field(ID_FIELD, "text", other)),
        };
        let oid = match map.remove(OID_FIELD) {
            Some(value) => Oid::from_value(&value)?,
            None => return Err(TimelineError::validation("_oid field MUST be defined")),
        };
        let hash = match map.remove(HASH_FIELD) {
            Some(Value::Text(hash)) => hash,
            other => return Err(bad_field(HASH_FIELD, "text", other)),
        };
        let start = match map.remove(START_FIELD) {
            Some(Value::Timestamp(ts)) => ts,
            other => return Err(bad_field(START_FIELD, "timestamp", other)),
        };
        let end = match map.remove(END_FIELD) {
            None | Some(Value::Null) => None,
            Some(Value::Timestamp(ts)) => Some(ts),
            other => return Err(bad_field(END_FIELD, "timestamp or null", other)),
        };
        let version_counter = match map.remove(VERSION_FIELD) {
            None | Some(Value::Null) => 0,
            Some(Value::Int(v)) if v >= 0 && v <= u32::MAX as i64 => v as u32,
            other => return Err(bad_field(VERSION_FIELD, "non-negative int", other)),
        };
        map.remove(ERROR_FIELD);

        if let Some(end) = end {
            if end <= start {
                return Err(TimelineError::validation(format!(
                    "record {} ends ({}) before it starts ({})",
                    id, end, start
                )));
            }
        }

        Ok(Self::new(id, oid, hash, start, end, version_counter, map))
    }
}

fn bad_field(name: &str, expected: &str, got: Option<Value>) -> TimelineError {
    let got = got.as_ref().map_or("missing", Value::type_name);
    TimelineError::validation(format!("{} must be {}, got {}", name, expected, got))
}

/// Earliest-first ordering used throughout the query layer.
pub fn by_start(a: &VersionRecord, b: &VersionRecord) -> std::cmp::Ordering {
    a.start
        .cmp(&b.start)
        .then_with(|| a.end_key().cmp(&b.end_key()))
        .then_with(|| a.id.cmp(&b.id))
}
