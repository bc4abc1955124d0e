//! Object state normalizer
//!
//! Turns a raw ingest state into a clean field map plus validity bounds and
//! a content hash. Normalization is pure: it never touches storage.
//!
//! Rejected inputs (TL_VALIDATION_FAILED):
//! - `_oid` missing or null
//! - `_id`, `_hash`, `_v` or `_e` supplied by the caller
//! - `_end` without `_start`
//! - `_end` not after `_start`
//! - `_start` / `_end` not convertible to a timestamp
//! - a key starting with `$`, at any depth
//! - a NaN or infinite float, at any depth

use regex::Regex;

use super::hash::content_hash;
use crate::config::TimelineConfig;
use crate::errors::{TimelineError, TimelineResult};
use crate::model::{
    from_epoch_seconds, parse_timestamp, FieldMap, Oid, Timestamp, Value, END_FIELD,
    ERROR_FIELD, HASH_FIELD, ID_FIELD, OID_FIELD, START_FIELD, VERSION_FIELD,
};

/// Fields a caller may never supply.
const FORBIDDEN_FIELDS: [&str; 4] = [ID_FIELD, HASH_FIELD, VERSION_FIELD, ERROR_FIELD];

/// A validated object state, ready to be classified by the ingest engine.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedState {
    /// Object identity
    pub oid: Oid,
    /// User fields (no bookkeeping keys)
    pub fields: FieldMap,
    /// Inclusive validity begin (batch mtime if not supplied)
    pub start: Timestamp,
    /// Explicit exclusive end, for historical backfill
    pub end: Option<Timestamp>,
    /// Content digest of oid + fields
    pub hash: String,
}

impl NormalizedState {
    /// Returns true if the caller supplied an explicit `_end`.
    #[inline]
    pub fn is_backfill(&self) -> bool {
        self.end.is_some()
    }
}

/// Key cleanup rules: lowercase, whitespace runs to `_`, drop non-word chars.
struct KeyCleaner {
    spaces: Regex,
    non_word: Regex,
}

impl KeyCleaner {
    fn new() -> TimelineResult<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| {
                TimelineError::validation(format!("invalid key pattern {}: {}", pattern, e))
            })
        };
        Ok(Self {
            spaces: compile(r"\s+")?,
            non_word: compile(r"[^\w]+")?,
        })
    }

    fn clean(&self, key: &str) -> String {
        let lowered = key.to_lowercase();
        let underscored = self.spaces.replace_all(&lowered, "_");
        self.non_word.replace_all(&underscored, "").into_owned()
    }
}

/// Validates and hashes raw object states.
pub struct Normalizer {
    cleaner: Option<KeyCleaner>,
    empty_strings_as_null: bool,
}

impl Normalizer {
    /// Creates a normalizer for the given configuration.
    pub fn new(config: &TimelineConfig) -> TimelineResult<Self> {
        let cleaner = if config.normalize_field_names {
            Some(KeyCleaner::new()?)
        } else {
            None
        };
        Ok(Self {
            cleaner,
            empty_strings_as_null: config.empty_strings_as_null,
        })
    }

    /// Normalizes one raw state.
    ///
    /// `mtime` is the batch ingest moment, used as `start` when the state
    /// carries none.
    pub fn normalize(&self, raw: FieldMap, mtime: Timestamp) -> TimelineResult<NormalizedState> {
        let mut fields = self.clean_fields(raw)?;
        for (key, value) in &fields {
            check_storable(key, value)?;
        }

        for forbidden in FORBIDDEN_FIELDS {
            if fields.contains_key(forbidden) {
                return Err(TimelineError::validation(format!(
                    "{} field CAN NOT be defined",
                    forbidden
                )));
            }
        }

        let oid = match fields.remove(OID_FIELD) {
            None | Some(Value::Null) => {
                return Err(TimelineError::validation("_oid field MUST be defined"))
            }
            Some(value) => Oid::from_value(&value)?,
        };

        let start = take_timestamp(&mut fields, START_FIELD)?;
        let end = take_timestamp(&mut fields, END_FIELD)?;

        let start = match (start, end) {
            (None, Some(_)) => {
                return Err(TimelineError::validation(format!(
                    "object {} has _end but no _start",
                    oid
                )))
            }
            (Some(start), _) => start,
            (None, None) => mtime,
        };

        if let Some(end) = end {
            if end <= start {
                return Err(TimelineError::validation(format!(
                    "object {} has _end ({}) not after _start ({})",
                    oid, end, start
                )));
            }
        }

        let hash = content_hash(&oid, &fields);
        Ok(NormalizedState {
            oid,
            fields,
            start,
            end,
            hash,
        })
    }

    fn clean_fields(&self, raw: FieldMap) -> TimelineResult<FieldMap> {
        if self.cleaner.is_none() && !self.empty_strings_as_null {
            return Ok(raw);
        }

        let mut cleaned = FieldMap::new();
        for (key, value) in raw {
            let key = match &self.cleaner {
                Some(cleaner) => cleaner.clean(&key),
                None => key,
            };
            let value = match value {
                Value::Text(s) if self.empty_strings_as_null && s.is_empty() => Value::Null,
                other => other,
            };
            if cleaned.insert(key.clone(), value).is_some() {
                return Err(TimelineError::validation(format!(
                    "field names collide after normalization: {}",
                    key
                )));
            }
        }
        Ok(cleaned)
    }
}

/// Rejects values a snapshot file could not carry back unchanged.
fn check_storable(key: &str, value: &Value) -> TimelineResult<()> {
    if key.starts_with('$') {
        return Err(TimelineError::validation(format!(
            "field {}: keys starting with $ are not allowed",
            key
        )));
    }
    match value {
        Value::Float(f) if !f.is_finite() => Err(TimelineError::validation(format!(
            "field {} holds a non-finite float ({})",
            key, f
        ))),
        Value::List(items) => items.iter().try_for_each(|item| check_storable(key, item)),
        Value::Map(map) => map
            .iter()
            .try_for_each(|(inner, item)| check_storable(inner, item)),
        _ => Ok(()),
    }
}

/// Removes a validity field and coerces it to a timestamp.
fn take_timestamp(fields: &mut FieldMap, name: &str) -> TimelineResult<Option<Timestamp>> {
    let value = match fields.remove(name) {
        None | Some(Value::Null) => return Ok(None),
        Some(value) => value,
    };
    let converted = match &value {
        Value::Timestamp(ts) => Ok(*ts),
        Value::Int(secs) => from_epoch_seconds(*secs as f64),
        Value::Float(secs) => from_epoch_seconds(*secs),
        Value::Text(text) => parse_timestamp(text),
        other => Err(TimelineError::validation(format!(
            "{} must be a timestamp, got {}",
            name,
            other.type_name()
        ))),
    };
    converted
        .map(Some)
        .map_err(|e| TimelineError::validation(format!("invalid {}: {}", name, e.message())))
}
