//! Object identity
//!
//! An oid is the caller-assigned, stable identity of a real-world entity
//! across all of its versions. Integers and strings are accepted.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::value::Value;
use crate::errors::{TimelineError, TimelineResult};

/// Stable object identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Oid {
    Int(i64),
    Text(String),
}

impl Oid {
    /// Reads an oid from a field value.
    ///
    /// # Errors
    ///
    /// Returns `TL_VALIDATION_FAILED` for null or non-scalar values.
    pub fn from_value(value: &Value) -> TimelineResult<Oid> {
        match value {
            Value::Int(i) => Ok(Oid::Int(*i)),
            Value::Text(s) => Ok(Oid::Text(s.clone())),
            Value::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                Ok(Oid::Int(*f as i64))
            }
            other => Err(TimelineError::validation(format!(
                "_oid must be an int or text value, got {}",
                other.type_name()
            ))),
        }
    }

    /// Converts back to a field value.
    pub fn to_value(&self) -> Value {
        match self {
            Oid::Int(i) => Value::Int(*i),
            Oid::Text(s) => Value::Text(s.clone()),
        }
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Oid::Int(i) => write!(f, "{}", i),
            Oid::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for Oid {
    fn from(v: i64) -> Self {
        Oid::Int(v)
    }
}

impl From<&str> for Oid {
    fn from(v: &str) -> Self {
        Oid::Text(v.to_string())
    }
}

impl From<String> for Oid {
    fn from(v: String) -> Self {
        Oid::Text(v)
    }
}
