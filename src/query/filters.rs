//! Predicate filtering for version records
//!
//! Strict matching: AND across predicates, no coercion between text and
//! numbers, missing or null fields never match. Ints and floats compare
//! numerically.

use std::cmp::Ordering;

use crate::model::{VersionRecord, Value};

/// Comparison applied to one field
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    Eq(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    /// Field equals any listed value
    In(Vec<Value>),
}

/// A single field predicate
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub field: String,
    pub op: FilterOp,
}

impl Predicate {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Eq(value.into()))
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Gt(value.into()))
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Gte(value.into()))
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Lt(value.into()))
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Lte(value.into()))
    }

    pub fn is_in(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::new(field, FilterOp::In(values))
    }

    fn new(field: impl Into<String>, op: FilterOp) -> Self {
        Self {
            field: field.into(),
            op,
        }
    }
}

/// Evaluates predicates against records
pub struct PredicateFilter;

impl PredicateFilter {
    /// Checks if a record matches all predicates
    pub fn matches(record: &VersionRecord, predicates: &[Predicate]) -> bool {
        predicates
            .iter()
            .all(|pred| Self::matches_predicate(record, pred))
    }

    fn matches_predicate(record: &VersionRecord, predicate: &Predicate) -> bool {
        let actual = match record.value_of(&predicate.field) {
            Some(v) if !v.is_null() => v,
            _ => return false,
        };

        match &predicate.op {
            FilterOp::Eq(expected) => Self::eq_match(&actual, expected),
            FilterOp::Gt(bound) => Self::ordered(&actual, bound, |o| o == Ordering::Greater),
            FilterOp::Gte(bound) => Self::ordered(&actual, bound, |o| o != Ordering::Less),
            FilterOp::Lt(bound) => Self::ordered(&actual, bound, |o| o == Ordering::Less),
            FilterOp::Lte(bound) => Self::ordered(&actual, bound, |o| o != Ordering::Greater),
            FilterOp::In(candidates) => candidates.iter().any(|c| Self::eq_match(&actual, c)),
        }
    }

    fn eq_match(actual: &Value, expected: &Value) -> bool {
        match actual.compare(expected) {
            Some(ordering) => ordering == Ordering::Equal,
            None => actual == expected,
        }
    }

    fn ordered(actual: &Value, bound: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
        actual.compare(bound).map_or(false, accept)
    }
}
