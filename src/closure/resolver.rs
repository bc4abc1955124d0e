//! Bounded dependency closure
//!
//! Breadth-first expansion over a reference field. Each round fetches the
//! current fringe, reads the referenced oids and keeps only the ones not
//! seen before. Stops when the fringe is empty or after `max_depth` rounds,
//! so cyclic references terminate.

use std::collections::BTreeSet;

use crate::errors::{TimelineError, TimelineResult};
use crate::model::{Oid, Value};
use crate::observability::{log_event, Event};
use crate::query::{DateRange, FindQuery, QueryEngine};

/// Resolves dependency closures through a query engine.
pub struct ClosureResolver<'a> {
    engine: &'a QueryEngine,
}

impl<'a> ClosureResolver<'a> {
    pub fn new(engine: &'a QueryEngine) -> Self {
        Self { engine }
    }

    /// Returns the sorted set of `seeds` plus every oid reachable through
    /// `field` at `date`.
    ///
    /// `max_depth = None` expands until no new oid appears.
    ///
    /// # Errors
    ///
    /// `TL_FORMAT_INVALID` for a bad date token, `TL_VALIDATION_FAILED` if
    /// the reference field holds something other than oids.
    pub fn closure(
        &self,
        collection: &str,
        seeds: &[Oid],
        field: &str,
        date: Option<&str>,
        max_depth: Option<usize>,
    ) -> TimelineResult<Vec<Oid>> {
        DateRange::parse(date)?;

        let mut visited: BTreeSet<Oid> = seeds.iter().cloned().collect();
        let mut fringe: Vec<Oid> = visited.iter().cloned().collect();
        let mut rounds = 0usize;

        while !fringe.is_empty() {
            if max_depth.map_or(false, |depth| rounds >= depth) {
                break;
            }
            let query = FindQuery {
                date: date.map(str::to_string),
                oids: Some(fringe),
                ..FindQuery::default()
            };
            let set = self.engine.find(collection, &query)?;

            let mut next = BTreeSet::new();
            for record in set.records() {
                for oid in references(record.field(field), field)? {
                    if !visited.contains(&oid) {
                        next.insert(oid);
                    }
                }
            }
            visited.extend(next.iter().cloned());
            fringe = next.into_iter().collect();
            rounds += 1;
        }

        let size = visited.len().to_string();
        let depth = rounds.to_string();
        log_event(
            Event::ClosureResolved,
            &[("collection", collection), ("field", field), ("oids", size.as_str()), ("rounds", depth.as_str())],
        );
        Ok(visited.into_iter().collect())
    }
}

/// Oids referenced by one field value; null or missing references nothing.
fn references(value: Option<&Value>, field: &str) -> TimelineResult<Vec<Oid>> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::List(items)) => items
            .iter()
            .filter(|v| !v.is_null())
            .map(|v| reference(v, field))
            .collect(),
        Some(single) => Ok(vec![reference(single, field)?]),
    }
}

fn reference(value: &Value, field: &str) -> TimelineResult<Oid> {
    Oid::from_value(value).map_err(|_| {
        TimelineError::validation(format!(
            "{} must reference oids, got {}",
            field,
            value.type_name()
        ))
    })
}
