//! Read path
//!
//! Fetches rows through the persistence port and hands them to `VersionSet`
//! for temporal derivations. Reads never mutate storage.

use std::sync::Arc;

use super::axis::Scale;
use super::filters::{Predicate, PredicateFilter};
use super::range::DateRange;
use super::set::{HistoryPoint, VersionSet};
use crate::config::TimelineConfig;
use crate::errors::TimelineResult;
use crate::model::{Oid, Value, VersionRecord};
use crate::observability::{log_event, Event, MetricsRegistry};
use crate::port::PersistencePort;

/// Selection for `find` and `count`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindQuery {
    /// Date-range token; `None` selects current versions
    pub date: Option<String>,
    /// Restrict to these objects
    pub oids: Option<Vec<Oid>>,
    /// User-field predicates, AND-ed
    pub predicates: Vec<Predicate>,
    /// Field to rank by and whether to rank descending; applied before `limit`
    pub sort: Option<(String, bool)>,
    /// Keep at most this many rows
    pub limit: Option<usize>,
    /// Keep only these user fields
    pub fields: Option<Vec<String>>,
}

impl FindQuery {
    /// Current versions of every object.
    pub fn current() -> Self {
        Self::default()
    }

    /// Versions selected by a date-range token.
    pub fn at(date: impl Into<String>) -> Self {
        Self {
            date: Some(date.into()),
            ..Self::default()
        }
    }

    pub fn with_oids(mut self, oids: Vec<Oid>) -> Self {
        self.oids = Some(oids);
        self
    }

    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn with_sort(mut self, field: impl Into<String>, descending: bool) -> Self {
        self.sort = Some((field.into(), descending));
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.fields = Some(fields);
        self
    }
}

/// Query engine over one persistence port.
pub struct QueryEngine {
    port: Arc<dyn PersistencePort>,
    config: TimelineConfig,
    metrics: Arc<MetricsRegistry>,
}

impl QueryEngine {
    pub fn new(
        port: Arc<dyn PersistencePort>,
        config: TimelineConfig,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            port,
            config,
            metrics,
        }
    }

    /// Fetches the versions selected by `query`.
    ///
    /// # Errors
    ///
    /// `TL_FORMAT_INVALID` for a bad date token, `TL_NOT_FOUND` for an
    /// unknown collection, `TL_BACKEND_FAILED` if the port fails.
    pub fn find(&self, collection: &str, query: &FindQuery) -> TimelineResult<VersionSet> {
        let result = self.fetch(collection, query);
        match &result {
            Ok(set) => {
                self.metrics.increment_queries_executed();
                let rows = set.len().to_string();
                let range = set.range().to_string();
                log_event(
                    Event::QueryExecuted,
                    &[("collection", collection), ("date", range.as_str()), ("rows", rows.as_str())],
                );
            }
            Err(err) => {
                self.metrics.increment_queries_rejected();
                log_event(
                    Event::QueryRejected,
                    &[("collection", collection), ("code", err.code().code()), ("reason", err.message())],
                );
            }
        }
        result
    }

    fn fetch(&self, collection: &str, query: &FindQuery) -> TimelineResult<VersionSet> {
        let range = DateRange::parse(query.date.as_deref())?;
        let mut filter = range.scan_filter();
        filter.oids = query.oids.clone();

        let mut records = self.port.scan(collection, &filter)?;
        if !query.predicates.is_empty() {
            records.retain(|r| PredicateFilter::matches(r, &query.predicates));
        }

        // Sort and limit pick which rows survive; the set itself stays start-ordered
        if let Some((field, descending)) = &query.sort {
            records.sort_by(|a, b| {
                let ord = rank_value(a, field).total_cmp(&rank_value(b, field));
                if *descending {
                    ord.reverse()
                } else {
                    ord
                }
            });
        }
        if let Some(limit) = query.limit {
            records.truncate(limit);
        }
        if let Some(fields) = &query.fields {
            records = records.iter().map(|r| r.project(fields)).collect();
        }
        Ok(VersionSet::new(records, range))
    }

    /// Number of versions selected by `query`.
    pub fn count(&self, collection: &str, query: &FindQuery) -> TimelineResult<usize> {
        self.find(collection, query).map(|set| set.len())
    }

    /// Sorted distinct values of `field`; list values are flattened.
    ///
    /// `date` defaults to all time.
    pub fn distinct(
        &self,
        collection: &str,
        field: &str,
        date: Option<&str>,
    ) -> TimelineResult<Vec<Value>> {
        let query = FindQuery::at(date.unwrap_or("~"));
        let set = self.find(collection, &query)?;

        let mut values: Vec<Value> = Vec::new();
        for value in set.records().iter().filter_map(|r| r.value_of(field)) {
            match value {
                Value::List(items) => values.extend(items),
                other => values.push(other),
            }
        }
        values.retain(|v| !v.is_null());
        values.sort_by(|a, b| a.total_cmp(b));
        values.dedup();
        Ok(values)
    }

    /// Largest value `field` has ever held, across all history.
    pub fn last_field(&self, collection: &str, field: &str) -> TimelineResult<Option<Value>> {
        let set = self.find(collection, &FindQuery::at("~"))?;
        Ok(set
            .records()
            .iter()
            .filter_map(|r| r.value_of(field))
            .filter(|v| !v.is_null())
            .max_by(|a, b| a.total_cmp(b)))
    }

    /// Fetches `query`, samples it at `scale` and returns the history series.
    ///
    /// `auto` targets the configured sample density.
    pub fn history(
        &self,
        collection: &str,
        query: &FindQuery,
        scale: Scale,
        counts: bool,
    ) -> TimelineResult<Vec<HistoryPoint>> {
        let set = self.find(collection, query)?;
        let dates = set.dates_range(scale, None, None, self.config.target_density);
        set.history(&dates, counts)
    }
}

fn rank_value(record: &VersionRecord, field: &str) -> Value {
    record.value_of(field).unwrap_or(Value::Null)
}
