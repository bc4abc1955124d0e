//! Timeline facade
//!
//! Single entry point over one persistence port: the collection registry,
//! the ingest write path, the query read path and maintenance operations.
//!
//! Writes to one collection are serialized through a per-collection writer
//! lock, so the close-then-insert split of one batch is never interleaved
//! with another batch for the same collection. Reads take no lock.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::closure::ClosureResolver;
use crate::config::TimelineConfig;
use crate::errors::{TimelineError, TimelineResult};
use crate::ingest::IngestEngine;
use crate::model::{FieldMap, Oid, Timestamp, Value, VersionRecord};
use crate::observability::{log_event, Event, MetricsRegistry, MetricsSnapshot};
use crate::port::{PersistencePort, ScanFilter};
use crate::query::{FindQuery, HistoryPoint, QueryEngine, Scale, VersionSet};

/// Summary of one collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionStats {
    pub name: String,
    /// High-water mark; `None` before the first ingest
    pub mtime: Option<Timestamp>,
    /// Stored rows
    pub size: usize,
    /// Distinct objects
    pub objects: usize,
}

/// Bitemporal version store over a persistence port.
pub struct Timeline {
    port: Arc<dyn PersistencePort>,
    ingest: IngestEngine,
    query: QueryEngine,
    metrics: Arc<MetricsRegistry>,
    writers: Mutex<BTreeMap<String, Arc<Mutex<()>>>>,
}

impl Timeline {
    /// Creates a timeline over `port`.
    ///
    /// # Errors
    ///
    /// `TL_VALIDATION_FAILED` if `config` is unusable.
    pub fn new(port: Arc<dyn PersistencePort>, config: TimelineConfig) -> TimelineResult<Self> {
        let metrics = Arc::new(MetricsRegistry::new());
        let ingest = IngestEngine::new(port.clone(), config.clone(), metrics.clone())?;
        let query = QueryEngine::new(port.clone(), config, metrics.clone());
        Ok(Self {
            port,
            ingest,
            query,
            metrics,
            writers: Mutex::new(BTreeMap::new()),
        })
    }

    // Registry

    /// Registers an empty collection.
    ///
    /// # Errors
    ///
    /// `TL_VALIDATION_FAILED` if the collection already exists.
    pub fn register_collection(&self, collection: &str) -> TimelineResult<()> {
        if collection.trim().is_empty() {
            return Err(TimelineError::validation("collection name must not be empty"));
        }
        if self.port.collection_exists(collection)? {
            return Err(TimelineError::validation(format!(
                "collection {} already exists",
                collection
            )));
        }
        self.port.create_collection(collection)?;
        log_event(Event::CollectionRegistered, &[("collection", collection)]);
        Ok(())
    }

    /// Drops a collection with all of its history and its high-water mark.
    ///
    /// # Errors
    ///
    /// `TL_NOT_FOUND` if the collection does not exist.
    pub fn drop_collection(&self, collection: &str) -> TimelineResult<()> {
        let writer = self.existing_writer(collection)?;
        let _guard = lock_writer(&writer, collection)?;

        self.port.drop_collection(collection)?;
        self.forget_writer(collection)?;
        log_event(Event::CollectionDropped, &[("collection", collection)]);
        Ok(())
    }

    /// Registered collection names, sorted, optionally narrowed to a prefix.
    pub fn collections(&self, prefix: Option<&str>) -> TimelineResult<Vec<String>> {
        let mut names = self.port.list_collections()?;
        if let Some(prefix) = prefix {
            names.retain(|name| name.starts_with(prefix));
        }
        names.sort();
        Ok(names)
    }

    // Write path

    /// Ingests one batch of object states observed at `mtime`.
    ///
    /// Returns the sorted oids that received at least one new row.
    pub fn ingest(
        &self,
        collection: &str,
        states: Vec<FieldMap>,
        mtime: Timestamp,
    ) -> TimelineResult<Vec<Oid>> {
        let writer = self.existing_writer(collection)?;
        let _guard = lock_writer(&writer, collection)?;
        self.ingest.ingest(collection, states, mtime)
    }

    /// Deletes every version of `oids`.
    ///
    /// With `backup` set the removed rows are handed back to the caller.
    /// An empty oid list is a no-op.
    pub fn remove_objects(
        &self,
        collection: &str,
        oids: &[Oid],
        backup: bool,
    ) -> TimelineResult<Option<Vec<VersionRecord>>> {
        if oids.is_empty() {
            return Ok(if backup { Some(Vec::new()) } else { None });
        }

        let writer = self.existing_writer(collection)?;
        let _guard = lock_writer(&writer, collection)?;

        let removed = self.port.remove_by_oid(collection, oids)?;
        self.metrics.add_objects_removed(oids.len() as u64);

        let objects = oids.len().to_string();
        let rows = removed.len().to_string();
        log_event(
            Event::ObjectsRemoved,
            &[("collection", collection), ("objects", objects.as_str()), ("rows", rows.as_str())],
        );
        Ok(backup.then_some(removed))
    }

    // Read path

    pub fn find(&self, collection: &str, query: &FindQuery) -> TimelineResult<VersionSet> {
        self.query.find(collection, query)
    }

    pub fn count(&self, collection: &str, query: &FindQuery) -> TimelineResult<usize> {
        self.query.count(collection, query)
    }

    pub fn distinct(
        &self,
        collection: &str,
        field: &str,
        date: Option<&str>,
    ) -> TimelineResult<Vec<Value>> {
        self.query.distinct(collection, field, date)
    }

    pub fn last_field(&self, collection: &str, field: &str) -> TimelineResult<Option<Value>> {
        self.query.last_field(collection, field)
    }

    pub fn history(
        &self,
        collection: &str,
        query: &FindQuery,
        scale: Scale,
        counts: bool,
    ) -> TimelineResult<Vec<HistoryPoint>> {
        self.query.history(collection, query, scale, counts)
    }

    /// Dependency closure of `oids` over the reference `field` at `date`.
    pub fn deptree(
        &self,
        collection: &str,
        oids: &[Oid],
        field: &str,
        date: Option<&str>,
        max_depth: Option<usize>,
    ) -> TimelineResult<Vec<Oid>> {
        ClosureResolver::new(&self.query).closure(collection, oids, field, date, max_depth)
    }

    /// Row count, object count and high-water mark of `collection`.
    pub fn stats(&self, collection: &str) -> TimelineResult<CollectionStats> {
        let mtime = self.port.high_water_mark(collection)?;
        let rows = self.port.scan(collection, &ScanFilter::all())?;
        let objects = rows.iter().map(VersionRecord::oid).collect::<BTreeSet<_>>().len();
        Ok(CollectionStats {
            name: collection.to_string(),
            mtime,
            size: rows.len(),
            objects,
        })
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Writer lock of a registered collection.
    ///
    /// Unknown names fail before a registry entry is created.
    fn existing_writer(&self, collection: &str) -> TimelineResult<Arc<Mutex<()>>> {
        let mut writers = self
            .writers
            .lock()
            .map_err(|_| TimelineError::backend("writer registry lock poisoned"))?;
        if !self.port.collection_exists(collection)? {
            return Err(TimelineError::not_found(format!("collection {}", collection)));
        }
        Ok(writers.entry(collection.to_string()).or_default().clone())
    }

    fn forget_writer(&self, collection: &str) -> TimelineResult<()> {
        let mut writers = self
            .writers
            .lock()
            .map_err(|_| TimelineError::backend("writer registry lock poisoned"))?;
        writers.remove(collection);
        Ok(())
    }
}

fn lock_writer<'a>(
    writer: &'a Mutex<()>,
    collection: &str,
) -> TimelineResult<std::sync::MutexGuard<'a, ()>> {
    writer
        .lock()
        .map_err(|_| TimelineError::backend(format!("writer lock for {} poisoned", collection)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::TimelineErrorCode;
    use crate::port::InMemoryStore;
    use chrono::{TimeZone, Utc};

    fn ts(seconds: i64) -> Timestamp {
        Utc.timestamp_opt(seconds, 0).unwrap()
    }

    fn obj(oid: i64, x: i64) -> FieldMap {
        let mut map = FieldMap::new();
        map.insert("_oid".into(), Value::Int(oid));
        map.insert("x".into(), Value::Int(x));
        map
    }

    fn timeline() -> Timeline {
        let timeline =
            Timeline::new(Arc::new(InMemoryStore::new()), TimelineConfig::default()).unwrap();
        timeline.register_collection("cube").unwrap();
        timeline
    }

    #[test]
    fn test_register_twice_rejected() {
        let timeline = timeline();
        let err = timeline.register_collection("cube").unwrap_err();
        assert_eq!(err.code(), TimelineErrorCode::ValidationFailed);
        assert_eq!(timeline.collections(None).unwrap(), vec!["cube".to_string()]);
    }

    #[test]
    fn test_drop_unknown_not_found() {
        let err = timeline().drop_collection("missing").unwrap_err();
        assert_eq!(err.code(), TimelineErrorCode::NotFound);
    }

    #[test]
    fn test_unknown_collection_leaves_no_writer() {
        let timeline = timeline();
        timeline.ingest("cube", vec![obj(1, 1)], ts(10)).unwrap();

        let err = timeline.ingest("missing", vec![obj(1, 1)], ts(10)).unwrap_err();
        assert_eq!(err.code(), TimelineErrorCode::NotFound);
        let err = timeline
            .remove_objects("missing", &[Oid::Int(1)], false)
            .unwrap_err();
        assert_eq!(err.code(), TimelineErrorCode::NotFound);
        assert!(timeline.drop_collection("missing").is_err());

        let writers = timeline.writers.lock().unwrap();
        assert_eq!(writers.keys().collect::<Vec<_>>(), vec!["cube"]);
    }

    #[test]
    fn test_stats_after_ingest() {
        let timeline = timeline();
        timeline.ingest("cube", vec![obj(1, 1), obj(2, 1)], ts(10)).unwrap();
        timeline.ingest("cube", vec![obj(1, 2)], ts(20)).unwrap();

        let stats = timeline.stats("cube").unwrap();
        assert_eq!(
            stats,
            CollectionStats {
                name: "cube".into(),
                mtime: Some(ts(20)),
                size: 3,
                objects: 2,
            }
        );
    }

    #[test]
    fn test_remove_objects_with_backup() {
        let timeline = timeline();
        timeline.ingest("cube", vec![obj(1, 1), obj(2, 1)], ts(10)).unwrap();
        timeline.ingest("cube", vec![obj(1, 2)], ts(20)).unwrap();

        let removed = timeline
            .remove_objects("cube", &[Oid::Int(1)], true)
            .unwrap()
            .unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(timeline.count("cube", &FindQuery::at("~")).unwrap(), 1);
        assert_eq!(timeline.metrics().objects_removed, 1);
    }

    #[test]
    fn test_remove_nothing_is_noop() {
        let timeline = timeline();
        timeline.ingest("cube", vec![obj(1, 1)], ts(10)).unwrap();
        assert_eq!(timeline.remove_objects("cube", &[], false).unwrap(), None);
        assert_eq!(timeline.count("cube", &FindQuery::current()).unwrap(), 1);
    }

    #[test]
    fn test_drop_then_reregister_starts_fresh() {
        let timeline = timeline();
        timeline.ingest("cube", vec![obj(1, 1)], ts(10)).unwrap();
        timeline.drop_collection("cube").unwrap();
        timeline.register_collection("cube").unwrap();

        // mark was dropped with the collection
        timeline.ingest("cube", vec![obj(1, 1)], ts(5)).unwrap();
        assert_eq!(timeline.stats("cube").unwrap().mtime, Some(ts(5)));
    }
}
