//! # Persistence Port
//!
//! The narrow storage contract the ingest and query engines depend on.
//! Backends own the physical layout; the engines only ever speak through
//! this trait.

use super::errors::BackendResult;
use crate::model::{Oid, Timestamp, VersionRecord};

/// Closes the currently-open version of one object.
#[derive(Debug, Clone, PartialEq)]
pub struct CloseVersion {
    pub oid: Oid,
    pub end: Timestamp,
}

/// All writes produced by one ingest call.
///
/// Inserted records already carry their final `end`; `closes` only ever
/// targets versions that were open before the call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    pub closes: Vec<CloseVersion>,
    pub inserts: Vec<VersionRecord>,
}

impl WriteBatch {
    /// Returns true if the batch carries no writes.
    pub fn is_empty(&self) -> bool {
        self.closes.is_empty() && self.inserts.is_empty()
    }
}

/// Row selection for range scans.
///
/// All set conditions must hold:
/// - `oids`: record oid is listed
/// - `open_only`: record has no end
/// - `started_by`: `start <= t`
/// - `alive_after`: end is open or `end > t`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanFilter {
    pub oids: Option<Vec<Oid>>,
    pub open_only: bool,
    pub started_by: Option<Timestamp>,
    pub alive_after: Option<Timestamp>,
}

impl ScanFilter {
    /// Selects every row.
    pub fn all() -> Self {
        Self::default()
    }

    /// Selects current versions only.
    pub fn current() -> Self {
        Self {
            open_only: true,
            ..Self::default()
        }
    }

    /// Restricts the scan to the given oids.
    pub fn with_oids(mut self, oids: Vec<Oid>) -> Self {
        self.oids = Some(oids);
        self
    }

    /// Evaluates the filter against one record.
    pub fn matches(&self, record: &VersionRecord) -> bool {
        if let Some(oids) = &self.oids {
            if !oids.contains(record.oid()) {
                return false;
            }
        }
        if self.open_only && !record.is_open() {
            return false;
        }
        if let Some(t) = self.started_by {
            if record.start() > t {
                return false;
            }
        }
        if let Some(t) = self.alive_after {
            if record.end().map_or(false, |end| end <= t) {
                return false;
            }
        }
        true
    }
}

/// Storage contract for version collections.
pub trait PersistencePort: Send + Sync + std::fmt::Debug {
    /// Creates an empty collection.
    fn create_collection(&self, collection: &str) -> BackendResult<()>;

    /// Drops a collection with all rows and its high-water mark.
    fn drop_collection(&self, collection: &str) -> BackendResult<()>;

    /// Check if a collection exists
    fn collection_exists(&self, collection: &str) -> BackendResult<bool>;

    /// Lists collection names, sorted.
    fn list_collections(&self) -> BackendResult<Vec<String>>;

    /// Records whose hash is in `hashes`.
    fn find_by_hash(&self, collection: &str, hashes: &[String])
        -> BackendResult<Vec<VersionRecord>>;

    /// Records whose oid is in `oids`, optionally only open ones.
    fn find_by_oid(
        &self,
        collection: &str,
        oids: &[Oid],
        open_only: bool,
    ) -> BackendResult<Vec<VersionRecord>>;

    /// Range/predicate fetch used by the query path.
    fn scan(&self, collection: &str, filter: &ScanFilter) -> BackendResult<Vec<VersionRecord>>;

    /// Inserts new records.
    fn insert_many(&self, collection: &str, records: &[VersionRecord]) -> BackendResult<()>;

    /// Sets `end` on the open version of `oid`.
    fn close_open_version(&self, collection: &str, oid: &Oid, end: Timestamp)
        -> BackendResult<()>;

    /// Latest committed ingest moment, `None` before the first ingest.
    fn high_water_mark(&self, collection: &str) -> BackendResult<Option<Timestamp>>;

    /// Records a committed ingest moment.
    fn advance_high_water_mark(&self, collection: &str, mtime: Timestamp) -> BackendResult<()>;

    /// Deletes every version of the listed oids and returns the removed rows.
    fn remove_by_oid(&self, collection: &str, oids: &[Oid]) -> BackendResult<Vec<VersionRecord>>;

    /// Number of stored rows.
    fn count(&self, collection: &str) -> BackendResult<usize>;

    /// Applies a write batch, then advances the high-water mark to `mtime`.
    ///
    /// Inserts are sent in chunks of at most `batch_size` rows. The first
    /// failing step aborts the rest, so the mark is never advanced past a
    /// partial write. This default is not atomic across steps; backends with
    /// transactions should override it.
    fn commit(
        &self,
        collection: &str,
        batch: &WriteBatch,
        mtime: Timestamp,
        batch_size: usize,
    ) -> BackendResult<()> {
        for close in &batch.closes {
            self.close_open_version(collection, &close.oid, close.end)?;
        }
        for chunk in batch.inserts.chunks(batch_size.max(1)) {
            self.insert_many(collection, chunk)?;
        }
        self.advance_high_water_mark(collection, mtime)
    }
}
