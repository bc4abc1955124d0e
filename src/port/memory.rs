//! # In-Memory Backend
//!
//! Reference `PersistencePort` implementation. Every write is checked in
//! full against the collection indexes before anything is applied, so a
//! failed batch leaves no trace.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::backend::{CloseVersion, PersistencePort, ScanFilter, WriteBatch};
use super::errors::{BackendError, BackendResult};
use crate::model::{Oid, Timestamp, VersionRecord};

#[derive(Debug, Default)]
struct CollectionState {
    records: Vec<VersionRecord>,
    /// Every stored record id
    ids: HashSet<String>,
    /// Position in `records` of each object's open version
    open: HashMap<Oid, usize>,
    high_water_mark: Option<Timestamp>,
}

impl CollectionState {
    /// Checks closes and inserts together, as if the closes ran first.
    fn check(&self, closes: &[CloseVersion], inserts: &[VersionRecord]) -> BackendResult<()> {
        let mut closed = HashSet::with_capacity(closes.len());
        for close in closes {
            let index = *self.open.get(&close.oid).ok_or_else(|| {
                BackendError::VersionNotFound(format!("open version of {}", close.oid))
            })?;
            let start = self.records[index].start();
            if close.end <= start || !closed.insert(&close.oid) {
                return Err(BackendError::Conflict(format!(
                    "cannot end open version of {} at {}",
                    close.oid, close.end
                )));
            }
        }

        let mut new_ids = HashSet::with_capacity(inserts.len());
        let mut new_open = HashSet::new();
        for record in inserts {
            if self.ids.contains(record.id()) || !new_ids.insert(record.id()) {
                return Err(BackendError::Conflict(format!(
                    "duplicate record id {}",
                    record.id()
                )));
            }
            if !record.is_open() {
                continue;
            }
            let still_open = self.open.contains_key(record.oid()) && !closed.contains(record.oid());
            if still_open || !new_open.insert(record.oid()) {
                return Err(BackendError::Conflict(format!(
                    "object {} already has an open version",
                    record.oid()
                )));
            }
        }
        Ok(())
    }

    fn close_open(&mut self, oid: &Oid, end: Timestamp) -> BackendResult<()> {
        let index = *self
            .open
            .get(oid)
            .ok_or_else(|| BackendError::VersionNotFound(format!("open version of {}", oid)))?;
        self.records[index]
            .close(end)
            .map_err(|e| BackendError::Conflict(e.message().to_string()))?;
        self.open.remove(oid);
        Ok(())
    }

    fn push(&mut self, record: &VersionRecord) {
        if record.is_open() {
            self.open.insert(record.oid().clone(), self.records.len());
        }
        self.ids.insert(record.id().to_string());
        self.records.push(record.clone());
    }

    fn reindex(&mut self) {
        self.ids = self.records.iter().map(|r| r.id().to_string()).collect();
        self.open = self
            .records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_open())
            .map(|(index, r)| (r.oid().clone(), index))
            .collect();
    }
}

/// Thread-safe in-memory store
#[derive(Debug, Default)]
pub struct InMemoryStore {
    collections: RwLock<BTreeMap<String, CollectionState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> BackendResult<RwLockReadGuard<'_, BTreeMap<String, CollectionState>>> {
        self.collections
            .read()
            .map_err(|_| BackendError::LockPoisoned("collections".to_string()))
    }

    fn write(&self) -> BackendResult<RwLockWriteGuard<'_, BTreeMap<String, CollectionState>>> {
        self.collections
            .write()
            .map_err(|_| BackendError::LockPoisoned("collections".to_string()))
    }

    fn select<F>(&self, collection: &str, keep: F) -> BackendResult<Vec<VersionRecord>>
    where
        F: Fn(&VersionRecord) -> bool,
    {
        let collections = self.read()?;
        let state = lookup(&collections, collection)?;
        Ok(state.records.iter().filter(|r| keep(r)).cloned().collect())
    }

    fn update<F, T>(&self, collection: &str, apply: F) -> BackendResult<T>
    where
        F: FnOnce(&mut CollectionState) -> BackendResult<T>,
    {
        let mut collections = self.write()?;
        let state = collections
            .get_mut(collection)
            .ok_or_else(|| BackendError::CollectionNotFound(collection.to_string()))?;
        apply(state)
    }
}

fn lookup<'a>(
    collections: &'a BTreeMap<String, CollectionState>,
    collection: &str,
) -> BackendResult<&'a CollectionState> {
    collections
        .get(collection)
        .ok_or_else(|| BackendError::CollectionNotFound(collection.to_string()))
}

impl PersistencePort for InMemoryStore {
    fn create_collection(&self, collection: &str) -> BackendResult<()> {
        let mut collections = self.write()?;
        if collections.contains_key(collection) {
            return Err(BackendError::CollectionExists(collection.to_string()));
        }
        collections.insert(collection.to_string(), CollectionState::default());
        Ok(())
    }

    fn drop_collection(&self, collection: &str) -> BackendResult<()> {
        let mut collections = self.write()?;
        collections
            .remove(collection)
            .map(|_| ())
            .ok_or_else(|| BackendError::CollectionNotFound(collection.to_string()))
    }

    fn collection_exists(&self, collection: &str) -> BackendResult<bool> {
        Ok(self.read()?.contains_key(collection))
    }

    fn list_collections(&self) -> BackendResult<Vec<String>> {
        Ok(self.read()?.keys().cloned().collect())
    }

    fn find_by_hash(
        &self,
        collection: &str,
        hashes: &[String],
    ) -> BackendResult<Vec<VersionRecord>> {
        self.select(collection, |r| hashes.iter().any(|h| h == r.hash()))
    }

    fn find_by_oid(
        &self,
        collection: &str,
        oids: &[Oid],
        open_only: bool,
    ) -> BackendResult<Vec<VersionRecord>> {
        self.select(collection, |r| {
            (!open_only || r.is_open()) && oids.contains(r.oid())
        })
    }

    fn scan(&self, collection: &str, filter: &ScanFilter) -> BackendResult<Vec<VersionRecord>> {
        self.select(collection, |r| filter.matches(r))
    }

    fn insert_many(&self, collection: &str, records: &[VersionRecord]) -> BackendResult<()> {
        self.update(collection, |state| {
            state.check(&[], records)?;
            records.iter().for_each(|r| state.push(r));
            Ok(())
        })
    }

    fn close_open_version(
        &self,
        collection: &str,
        oid: &Oid,
        end: Timestamp,
    ) -> BackendResult<()> {
        self.update(collection, |state| state.close_open(oid, end))
    }

    fn high_water_mark(&self, collection: &str) -> BackendResult<Option<Timestamp>> {
        let collections = self.read()?;
        Ok(lookup(&collections, collection)?.high_water_mark)
    }

    fn advance_high_water_mark(&self, collection: &str, mtime: Timestamp) -> BackendResult<()> {
        self.update(collection, |state| {
            if let Some(current) = state.high_water_mark {
                if mtime <= current {
                    return Err(BackendError::Conflict(format!(
                        "high-water mark {} cannot move back to {}",
                        current, mtime
                    )));
                }
            }
            state.high_water_mark = Some(mtime);
            Ok(())
        })
    }

    fn remove_by_oid(&self, collection: &str, oids: &[Oid]) -> BackendResult<Vec<VersionRecord>> {
        self.update(collection, |state| {
            let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut state.records)
                .into_iter()
                .partition(|r| oids.contains(r.oid()));
            state.records = kept;
            state.reindex();
            Ok(removed)
        })
    }

    fn count(&self, collection: &str) -> BackendResult<usize> {
        let collections = self.read()?;
        Ok(lookup(&collections, collection)?.records.len())
    }

    /// Atomic: the whole batch and the new mark become visible together.
    ///
    /// The batch is applied in one step, so `batch_size` does not apply.
    fn commit(
        &self,
        collection: &str,
        batch: &WriteBatch,
        mtime: Timestamp,
        _batch_size: usize,
    ) -> BackendResult<()> {
        self.update(collection, |state| {
            if let Some(current) = state.high_water_mark {
                if mtime <= current {
                    return Err(BackendError::Conflict(format!(
                        "high-water mark {} cannot move back to {}",
                        current, mtime
                    )));
                }
            }
            state.check(&batch.closes, &batch.inserts)?;
            for close in &batch.closes {
                state.close_open(&close.oid, close.end)?;
            }
            batch.inserts.iter().for_each(|r| state.push(r));
            state.high_water_mark = Some(mtime);
            Ok(())
        })
    }
}
