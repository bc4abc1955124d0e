//! Ingest engine
//!
//! Turns a batch of raw object states into committed version records:
//!
//! 1. reject the batch if `mtime` does not advance the high-water mark
//! 2. normalize every state
//! 3. look up stored hashes and stored history, `batch_size` keys at a time
//! 4. plan the write set (dedup, snapshot split, backfill)
//! 5. commit the whole write set and advance the mark in one port call
//!
//! Any failure before step 5 leaves storage untouched. A commit failure is
//! reported as a backend error and the mark is not advanced.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use super::plan::{plan_batch, IngestPlan};
use crate::config::TimelineConfig;
use crate::errors::{TimelineError, TimelineResult};
use crate::identity::{NormalizedState, Normalizer};
use crate::model::{FieldMap, Oid, Timestamp, VersionRecord};
use crate::observability::{log_event, Event, MetricsRegistry, ObservationScope};
use crate::port::PersistencePort;

/// Write path for version collections.
pub struct IngestEngine {
    port: Arc<dyn PersistencePort>,
    config: TimelineConfig,
    normalizer: Normalizer,
    metrics: Arc<MetricsRegistry>,
}

impl IngestEngine {
    /// Creates an engine over `port`.
    ///
    /// # Errors
    ///
    /// Returns `TL_VALIDATION_FAILED` if the configuration is unusable.
    pub fn new(
        port: Arc<dyn PersistencePort>,
        config: TimelineConfig,
        metrics: Arc<MetricsRegistry>,
    ) -> TimelineResult<Self> {
        config.validate()?;
        let normalizer = Normalizer::new(&config)?;
        Ok(Self {
            port,
            config,
            normalizer,
            metrics,
        })
    }

    /// Ingests `states` observed at `mtime` and returns the sorted oids that
    /// received at least one new row.
    pub fn ingest(
        &self,
        collection: &str,
        states: Vec<FieldMap>,
        mtime: Timestamp,
    ) -> TimelineResult<Vec<Oid>> {
        let received = states.len().to_string();
        let mut scope = ObservationScope::with_fields(
            "INGEST",
            &[("collection", collection), ("states", received.as_str())],
        );

        match self.run(collection, states, mtime) {
            Ok(plan) => {
                let written = plan.written.len().to_string();
                let inserted = plan.batch.inserts.len().to_string();
                scope.complete(&[("written", written.as_str()), ("inserted", inserted.as_str())]);
                Ok(plan.written)
            }
            Err(err) => {
                self.metrics.increment_batches_rejected();
                let fields = [
                    ("collection", collection),
                    ("code", err.code().code()),
                    ("reason", err.message()),
                ];
                if err.is_retryable() {
                    log_event(Event::IngestAborted, &fields);
                    scope.fail(err.message());
                } else {
                    // caller mistakes stay at WARN
                    log_event(Event::IngestRejected, &fields);
                    scope.dismiss();
                }
                Err(err)
            }
        }
    }

    fn run(
        &self,
        collection: &str,
        states: Vec<FieldMap>,
        mtime: Timestamp,
    ) -> TimelineResult<IngestPlan> {
        if let Some(current) = self.port.high_water_mark(collection)? {
            if mtime <= current {
                return Err(TimelineError::ordering(current, mtime));
            }
        }

        let normalized = states
            .into_iter()
            .map(|raw| self.normalizer.normalize(raw, mtime))
            .collect::<TimelineResult<Vec<NormalizedState>>>()?;

        let known_hashes = self.stored_hashes(collection, &normalized)?;
        let history = self.stored_history(collection, &normalized)?;
        let plan = plan_batch(normalized, &known_hashes, history, self.config.version)?;

        self.port
            .commit(collection, &plan.batch, mtime, self.config.batch_size)?;

        self.record(collection, &plan);
        Ok(plan)
    }

    fn stored_hashes(
        &self,
        collection: &str,
        states: &[NormalizedState],
    ) -> TimelineResult<HashSet<String>> {
        let hashes: Vec<String> = states
            .iter()
            .map(|s| s.hash.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut known = HashSet::new();
        for chunk in hashes.chunks(self.config.batch_size) {
            for record in self.port.find_by_hash(collection, chunk)? {
                known.insert(record.hash().to_string());
            }
        }
        Ok(known)
    }

    fn stored_history(
        &self,
        collection: &str,
        states: &[NormalizedState],
    ) -> TimelineResult<Vec<VersionRecord>> {
        let oids: Vec<Oid> = states
            .iter()
            .map(|s| s.oid.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut history = Vec::new();
        for chunk in oids.chunks(self.config.batch_size) {
            history.extend(self.port.find_by_oid(collection, chunk, false)?);
        }
        Ok(history)
    }

    fn record(&self, collection: &str, plan: &IngestPlan) {
        self.metrics.increment_batches_committed();
        self.metrics
            .add_versions_inserted(plan.batch.inserts.len() as u64);
        self.metrics
            .add_versions_closed(plan.batch.closes.len() as u64);
        self.metrics.add_duplicates_skipped(plan.duplicates as u64);

        if plan.duplicates > 0 {
            let skipped = plan.duplicates.to_string();
            log_event(
                Event::DuplicatesSkipped,
                &[("collection", collection), ("count", skipped.as_str())],
            );
        }
        if plan.splits > 0 {
            let splits = plan.splits.to_string();
            log_event(
                Event::SnapshotSplit,
                &[("collection", collection), ("count", splits.as_str())],
            );
        }
        let written = plan.written.len().to_string();
        log_event(
            Event::IngestCommitted,
            &[("collection", collection), ("written", written.as_str())],
        );
    }
}
