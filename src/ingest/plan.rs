//! Write-set classification
//!
//! Pure: given normalized states plus what the store already holds, decide
//! what to write. Nothing here talks to the backend.
//!
//! Per state, after dropping exact-content duplicates:
//! - live state (no `end`): closes the object's open version at the new
//!   `start` (the snapshot split), then becomes the new open version
//! - backfill state (explicit `end`): inserted as a bounded row; rejected if
//!   the object has an open version
//! - any state whose interval would overlap existing history is rejected

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::errors::{TimelineError, TimelineResult};
use crate::identity::NormalizedState;
use crate::model::{new_record_id, Oid, Timestamp, VersionRecord};
use crate::port::{CloseVersion, WriteBatch};

/// Outcome of classifying one batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestPlan {
    /// Writes to commit
    pub batch: WriteBatch,
    /// Objects with at least one new row, sorted
    pub written: Vec<Oid>,
    /// States skipped because their content is already stored or repeated
    pub duplicates: usize,
    /// Open versions closed by newer content (stored or pending)
    pub splits: usize,
}

/// Per-object working state while the batch is planned.
struct ObjectTimeline {
    /// Stored rows for the object, with planned closes applied
    stored: Vec<VersionRecord>,
    /// Rows planned for insertion
    pending: Vec<VersionRecord>,
    /// Close planned for the stored open version
    close: Option<CloseVersion>,
}

impl ObjectTimeline {
    fn new(stored: Vec<VersionRecord>) -> Self {
        Self {
            stored,
            pending: Vec::new(),
            close: None,
        }
    }

    fn has_open(&self) -> bool {
        self.stored.iter().chain(self.pending.iter()).any(VersionRecord::is_open)
    }

    /// Closes the current open version, pending or stored, at `at`.
    fn close_open(&mut self, oid: &Oid, at: Timestamp) -> TimelineResult<()> {
        if let Some(open) = self.pending.iter_mut().find(|r| r.is_open()) {
            return open.close(at);
        }
        if let Some(open) = self.stored.iter_mut().find(|r| r.is_open()) {
            open.close(at)?;
            self.close = Some(CloseVersion {
                oid: oid.clone(),
                end: at,
            });
        }
        Ok(())
    }

    fn check_no_overlap(&self, state: &NormalizedState) -> TimelineResult<()> {
        let clash = self
            .stored
            .iter()
            .chain(self.pending.iter())
            .find(|r| r.overlaps(state.start, state.end));
        match clash {
            Some(existing) => Err(TimelineError::validation(format!(
                "object {} state starting {} overlaps version {} [{}, {})",
                state.oid,
                state.start,
                existing.id(),
                existing.start(),
                existing
                    .end()
                    .map_or_else(|| "open".to_string(), |end| end.to_string())
            ))),
            None => Ok(()),
        }
    }

    fn open_start(&self) -> Option<Timestamp> {
        self.stored
            .iter()
            .chain(self.pending.iter())
            .find(|r| r.is_open())
            .map(VersionRecord::start)
    }
}

/// Classifies a batch of normalized states into a write batch.
///
/// `known_hashes` holds every stored hash matching the batch; `history`
/// holds every stored row of every oid in the batch.
pub fn plan_batch(
    states: Vec<NormalizedState>,
    known_hashes: &HashSet<String>,
    history: Vec<VersionRecord>,
    version: u32,
) -> TimelineResult<IngestPlan> {
    let mut plan = IngestPlan::default();

    // drop duplicates: stored content, then repeats within the batch
    let mut seen: HashSet<String> = HashSet::new();
    let mut by_oid: BTreeMap<Oid, Vec<NormalizedState>> = BTreeMap::new();
    for state in states {
        if known_hashes.contains(&state.hash) || !seen.insert(state.hash.clone()) {
            plan.duplicates += 1;
            continue;
        }
        by_oid.entry(state.oid.clone()).or_default().push(state);
    }

    let mut stored_by_oid: BTreeMap<Oid, Vec<VersionRecord>> = BTreeMap::new();
    for record in history {
        stored_by_oid
            .entry(record.oid().clone())
            .or_default()
            .push(record);
    }

    let mut written = BTreeSet::new();
    for (oid, mut group) in by_oid {
        // same-object states apply in start order
        group.sort_by_key(|s| s.start);
        let mut timeline = ObjectTimeline::new(stored_by_oid.remove(&oid).unwrap_or_default());

        for state in group {
            if state.is_backfill() {
                if timeline.has_open() {
                    return Err(TimelineError::validation(format!(
                        "object {} has an open version; explicit _end not allowed",
                        oid
                    )));
                }
            } else if let Some(open_start) = timeline.open_start() {
                if state.start <= open_start {
                    return Err(TimelineError::validation(format!(
                        "object {} state starting {} does not follow its open version starting {}",
                        oid, state.start, open_start
                    )));
                }
                timeline.close_open(&oid, state.start)?;
                plan.splits += 1;
            }

            timeline.check_no_overlap(&state)?;
            timeline.pending.push(VersionRecord::new(
                new_record_id(),
                state.oid,
                state.hash,
                state.start,
                state.end,
                version,
                state.fields,
            ));
        }

        if let Some(close) = timeline.close.take() {
            plan.batch.closes.push(close);
        }
        plan.batch.inserts.append(&mut timeline.pending);
        written.insert(oid);
    }

    plan.written = written.into_iter().collect();
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::content_hash;
    use crate::model::{FieldMap, Value};
    use chrono::{TimeZone, Utc};

    fn ts(seconds: i64) -> Timestamp {
        Utc.timestamp_opt(seconds, 0).unwrap()
    }

    fn state(oid: i64, x: i64, start: i64, end: Option<i64>) -> NormalizedState {
        let mut fields = FieldMap::new();
        fields.insert("x".into(), Value::Int(x));
        let oid = Oid::Int(oid);
        let hash = content_hash(&oid, &fields);
        NormalizedState {
            oid,
            fields,
            start: ts(start),
            end: end.map(ts),
            hash,
        }
    }

    fn stored(s: &NormalizedState, end: Option<i64>) -> VersionRecord {
        VersionRecord::new(
            format!("stored-{}", s.start.timestamp()),
            s.oid.clone(),
            s.hash.clone(),
            s.start,
            end.map(ts),
            0,
            s.fields.clone(),
        )
    }

    #[test]
    fn test_new_objects_inserted_directly() {
        let plan = plan_batch(
            vec![state(1, 1, 10, None), state(2, 1, 10, None)],
            &HashSet::new(),
            vec![],
            3,
        )
        .unwrap();
        assert_eq!(plan.batch.inserts.len(), 2);
        assert!(plan.batch.closes.is_empty());
        assert_eq!(plan.written, vec![Oid::Int(1), Oid::Int(2)]);
        assert!(plan.batch.inserts.iter().all(|r| r.version_counter() == 3));
    }

    #[test]
    fn test_duplicates_dropped() {
        let first = state(1, 1, 10, None);
        let known: HashSet<String> = [first.hash.clone()].into_iter().collect();
        let plan = plan_batch(
            vec![state(1, 1, 20, None), state(2, 5, 20, None), state(2, 5, 20, None)],
            &known,
            vec![stored(&first, None)],
            0,
        )
        .unwrap();
        assert_eq!(plan.duplicates, 2);
        assert_eq!(plan.written, vec![Oid::Int(2)]);
        assert_eq!(plan.batch.inserts.len(), 1);
    }

    #[test]
    fn test_snapshot_split_closes_stored_open() {
        let first = state(1, 1, 10, None);
        let plan = plan_batch(
            vec![state(1, 2, 20, None)],
            &HashSet::new(),
            vec![stored(&first, None)],
            0,
        )
        .unwrap();
        assert_eq!(
            plan.batch.closes,
            vec![CloseVersion {
                oid: Oid::Int(1),
                end: ts(20)
            }]
        );
        assert_eq!(plan.splits, 1);
        assert_eq!(plan.batch.inserts[0].start(), ts(20));
        assert!(plan.batch.inserts[0].is_open());
    }

    #[test]
    fn test_same_object_states_chain_in_start_order() {
        let plan = plan_batch(
            vec![state(1, 3, 30, None), state(1, 1, 10, None), state(1, 2, 20, None)],
            &HashSet::new(),
            vec![],
            0,
        )
        .unwrap();
        let bounds: Vec<_> = plan
            .batch
            .inserts
            .iter()
            .map(|r| (r.start(), r.end()))
            .collect();
        assert_eq!(
            bounds,
            vec![
                (ts(10), Some(ts(20))),
                (ts(20), Some(ts(30))),
                (ts(30), None)
            ]
        );
        assert_eq!(plan.splits, 2);
        assert!(plan.batch.closes.is_empty());
    }

    #[test]
    fn test_backfill_with_open_version_rejected() {
        let first = state(1, 1, 10, None);
        let err = plan_batch(
            vec![state(1, 2, 1, Some(5))],
            &HashSet::new(),
            vec![stored(&first, None)],
            0,
        )
        .unwrap_err();
        assert!(err.message().contains("explicit _end"));
    }

    #[test]
    fn test_backfill_without_open_version() {
        let first = state(1, 1, 10, None);
        let plan = plan_batch(
            vec![state(1, 2, 1, Some(5))],
            &HashSet::new(),
            vec![stored(&first, Some(20))],
            0,
        )
        .unwrap();
        assert!(plan.batch.closes.is_empty());
        assert_eq!(plan.batch.inserts[0].end(), Some(ts(5)));
        assert_eq!(plan.splits, 0);
    }

    #[test]
    fn test_overlap_rejected() {
        let first = state(1, 1, 10, None);
        let err = plan_batch(
            vec![state(1, 2, 15, Some(25))],
            &HashSet::new(),
            vec![stored(&first, Some(20))],
            0,
        )
        .unwrap_err();
        assert!(err.message().contains("overlaps"));
    }

    #[test]
    fn test_stale_start_rejected() {
        let first = state(1, 1, 10, None);
        let err = plan_batch(
            vec![state(1, 2, 10, None)],
            &HashSet::new(),
            vec![stored(&first, None)],
            0,
        )
        .unwrap_err();
        assert!(err.message().contains("does not follow"));
    }
}
