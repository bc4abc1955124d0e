//! VersionSet - fetched version records plus the bounds they were queried with
//!
//! Every derivation returns a new `VersionSet` carrying the same bounds.
//! Records are kept sorted by `start` (then `end`, then id), so per-object
//! groupings are stable and repeated runs give identical results.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;

use super::axis::{sampled_axis, Scale};
use super::filters::{Predicate, PredicateFilter};
use super::range::DateRange;
use crate::errors::TimelineResult;
use crate::model::{by_start, FieldMap, Oid, Timestamp, Value, VersionRecord};

/// Value reported for one sample date.
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryValue {
    /// Number of versions alive at the date
    Count(usize),
    /// Sorted oids alive at the date
    Oids(Vec<Oid>),
}

/// One point of a history series.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryPoint {
    pub date: Timestamp,
    pub value: HistoryValue,
}

/// A bounded, start-ordered collection of version records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VersionSet {
    records: Vec<VersionRecord>,
    range: DateRange,
}

impl VersionSet {
    /// Wraps records fetched for `range`.
    pub fn new(mut records: Vec<VersionRecord>, range: DateRange) -> Self {
        records.sort_by(by_start);
        Self { records, range }
    }

    fn derive(&self, records: Vec<VersionRecord>) -> Self {
        Self::new(records, self.range)
    }

    #[inline]
    pub fn records(&self) -> &[VersionRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<VersionRecord> {
        self.records
    }

    #[inline]
    pub fn range(&self) -> &DateRange {
        &self.range
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn lbound(&self) -> Option<Timestamp> {
        self.range.lbound()
    }

    pub fn rbound(&self) -> Option<Timestamp> {
        self.range.rbound()
    }

    /// Returns true if `date` lies within the queried bounds.
    pub fn check_in_bounds(&self, date: Timestamp) -> bool {
        self.range.contains(date)
    }

    /// Sorted distinct oids.
    pub fn oids(&self) -> Vec<Oid> {
        self.records
            .iter()
            .map(|r| r.oid().clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Records grouped per object, each group in start order.
    pub fn by_object(&self) -> BTreeMap<&Oid, Vec<&VersionRecord>> {
        let mut groups: BTreeMap<&Oid, Vec<&VersionRecord>> = BTreeMap::new();
        for record in &self.records {
            groups.entry(record.oid()).or_default().push(record);
        }
        groups
    }

    /// Flattens every record into a field map with bookkeeping keys.
    pub fn to_field_maps(&self) -> Vec<FieldMap> {
        self.records.iter().map(VersionRecord::to_field_map).collect()
    }

    // Point in time

    /// Versions alive at `date`: `start <= date < end`.
    ///
    /// # Errors
    ///
    /// `TL_OUT_OF_RANGE` if `date` is outside the queried bounds.
    pub fn on_date(&self, date: Timestamp) -> TimelineResult<VersionSet> {
        self.range.check(date)?;
        Ok(self.derive(
            self.records
                .iter()
                .filter(|r| r.covers(date))
                .cloned()
                .collect(),
        ))
    }

    /// Number of versions alive at `date`.
    pub fn count_on_date(&self, date: Timestamp) -> TimelineResult<usize> {
        self.range.check(date)?;
        Ok(self.records.iter().filter(|r| r.covers(date)).count())
    }

    /// Sample dates for this set; see [`sampled_axis`].
    pub fn dates_range(
        &self,
        scale: Scale,
        start: Option<Timestamp>,
        end: Option<Timestamp>,
        target: usize,
    ) -> Vec<Timestamp> {
        sampled_axis(&self.records, &self.range, scale, start, end, target)
    }

    /// Point-in-time count or oid list for each date, ordered by date.
    pub fn history(&self, dates: &[Timestamp], counts: bool) -> TimelineResult<Vec<HistoryPoint>> {
        let mut dates = dates.to_vec();
        dates.sort();
        dates.dedup();

        dates
            .into_iter()
            .map(|date| {
                let value = if counts {
                    HistoryValue::Count(self.count_on_date(date)?)
                } else {
                    let mut oids: Vec<Oid> = self
                        .on_date(date)?
                        .records
                        .into_iter()
                        .map(|r| r.oid().clone())
                        .collect();
                    oids.sort();
                    HistoryValue::Oids(oids)
                };
                Ok(HistoryPoint { date, value })
            })
            .collect()
    }

    // Per-object derivations

    /// All versions of objects not conclusively finished within the bounds:
    /// some version is open or ends after the right bound.
    pub fn unfinished(&self) -> VersionSet {
        let rbound = self.rbound();
        let oids: BTreeSet<&Oid> = self
            .records
            .iter()
            .filter(|r| match (r.end(), rbound) {
                (None, _) => true,
                (Some(end), Some(bound)) => end > bound,
                (Some(_), None) => false,
            })
            .map(VersionRecord::oid)
            .collect();
        self.keep_objects(|oid| oids.contains(oid))
    }

    /// Latest version per object, annotated with the object's age in seconds.
    ///
    /// Age runs from the object's earliest start to its latest end, capped
    /// at the right bound, or at the current UTC time when unbounded.
    pub fn last_versions_with_age(&self, field: &str) -> VersionSet {
        let cutoff = self.rbound().unwrap_or_else(Utc::now);
        self.last_versions_with_age_at(field, cutoff)
    }

    /// Same as [`last_versions_with_age`](Self::last_versions_with_age) with
    /// an explicit cutoff.
    pub fn last_versions_with_age_at(&self, field: &str, cutoff: Timestamp) -> VersionSet {
        let mut out = Vec::new();
        for (_, versions) in self.by_object() {
            let Some(first_start) = versions.iter().map(|r| r.start()).min() else {
                continue;
            };
            let last_end = if versions.iter().any(|r| r.is_open()) {
                None
            } else {
                versions.iter().filter_map(|r| r.end()).max()
            };
            let age_end = last_end.map_or(cutoff, |end| end.min(cutoff));
            let age = Value::Float(seconds(age_end - first_start));

            out.extend(
                versions
                    .iter()
                    .filter(|r| r.end() == last_end)
                    .map(|r| r.with_field(field, age.clone())),
            );
        }
        self.derive(out)
    }

    /// Per object, the trailing run of contiguous versions.
    ///
    /// A break is an end that no later version starts at. Everything up to
    /// and including the latest break is dropped.
    pub fn last_chain(&self) -> VersionSet {
        let mut out = Vec::new();
        for (_, versions) in self.by_object() {
            let starts: BTreeSet<Timestamp> = versions.iter().map(|r| r.start()).collect();
            let last_end = if versions.iter().any(|r| r.is_open()) {
                None
            } else {
                versions.iter().filter_map(|r| r.end()).max()
            };
            let cutoff = versions
                .iter()
                .filter_map(|r| r.end())
                .filter(|end| !starts.contains(end) && Some(*end) != last_end)
                .max();
            out.extend(
                versions
                    .into_iter()
                    .filter(|r| cutoff.map_or(true, |c| r.start() > c))
                    .cloned(),
            );
        }
        self.derive(out)
    }

    /// Per object, the version at ordinal `index` of its start-ordered list.
    ///
    /// Negative indexes count from the end. Objects with too few versions
    /// are left out.
    pub fn one_version(&self, index: isize) -> VersionSet {
        let mut out = Vec::new();
        for (_, versions) in self.by_object() {
            let starts: Vec<Timestamp> = versions.iter().map(|r| r.start()).collect();
            let position = if index < 0 {
                starts.len().checked_sub(index.unsigned_abs())
            } else {
                Some(index as usize)
            };
            let Some(start) = position.and_then(|p| starts.get(p)).copied() else {
                continue;
            };
            out.extend(versions.into_iter().filter(|r| r.start() == start).cloned());
        }
        self.derive(out)
    }

    pub fn first_version(&self) -> VersionSet {
        self.one_version(0)
    }

    pub fn last_version(&self) -> VersionSet {
        self.one_version(-1)
    }

    /// All versions of objects whose first version started after `date`.
    pub fn started_after(&self, date: Timestamp) -> VersionSet {
        let oids: BTreeSet<&Oid> = self
            .by_object()
            .into_iter()
            .filter(|(_, versions)| versions.iter().map(|r| r.start()).min() > Some(date))
            .map(|(oid, _)| oid)
            .collect();
        self.keep_objects(|oid| oids.contains(oid))
    }

    /// Frequency of each non-null value of `field`, ordered by value.
    pub fn group_size(&self, field: &str) -> Vec<(Value, usize)> {
        let mut counts: Vec<(Value, usize)> = Vec::new();
        for value in self.records.iter().filter_map(|r| r.value_of(field)) {
            if value.is_null() {
                continue;
            }
            match counts.iter_mut().find(|(v, _)| *v == value) {
                Some((_, n)) => *n += 1,
                None => counts.push((value, 1)),
            }
        }
        counts.sort_by(|a, b| a.0.total_cmp(&b.0));
        counts
    }

    // Filters

    /// Keeps (or with `keep = false`, drops) the listed objects.
    pub fn ids(&self, oids: &[Oid], keep: bool) -> VersionSet {
        self.keep_objects(|oid| oids.contains(oid) == keep)
    }

    /// Keeps records matching every predicate.
    pub fn filter(&self, predicates: &[Predicate]) -> VersionSet {
        self.filter_by(|r| PredicateFilter::matches(r, predicates))
    }

    /// Keeps records for which `keep` returns true.
    pub fn filter_by<F>(&self, keep: F) -> VersionSet
    where
        F: Fn(&VersionRecord) -> bool,
    {
        self.derive(self.records.iter().filter(|r| keep(r)).cloned().collect())
    }

    /// Applies `function` to each object's start-ordered versions and
    /// concatenates the results.
    pub fn object_apply<F>(&self, mut function: F) -> VersionSet
    where
        F: FnMut(&[VersionRecord]) -> Vec<VersionRecord>,
    {
        let mut out = Vec::new();
        for (_, versions) in self.by_object() {
            let owned: Vec<VersionRecord> = versions.into_iter().cloned().collect();
            out.extend(function(&owned));
        }
        self.derive(out)
    }

    fn keep_objects<F>(&self, keep: F) -> VersionSet
    where
        F: Fn(&Oid) -> bool,
    {
        self.filter_by(|r| keep(r.oid()))
    }
}

fn seconds(duration: chrono::Duration) -> f64 {
    match duration.num_microseconds() {
        Some(us) => us as f64 / 1_000_000.0,
        None => duration.num_seconds() as f64,
    }
}
