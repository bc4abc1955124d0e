//! Temporal Query Tests
//!
//! Tests for the read path:
//! - Point-in-time consistency between backend scans and in-memory sets
//! - Auto-scale selection at its boundaries
//! - Per-object derivations over fetched history
//! - Bounds enforcement

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use timelinedb::model::{FieldMap, Oid, Timestamp, Value, VersionRecord};
use timelinedb::port::{InMemoryStore, PersistencePort};
use timelinedb::query::{auto_select, HistoryValue, Predicate};
use timelinedb::{FindQuery, Scale, Timeline, TimelineConfig, TimelineErrorCode};

fn day(n: i64) -> Timestamp {
    Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap() + Duration::days(n)
}

fn state(oid: i64, status: &str) -> FieldMap {
    let mut map = FieldMap::new();
    map.insert("_oid".into(), Value::Int(oid));
    map.insert("status".into(), Value::from(status));
    map
}

/// Three objects observed on five days:
///
/// | oid | day 0 | day 2   | day 4   | day 6   | day 8   |
/// |-----|-------|---------|---------|---------|---------|
/// | 1   | new   | open    |         | closed  |         |
/// | 2   | new   |         | open    |         |         |
/// | 3   |       | new     |         |         | open    |
fn populated() -> Timeline {
    let timeline =
        Timeline::new(Arc::new(InMemoryStore::new()), TimelineConfig::default()).unwrap();
    timeline.register_collection("tickets").unwrap();
    let batches = vec![
        (0, vec![state(1, "new"), state(2, "new")]),
        (2, vec![state(1, "open"), state(3, "new")]),
        (4, vec![state(2, "open")]),
        (6, vec![state(1, "closed")]),
        (8, vec![state(3, "open")]),
    ];
    for (d, batch) in batches {
        timeline.ingest("tickets", batch, day(d)).unwrap();
    }
    timeline
}

// =============================================================================
// Point-in-Time Consistency Tests
// =============================================================================

/// Backend point reads agree with in-memory point-in-time over all history.
#[test]
fn test_point_in_time_consistency() {
    let timeline = populated();
    let all = timeline.find("tickets", &FindQuery::at("~")).unwrap();

    for d in -1..10 {
        let date = day(d) + Duration::hours(6);
        let token = date.to_rfc3339();
        let scanned = timeline.count("tickets", &FindQuery::at(token)).unwrap();
        assert_eq!(scanned, all.count_on_date(date).unwrap(), "day {}", d);
    }
}

/// An object contributes at most one version to any instant.
#[test]
fn test_one_version_per_object_per_instant() {
    let timeline = populated();
    let all = timeline.find("tickets", &FindQuery::at("~")).unwrap();

    for d in 0..10 {
        let alive = all.on_date(day(d)).unwrap();
        let oids: BTreeSet<_> = alive.records().iter().map(|r| r.oid().clone()).collect();
        assert_eq!(oids.len(), alive.len(), "day {}", d);
    }
}

/// Sampled counts match point reads at every axis date.
#[test]
fn test_history_matches_point_reads() {
    let timeline = populated();
    let points = timeline
        .history("tickets", &FindQuery::at("~"), Scale::Daily, true)
        .unwrap();
    assert_eq!(points.first().map(|p| p.date), Some(day(0)));
    assert_eq!(points.last().map(|p| p.date), Some(day(8)));

    for point in points {
        let expected = timeline
            .count("tickets", &FindQuery::at(point.date.to_rfc3339()))
            .unwrap();
        assert_eq!(point.value, HistoryValue::Count(expected));
    }
}

/// Dates outside the queried window are refused.
#[test]
fn test_point_outside_bounds_rejected() {
    let timeline = populated();
    let token = format!("{}~{}", day(2).to_rfc3339(), day(4).to_rfc3339());
    let window = timeline.find("tickets", &FindQuery::at(token)).unwrap();

    assert!(window.on_date(day(3)).is_ok());
    let err = window.on_date(day(5)).unwrap_err();
    assert_eq!(err.code(), TimelineErrorCode::OutOfRange);
}

// =============================================================================
// Auto-Scale Tests
// =============================================================================

fn dense_store(points: i64, span_days: i64) -> Timeline {
    let store = Arc::new(InMemoryStore::new());
    store.create_collection("dense").unwrap();
    let step = Duration::days(span_days).num_seconds() / (points - 1);
    let base = day(0);
    let rows: Vec<_> = (0..points)
        .map(|i| {
            VersionRecord::new(
                format!("r{}", i),
                Oid::Int(i),
                format!("h{}", i),
                base + Duration::seconds(i * step),
                None,
                0,
                FieldMap::new(),
            )
        })
        .collect();
    store.insert_many("dense", &rows).unwrap();
    Timeline::new(store, TimelineConfig::default()).unwrap()
}

/// Up to the target density the observed timestamps are used as-is.
#[test]
fn test_auto_scale_keeps_maximum_under_target() {
    let timeline = dense_store(300, 1000);
    let set = timeline.find("dense", &FindQuery::at("~")).unwrap();
    let axis = set.dates_range(Scale::Auto, None, None, 300);
    assert_eq!(axis.len(), 300);
}

/// Past the target, a short span falls back to daily sampling.
#[test]
fn test_auto_scale_daily_for_short_span() {
    let timeline = dense_store(401, 250);
    let set = timeline.find("dense", &FindQuery::at("~")).unwrap();
    let axis = set.dates_range(Scale::Auto, None, None, 300);

    assert_eq!(axis.first(), Some(&day(0)));
    assert_eq!(axis.last(), Some(&day(250)));
    assert_eq!(axis.len(), 251);
}

/// Longer spans escalate to coarser scales.
#[test]
fn test_auto_scale_escalation() {
    assert_eq!(auto_select(301, day(0), day(1000), 300), Scale::Weekly);
    assert_eq!(auto_select(301, day(0), day(3000), 300), Scale::Monthly);
    assert_eq!(auto_select(5000, day(0), day(100_000), 300), Scale::Yearly);
}

/// Unknown scale names are format errors.
#[test]
fn test_unknown_scale_rejected() {
    let err = "fortnightly".parse::<Scale>().unwrap_err();
    assert_eq!(err.code(), TimelineErrorCode::FormatInvalid);
}

// =============================================================================
// Derivation Tests
// =============================================================================

/// Latest versions carry the object's age.
#[test]
fn test_last_versions_with_age() {
    let timeline = populated();
    let all = timeline.find("tickets", &FindQuery::at("~")).unwrap();
    let latest = all.last_versions_with_age_at("age", day(10));

    let ages: Vec<_> = latest
        .records()
        .iter()
        .map(|r| (r.oid().clone(), r.field("age").cloned()))
        .collect();
    let ten_days = Duration::days(10).num_seconds() as f64;
    let eight_days = Duration::days(8).num_seconds() as f64;
    assert!(ages.contains(&(Oid::Int(1), Some(Value::Float(ten_days)))));
    assert!(ages.contains(&(Oid::Int(3), Some(Value::Float(eight_days)))));
    assert_eq!(latest.len(), 3);
}

/// First, last and unfinished versions per object.
#[test]
fn test_per_object_derivations() {
    let timeline = populated();
    let all = timeline.find("tickets", &FindQuery::at("~")).unwrap();

    let first = all.first_version();
    assert!(first
        .records()
        .iter()
        .all(|r| r.field("status") == Some(&Value::from("new"))));
    assert_eq!(first.len(), 3);

    let last = all.last_version();
    assert_eq!(last.len(), 3);
    assert!(last.records().iter().all(VersionRecord::is_open));

    // every object is still open
    assert_eq!(all.unfinished().len(), all.len());

    let late = all.started_after(day(1));
    assert_eq!(late.oids(), vec![Oid::Int(3)]);
}

/// Predicates narrow a find and mask filters drop objects.
#[test]
fn test_filters() {
    let timeline = populated();
    let open_now = timeline
        .find(
            "tickets",
            &FindQuery::current().with_predicate(Predicate::eq("status", "open")),
        )
        .unwrap();
    assert_eq!(open_now.oids(), vec![Oid::Int(2), Oid::Int(3)]);

    let without_two = open_now.ids(&[Oid::Int(2)], false);
    assert_eq!(without_two.oids(), vec![Oid::Int(3)]);

    let groups = timeline
        .find("tickets", &FindQuery::at("~"))
        .unwrap()
        .group_size("status");
    assert_eq!(
        groups,
        vec![
            (Value::from("closed"), 1),
            (Value::from("new"), 3),
            (Value::from("open"), 3)
        ]
    );
}

/// Distinct values and the last value ever held.
#[test]
fn test_distinct_and_last_field() {
    let timeline = populated();
    assert_eq!(
        timeline.distinct("tickets", "status", None).unwrap(),
        vec![Value::from("closed"), Value::from("new"), Value::from("open")]
    );
    assert_eq!(
        timeline.last_field("tickets", "_start").unwrap(),
        Some(Value::Timestamp(day(8)))
    );
}

/// Sorting picks which rows a limit keeps; projection trims user fields.
#[test]
fn test_sort_limit_and_projection() {
    let timeline = populated();

    // the two most recent observations of any object
    let latest = timeline
        .find("tickets", &FindQuery::at("~").with_sort("_start", true).with_limit(2))
        .unwrap();
    let starts: Vec<_> = latest.records().iter().map(VersionRecord::start).collect();
    assert_eq!(starts, vec![day(6), day(8)]);

    let first_by_oid = timeline
        .find("tickets", &FindQuery::current().with_sort("_oid", false).with_limit(1))
        .unwrap();
    assert_eq!(first_by_oid.oids(), vec![Oid::Int(1)]);

    let bare = timeline
        .find("tickets", &FindQuery::current().with_fields(Vec::new()))
        .unwrap();
    assert_eq!(bare.len(), 3);
    assert!(bare.records().iter().all(|r| r.field("status").is_none()));

    // the sort field need not survive projection
    let projected = timeline
        .find(
            "tickets",
            &FindQuery::at("~")
                .with_sort("status", false)
                .with_limit(1)
                .with_fields(vec!["missing".to_string()]),
        )
        .unwrap();
    assert_eq!(projected.oids(), vec![Oid::Int(1)]);
    assert!(projected.records()[0].fields().is_empty());
}
