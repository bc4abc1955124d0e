//! Lifecycle events
//!
//! Every log line emitted by the timeline names one of these events.

use std::fmt;

/// Observable timeline events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Collections
    CollectionRegistered,
    CollectionDropped,

    // Ingest
    /// Batch rejected before any write
    IngestRejected,
    /// Identical content already stored
    DuplicatesSkipped,
    /// Open version closed by newer content
    SnapshotSplit,
    /// Batch committed and high-water mark advanced
    IngestCommitted,
    /// Backend failed mid-batch
    IngestAborted,

    // Administration
    ObjectsRemoved,

    // Reads
    QueryExecuted,
    QueryRejected,
    ClosureResolved,

    // Snapshot files
    SnapshotSaved,
    SnapshotLoaded,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::CollectionRegistered => "COLLECTION_REGISTERED",
            Event::CollectionDropped => "COLLECTION_DROPPED",
            Event::IngestRejected => "INGEST_REJECTED",
            Event::DuplicatesSkipped => "DUPLICATES_SKIPPED",
            Event::SnapshotSplit => "SNAPSHOT_SPLIT",
            Event::IngestCommitted => "INGEST_COMMITTED",
            Event::IngestAborted => "INGEST_ABORTED",
            Event::ObjectsRemoved => "OBJECTS_REMOVED",
            Event::QueryExecuted => "QUERY_EXECUTED",
            Event::QueryRejected => "QUERY_REJECTED",
            Event::ClosureResolved => "CLOSURE_RESOLVED",
            Event::SnapshotSaved => "SNAPSHOT_SAVED",
            Event::SnapshotLoaded => "SNAPSHOT_LOADED",
        }
    }

    /// Returns true if this event records a failed operation
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Event::IngestRejected | Event::IngestAborted | Event::QueryRejected
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
