//! timelinedb - A deterministic bitemporal version store
//!
//! Keeps the full history of mutable objects as time-bounded versions.
//! Every object state is a row valid over `[start, end)`; superseding
//! content closes the open row instead of overwriting it.
//!
//! - `ingest`: deduplicated, ordered, all-or-nothing batch writes
//! - `query`: point-in-time reads, sampled history, per-object derivations
//! - `closure`: bounded dependency expansion over reference fields
//! - `snapshot`: JSON export and import of query results
//! - `port`: the storage seam, with an in-memory implementation
//!
//! ```ignore
//! use std::sync::Arc;
//! use timelinedb::{FindQuery, InMemoryStore, Timeline, TimelineConfig};
//!
//! let timeline = Timeline::new(Arc::new(InMemoryStore::new()), TimelineConfig::default())?;
//! timeline.register_collection("cube")?;
//! timeline.ingest("cube", states, chrono::Utc::now())?;
//! let alive = timeline.count("cube", &FindQuery::current())?;
//! ```

pub mod closure;
pub mod config;
pub mod errors;
pub mod identity;
pub mod ingest;
pub mod model;
pub mod observability;
pub mod port;
pub mod query;
pub mod snapshot;
pub mod timeline;

pub use config::TimelineConfig;
pub use errors::{Severity, TimelineError, TimelineErrorCode, TimelineResult};
pub use model::{FieldMap, Oid, Timestamp, Value, VersionRecord};
pub use port::{InMemoryStore, PersistencePort};
pub use query::{DateRange, FindQuery, Predicate, Scale, VersionSet};
pub use snapshot::{load_snapshot, save_snapshot};
pub use timeline::{CollectionStats, Timeline};
