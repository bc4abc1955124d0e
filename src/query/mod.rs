//! Temporal queries
//!
//! - `range`: date-range tokens and bounds
//! - `axis`: sample dates with automatic scale selection
//! - `set`: `VersionSet` point-in-time and per-object derivations
//! - `filters`: field predicates
//! - `engine`: fetches through the persistence port

mod axis;
mod engine;
mod filters;
mod range;
mod set;

pub use axis::{auto_select, sampled_axis, Scale};
pub use engine::{FindQuery, QueryEngine};
pub use filters::{FilterOp, Predicate, PredicateFilter};
pub use range::DateRange;
pub use set::{HistoryPoint, HistoryValue, VersionSet};
