//! Ingest
//!
//! Write path: normalize, deduplicate, split snapshots, commit.

mod engine;
mod plan;

pub use engine::IngestEngine;
pub use plan::{plan_batch, IngestPlan};
