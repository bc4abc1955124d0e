//! Timeline configuration
//!
//! Passed explicitly into the ingest and query engines at construction.
//! There is no global configuration state.

use crate::errors::{TimelineError, TimelineResult};

/// Default number of rows per backend request.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Default point count targeted by `scale = "auto"`.
pub const DEFAULT_TARGET_DENSITY: usize = 300;

/// Configuration for ingest and query behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineConfig {
    /// Maximum rows per lookup / insert request sent to the backend.
    ///
    /// A throttle only; an ingest call still commits all-or-nothing.
    pub batch_size: usize,
    /// Target sample count for automatic axis scaling.
    pub target_density: usize,
    /// Schema-version tag stamped on every inserted record.
    pub version: u32,
    /// Lowercase keys, collapse whitespace to `_`, strip non-word characters.
    pub normalize_field_names: bool,
    /// Treat `""` as null before hashing.
    pub empty_strings_as_null: bool,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            target_density: DEFAULT_TARGET_DENSITY,
            version: 0,
            normalize_field_names: false,
            empty_strings_as_null: false,
        }
    }
}

impl TimelineConfig {
    /// Set the backend batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the auto-scale target density.
    pub fn with_target_density(mut self, target_density: usize) -> Self {
        self.target_density = target_density;
        self
    }

    /// Set the schema-version tag.
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Enable key normalization and empty-string nulling.
    pub fn with_field_cleanup(mut self) -> Self {
        self.normalize_field_names = true;
        self.empty_strings_as_null = true;
        self
    }

    /// Checks the configuration is usable.
    pub fn validate(&self) -> TimelineResult<()> {
        if self.batch_size == 0 {
            return Err(TimelineError::validation("batch_size must be > 0"));
        }
        if self.target_density == 0 {
            return Err(TimelineError::validation("target_density must be > 0"));
        }
        Ok(())
    }
}
