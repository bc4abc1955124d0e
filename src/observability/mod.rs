//! Observability
//!
//! - Structured JSON logging
//! - Monotonic counters
//! - Typed lifecycle events
//!
//! Observability is read-only: nothing here changes the outcome of an
//! operation, and logging failures are ignored.
//!
//! ```ignore
//! use timelinedb::observability::{log_event, Event, MetricsRegistry};
//!
//! log_event(Event::IngestCommitted, &[("collection", "cube"), ("written", "3")]);
//!
//! let metrics = MetricsRegistry::new();
//! metrics.increment_batches_committed();
//! ```

mod events;
mod logger;
mod metrics;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
pub use scope::ObservationScope;

/// Log a lifecycle event with fields
///
/// Failure events are logged at WARN, everything else at INFO.
pub fn log_event(event: Event, fields: &[(&str, &str)]) {
    let severity = if event.is_failure() {
        Severity::Warn
    } else {
        Severity::Info
    };
    Logger::log(severity, event.as_str(), fields);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event() {
        log_event(Event::CollectionRegistered, &[("collection", "cube")]);
        log_event(Event::IngestRejected, &[("reason", "stale mtime")]);
    }
}
