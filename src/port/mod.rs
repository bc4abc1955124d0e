//! Persistence port
//!
//! The ingest and query engines never touch storage directly. They call
//! `PersistencePort`, which any storage collaborator can implement.
//! `InMemoryStore` is the bundled implementation.

mod backend;
mod errors;
mod memory;

pub use backend::{CloseVersion, PersistencePort, ScanFilter, WriteBatch};
pub use errors::{BackendError, BackendResult};
pub use memory::InMemoryStore;
