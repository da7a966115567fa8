//! # Ingestion core
//!
//! Transport-agnostic pieces of the remote-side ingestion subsystem: the
//! ring buffer, event id allocator, base ingestor behavior, the factory
//! registry, the manager that owns running ingestors, and the concrete
//! protocol ingestors built on top of them.

pub mod base;
pub mod id_gen;
pub mod manager;
pub mod protocols;
pub mod registry;
pub mod ring_buffer;
pub mod seen_keys;
pub mod types;

pub use base::{Ingestor, IngestorCore};
pub use manager::IngestorManager;
pub use registry::FactoryRegistry;
pub use types::{IngestedEvent, IngestorState, IngestorStatus};

/// Register every built-in protocol ingestor with the global factory
/// registry. Call once at process start before [`IngestorManager::start`].
pub fn register_builtin_protocols() {
    protocols::discord::register();
    protocols::webhook::register();
    protocols::poll::register();
}
