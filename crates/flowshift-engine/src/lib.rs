mod audit;
mod config;
mod engine;
mod error;
mod listener;
mod repository;
mod store;
#[cfg(test)]
mod test_support;

pub use audit::{AuditEntry, AuditSink, InMemoryAuditLog, batch_entries};
pub use config::{Clock, MigrationConfig};
pub use engine::{BatchOutcome, InstanceFailure, MigrationEngine};
pub use error::MigrationError;
pub use listener::RecordingListener;
pub use repository::{InMemoryModelRepository, ModelRepository};
pub use store::{InMemoryInstanceStore, InstanceStore, StoreError};
