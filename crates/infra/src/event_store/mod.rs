//! Append-only event store boundary for order documents.
//!
//! Streams are keyed by aggregate id. Only an in-memory backend ships here;
//! anything durable plugs in behind [`EventStore`].

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
