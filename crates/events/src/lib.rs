//! Event primitives: the `Event` contract, stream envelopes and a pub/sub bus.
//!
//! Order documents persist their events through the infra event store; ledger
//! movement facts travel over an [`EventBus`] to the audit side.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use handler::execute;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
