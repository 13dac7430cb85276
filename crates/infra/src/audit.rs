//! Fire-and-forget sink for ledger movement facts.
//!
//! The ledger hands every committed movement to an [`AuditSink`]. A sink
//! failure is logged by the caller and never undoes the movement.

use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use uuid::Uuid;

use depot_core::AggregateId;
use depot_events::{EventBus, EventEnvelope};
use depot_inventory::MovementFact;

/// Stream type stamped on movement envelopes.
pub const MOVEMENT_STREAM: &str = "inventory.record";

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
}

pub trait AuditSink: Send + Sync {
    fn record(&self, fact: &MovementFact) -> Result<(), AuditError>;
}

impl<S: AuditSink + ?Sized> AuditSink for Arc<S> {
    fn record(&self, fact: &MovementFact) -> Result<(), AuditError> {
        (**self).record(fact)
    }
}

/// Publishes each fact as an envelope on an event bus.
///
/// The envelope's stream is the inventory row and its sequence number is the
/// row version after the movement, so consumers can drop re-deliveries.
#[derive(Debug, Clone)]
pub struct BusAuditSink<B> {
    bus: B,
}

impl<B> BusAuditSink<B> {
    pub fn new(bus: B) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<B> AuditSink for BusAuditSink<B>
where
    B: EventBus<EventEnvelope<MovementFact>>,
{
    fn record(&self, fact: &MovementFact) -> Result<(), AuditError> {
        let envelope = EventEnvelope::new(
            Uuid::now_v7(),
            AggregateId::from(fact.inventory_id),
            MOVEMENT_STREAM,
            fact.sequence,
            fact.clone(),
        );
        self.bus
            .publish(envelope)
            .map_err(|e| AuditError::Unavailable(e.to_string()))
    }
}

/// Keeps every fact in memory. Handy in tests and local tooling.
#[derive(Debug, Default)]
pub struct RecordingAuditSink {
    facts: Mutex<Vec<MovementFact>>,
}

impl RecordingAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn facts(&self) -> Vec<MovementFact> {
        self.facts.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl AuditSink for RecordingAuditSink {
    fn record(&self, fact: &MovementFact) -> Result<(), AuditError> {
        self.facts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(fact.clone());
        Ok(())
    }
}
