use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use depot_core::{AggregateId, InventoryId, UserId};
use depot_events::{EventEnvelope, Subscription};
use depot_inventory::{InventoryKey, MovementFact, MovementKind};

use crate::read_model::KeyedStore;

/// One line of a row's movement history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub sequence: u64,
    pub key: InventoryKey,
    pub operation: MovementKind,
    pub quantity: Decimal,
    pub before_quantity: Decimal,
    pub after_quantity: Decimal,
    pub related_order_number: Option<String>,
    pub actor_id: Option<UserId>,
    pub actor_name: String,
    pub occurred_at: DateTime<Utc>,
    pub description: String,
}

impl From<&MovementFact> for HistoryEntry {
    fn from(fact: &MovementFact) -> Self {
        Self {
            sequence: fact.sequence,
            key: fact.key,
            operation: fact.kind,
            quantity: fact.quantity,
            before_quantity: fact.before.quantity,
            after_quantity: fact.after.quantity,
            related_order_number: fact.related_order_number.clone(),
            actor_id: fact.actor_id,
            actor_name: fact.actor_name.clone(),
            occurred_at: fact.occurred_at,
            description: fact.describe(),
        }
    }
}

#[derive(Debug, Error)]
pub enum HistoryProjectionError {
    #[error("envelope stream {envelope} does not match fact row {fact}")]
    StreamMismatch {
        envelope: AggregateId,
        fact: InventoryId,
    },

    #[error("sequence number must be positive")]
    ZeroSequence,
}

/// Per-row movement history fed from the audit bus.
///
/// Keeps a cursor per row so re-delivered envelopes are ignored. A gap in
/// sequence numbers means the sink dropped a fact upstream; it is logged
/// and the projection moves on, since the ledger itself is unaffected.
#[derive(Debug)]
pub struct MovementHistoryProjection<S>
where
    S: KeyedStore<InventoryId, Vec<HistoryEntry>>,
{
    store: S,
    cursors: RwLock<HashMap<InventoryId, u64>>,
}

impl<S> MovementHistoryProjection<S>
where
    S: KeyedStore<InventoryId, Vec<HistoryEntry>>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    /// History of one row, oldest first.
    pub fn history(&self, inventory_id: InventoryId) -> Vec<HistoryEntry> {
        self.store.get(&inventory_id).unwrap_or_default()
    }

    /// Every entry that mentions `order_number`, across rows.
    pub fn for_order(&self, order_number: &str) -> Vec<HistoryEntry> {
        let mut entries: Vec<HistoryEntry> = self
            .store
            .list()
            .into_iter()
            .flatten()
            .filter(|e| e.related_order_number.as_deref() == Some(order_number))
            .collect();
        entries.sort_by_key(|e| (e.occurred_at, e.key, e.sequence));
        entries
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<MovementFact>,
    ) -> Result<(), HistoryProjectionError> {
        let fact = envelope.payload();
        let seq = envelope.sequence_number();

        if envelope.aggregate_id() != AggregateId::from(fact.inventory_id) {
            return Err(HistoryProjectionError::StreamMismatch {
                envelope: envelope.aggregate_id(),
                fact: fact.inventory_id,
            });
        }
        if seq == 0 {
            return Err(HistoryProjectionError::ZeroSequence);
        }

        let mut cursors = self.cursors.write().unwrap_or_else(PoisonError::into_inner);
        let last = cursors.get(&fact.inventory_id).copied().unwrap_or(0);
        if seq <= last {
            // Duplicate delivery.
            return Ok(());
        }
        if last != 0 && seq != last + 1 {
            tracing::warn!(
                inventory_id = %fact.inventory_id,
                last,
                found = seq,
                "gap in movement history"
            );
        }

        let mut entries = self.store.get(&fact.inventory_id).unwrap_or_default();
        entries.push(HistoryEntry::from(fact));
        self.store.upsert(fact.inventory_id, entries);
        cursors.insert(fact.inventory_id, seq);

        Ok(())
    }

    /// Apply everything queued on `subscription`. Returns how many envelopes
    /// were read.
    pub fn catch_up(
        &self,
        subscription: &Subscription<EventEnvelope<MovementFact>>,
    ) -> Result<usize, HistoryProjectionError> {
        let pending = subscription.drain();
        for envelope in &pending {
            self.apply_envelope(envelope)?;
        }
        Ok(pending.len())
    }
}
