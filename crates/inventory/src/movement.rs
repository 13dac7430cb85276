//! Movement facts: the structured record of every ledger mutation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use depot_core::{AggregateRoot, InventoryId, UserId};
use depot_events::Event;

use crate::record::{InventoryKey, InventoryRecord, LedgerEvent, StockLevels};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementKind {
    Inbound,
    Outbound,
    Lock,
    Unlock,
    SetAbsolute,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Inbound => "INBOUND",
            MovementKind::Outbound => "OUTBOUND",
            MovementKind::Lock => "LOCK",
            MovementKind::Unlock => "UNLOCK",
            MovementKind::SetAbsolute => "SET_ABSOLUTE",
        }
    }
}

/// Who moved the stock and on behalf of which document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementContext {
    pub actor_id: Option<UserId>,
    pub actor_name: String,
    pub related_order_number: Option<String>,
}

impl MovementContext {
    pub fn new(actor_id: Option<UserId>, actor_name: impl Into<String>) -> Self {
        Self {
            actor_id,
            actor_name: actor_name.into(),
            related_order_number: None,
        }
    }

    pub fn with_order(mut self, order_number: impl Into<String>) -> Self {
        self.related_order_number = Some(order_number.into());
        self
    }
}

/// One applied ledger mutation, as seen by the audit side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementFact {
    pub inventory_id: InventoryId,
    pub key: InventoryKey,
    pub kind: MovementKind,
    /// Operation amount as requested (always positive except for resets).
    pub quantity: Decimal,
    /// Signed change of on-hand `quantity`; zero for lock/unlock.
    pub delta: Decimal,
    pub before: StockLevels,
    pub after: StockLevels,
    pub unit_cost: Option<Decimal>,
    pub related_order_number: Option<String>,
    pub actor_id: Option<UserId>,
    pub actor_name: String,
    /// Row version after the mutation; increases by one per fact.
    pub sequence: u64,
    pub occurred_at: DateTime<Utc>,
}

impl MovementFact {
    /// Build the fact for `event`, already applied to `after`.
    pub fn from_applied(
        before: StockLevels,
        after: &InventoryRecord,
        event: &LedgerEvent,
        context: &MovementContext,
    ) -> Self {
        let (kind, quantity, unit_cost) = match event {
            LedgerEvent::StockReceived(e) => (MovementKind::Inbound, e.quantity, Some(e.unit_cost)),
            LedgerEvent::StockIssued(e) => (MovementKind::Outbound, e.quantity, None),
            LedgerEvent::StockLocked(e) => (MovementKind::Lock, e.quantity, None),
            LedgerEvent::StockUnlocked(e) => (MovementKind::Unlock, e.quantity, None),
            LedgerEvent::StockReset(e) => (MovementKind::SetAbsolute, e.quantity, e.unit_cost),
        };
        let after_levels = after.levels();

        Self {
            inventory_id: after.id_typed(),
            key: after.key(),
            kind,
            quantity,
            delta: after_levels.quantity - before.quantity,
            before,
            after: after_levels,
            unit_cost,
            related_order_number: context.related_order_number.clone(),
            actor_id: context.actor_id,
            actor_name: context.actor_name.clone(),
            sequence: after.version(),
            occurred_at: event.occurred_at(),
        }
    }

    /// Single-line human-readable summary.
    pub fn describe(&self) -> String {
        let mut text = match self.kind {
            MovementKind::Inbound => format!("received {}", self.quantity),
            MovementKind::Outbound => format!("issued {}", self.quantity),
            MovementKind::Lock => format!("reserved {}", self.quantity),
            MovementKind::Unlock => format!("released {}", self.quantity),
            MovementKind::SetAbsolute => format!(
                "set to {} (was {})",
                self.after.quantity, self.before.quantity
            ),
        };
        if let Some(cost) = self.unit_cost {
            text.push_str(&format!(" @ {cost}"));
        }
        if let Some(number) = &self.related_order_number {
            text.push_str(&format!(" for {number}"));
        }
        text
    }
}

impl Event for MovementFact {
    fn event_type(&self) -> &'static str {
        match self.kind {
            MovementKind::Inbound => "inventory.movement.inbound",
            MovementKind::Outbound => "inventory.movement.outbound",
            MovementKind::Lock => "inventory.movement.lock",
            MovementKind::Unlock => "inventory.movement.unlock",
            MovementKind::SetAbsolute => "inventory.movement.set_absolute",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}
