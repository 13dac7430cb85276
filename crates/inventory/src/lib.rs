//! Inventory ledger domain (event-sourced rows).
//!
//! One [`InventoryRecord`] per (warehouse, goods) pair. Every change goes
//! through a [`LedgerCommand`]; the resulting [`LedgerEvent`] is what the
//! infra ledger turns into a [`MovementFact`] for the audit side.

pub mod movement;
pub mod record;
pub mod status;

pub use movement::{MovementContext, MovementFact, MovementKind};
pub use record::{
    COST_SCALE, InventoryKey, InventoryRecord, Issue, LedgerCommand, LedgerEvent, Lock, Receive,
    SetAbsolute, StockIssued, StockLevels, StockLocked, StockReceived, StockReset, StockUnlocked,
    Unlock,
};
pub use status::{
    ClassificationRules, DEFAULT_NEAR_EXPIRY_DAYS, ExpiryFlags, QuantityStatus, StockStatus,
    StockThresholds,
};
