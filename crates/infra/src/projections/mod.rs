//! Projections fed from the ledger's audit bus.
//!
//! Consumers see every envelope at least once and must be idempotent; each
//! projection keeps its own per-stream cursor for that.

pub mod movement_history;

pub use movement_history::{HistoryEntry, HistoryProjectionError, MovementHistoryProjection};
