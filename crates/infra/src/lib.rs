//! `depot-infra`: the ledger service, order storage and the execution engine.
//!
//! Everything here is in-memory and synchronous. Persistence seams
//! ([`EventStore`], [`KeyedStore`], [`MasterData`], [`AuditSink`]) are traits,
//! so a database-backed implementation can slot in without touching the
//! engine.

pub mod audit;
pub mod command_dispatcher;
pub mod config;
pub mod engine;
pub mod event_store;
pub mod ledger;
pub mod master_data;
pub mod order_store;
pub mod projections;
pub mod read_model;

pub use audit::{AuditError, AuditSink, BusAuditSink, MOVEMENT_STREAM, RecordingAuditSink};
pub use command_dispatcher::{CommandDispatcher, DispatchError, Prepared};
pub use config::DepotConfig;
pub use engine::{NewOrder, WarehouseEngine};
pub use event_store::{EventStore, EventStoreError, InMemoryEventStore};
pub use ledger::{InventoryLedger, LedgerTxn, Receipt, StockAlert};
pub use master_data::{GoodsInfo, InMemoryMasterData, Lookup, MasterData, WarehouseInfo};
pub use order_store::{ORDER_STREAM, OrderStore};
pub use read_model::{InMemoryKeyedStore, KeyedStore, OrderIndex, OrderSummary};

#[cfg(test)]
mod integration_tests;
