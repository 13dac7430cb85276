//! Disposable read models, rebuildable from the order event streams.

pub mod keyed_store;
pub mod order_index;

pub use keyed_store::{InMemoryKeyedStore, KeyedStore};
pub use order_index::{OrderIndex, OrderSummary};
