//! `depot-core`: domain foundation building blocks.
//!
//! Identifiers, the error taxonomy shared by every crate, the aggregate
//! contract and a clock seam. No infrastructure concerns live here.

pub mod aggregate;
pub mod clock;
pub mod error;
pub mod id;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{DomainError, DomainResult, ErrorBody, StockShortage};
pub use id::{AggregateId, GoodsId, InventoryId, LineId, OrderId, UserId, WarehouseId};
