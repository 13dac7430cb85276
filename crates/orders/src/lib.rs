//! Order documents (event-sourced).
//!
//! Inbound, outbound, transfer and stocktake orders share one aggregate with
//! a per-kind header and a role-gated approval state machine. Ledger side
//! effects are not performed here: the infra engine reads the emitted events
//! and drives the inventory ledger accordingly.

pub mod approval;
pub mod kind;
pub mod line;
pub mod numbering;
pub mod order;
pub mod status;
pub mod stocktake;

pub use approval::{ApprovalStep, Decision, next_status};
pub use kind::{BusinessType, OrderKind, StocktakeType, TransferPriority};
pub use line::{LineDraft, OrderLine, OrderTotals};
pub use numbering::{OrderNumber, next_number};
pub use order::{
    AdvanceApproval, ApprovalAdvanced, CancelOrder, CreateOrder, DeleteOrder, LinesCounted,
    MarkExecuted, Order, OrderCancelled, OrderCommand, OrderCreated, OrderDeleted, OrderEvent,
    OrderExecuted, OrderHeader, OrderOrigin, OrderRevised, RecordCounts, ReviseOrder, Route,
    SnapshotTaken, StartStocktake, StocktakeStarted, TakeSnapshot,
};
pub use status::OrderStatus;
pub use stocktake::{LineCount, StocktakeLine, StocktakeReport, StocktakeSummary};
