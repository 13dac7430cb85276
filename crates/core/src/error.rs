//! Domain error model.

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::id::{GoodsId, WarehouseId};

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Context attached to an insufficient-stock failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockShortage {
    pub warehouse_id: WarehouseId,
    pub goods_id: GoodsId,
    pub requested: Decimal,
    pub available: Decimal,
    /// Order whose line triggered the check, when the caller knows it.
    pub order_number: Option<String>,
}

impl core::fmt::Display for StockShortage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "warehouse {} goods {}: requested {}, available {}",
            self.warehouse_id, self.goods_id, self.requested, self.available
        )?;
        if let Some(number) = &self.order_number {
            write!(f, " (order {number})")?;
        }
        Ok(())
    }
}

/// Domain-level error.
///
/// Every failure the ledger or the order engine can report. Callers receive
/// these synchronously; nothing here is swallowed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed input. No state was changed.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A referenced warehouse, goods, inventory row or order does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The actor's role cannot perform the requested transition.
    #[error("permission denied: {0}")]
    Permission(String),

    /// The operation is not legal for the current order or ledger state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Available quantity is too low for an outbound movement or a lock.
    #[error("insufficient stock: {0}")]
    InsufficientStock(StockShortage),

    /// A concurrent writer got there first (stale version, duplicate number).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn permission(msg: impl Into<String>) -> Self {
        Self::Permission(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn insufficient_stock(
        warehouse_id: WarehouseId,
        goods_id: GoodsId,
        requested: Decimal,
        available: Decimal,
    ) -> Self {
        Self::InsufficientStock(StockShortage {
            warehouse_id,
            goods_id,
            requested,
            available,
            order_number: None,
        })
    }

    /// Attach an order number to a stock shortage; other kinds pass through.
    pub fn for_order(self, order_number: &str) -> Self {
        match self {
            Self::InsufficientStock(mut shortage) => {
                shortage.order_number.get_or_insert_with(|| order_number.to_string());
                Self::InsufficientStock(shortage)
            }
            other => other,
        }
    }

    /// Stable machine-readable tag for this error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::Permission(_) => "permission_denied",
            Self::InvalidState(_) => "invalid_state",
            Self::InsufficientStock(_) => "insufficient_stock",
            Self::Conflict(_) => "conflict",
        }
    }

    /// Structured body for an outer API layer.
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            error: self.kind(),
            message: self.to_string(),
        }
    }
}

/// Serializable error payload: kind tag plus human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}
