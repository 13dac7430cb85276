//! Derived stock status: quantity classification and expiry flags.
//!
//! Nothing here is stored; callers classify a record against the goods'
//! thresholds and a reference date whenever they need it.

use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::record::InventoryRecord;

pub const DEFAULT_NEAR_EXPIRY_DAYS: u64 = 30;

/// Per-goods stock thresholds from master data.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockThresholds {
    pub min_stock: Option<Decimal>,
    pub max_stock: Option<Decimal>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuantityStatus {
    Zero,
    High,
    Low,
    Normal,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiryFlags {
    pub is_expired: bool,
    pub is_near_expiry: bool,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockStatus {
    pub quantity_status: QuantityStatus,
    pub expiry: ExpiryFlags,
}

impl StockStatus {
    pub fn needs_attention(&self) -> bool {
        self.quantity_status != QuantityStatus::Normal
            || self.expiry.is_expired
            || self.expiry.is_near_expiry
    }
}

/// Tunables for classification.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ClassificationRules {
    /// Multiplier on `max_stock` above which a row counts as HIGH.
    pub high_stock_buffer: Decimal,
    pub near_expiry_days: u64,
}

impl Default for ClassificationRules {
    fn default() -> Self {
        Self {
            high_stock_buffer: Decimal::new(115, 2),
            near_expiry_days: DEFAULT_NEAR_EXPIRY_DAYS,
        }
    }
}

impl ClassificationRules {
    /// ZERO beats HIGH beats LOW beats NORMAL.
    ///
    /// HIGH only applies once `max_stock` is exceeded by the buffer; LOW has
    /// no buffer below `min_stock`.
    pub fn quantity_status(&self, quantity: Decimal, thresholds: &StockThresholds) -> QuantityStatus {
        if quantity.is_zero() {
            return QuantityStatus::Zero;
        }
        if let Some(max) = thresholds.max_stock {
            if quantity > max * self.high_stock_buffer {
                return QuantityStatus::High;
            }
        }
        if let Some(min) = thresholds.min_stock {
            if quantity < min {
                return QuantityStatus::Low;
            }
        }
        QuantityStatus::Normal
    }

    pub fn expiry(&self, expiry_date: Option<NaiveDate>, today: NaiveDate) -> ExpiryFlags {
        let Some(expiry) = expiry_date else {
            return ExpiryFlags::default();
        };
        let is_expired = expiry < today;
        let horizon = today
            .checked_add_days(Days::new(self.near_expiry_days))
            .unwrap_or(NaiveDate::MAX);

        ExpiryFlags {
            is_expired,
            is_near_expiry: !is_expired && expiry < horizon,
        }
    }

    pub fn classify(
        &self,
        record: &InventoryRecord,
        thresholds: &StockThresholds,
        today: NaiveDate,
    ) -> StockStatus {
        StockStatus {
            quantity_status: self.quantity_status(record.quantity(), thresholds),
            expiry: self.expiry(record.expiry_date(), today),
        }
    }
}
