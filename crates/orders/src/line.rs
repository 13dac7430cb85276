use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use depot_core::{DomainError, DomainResult, GoodsId, LineId};

/// A line of an inbound, outbound or transfer order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub line_id: LineId,
    pub line_no: u32,
    pub goods_id: GoodsId,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub amount: Decimal,
    pub batch_number: Option<String>,
    pub location: Option<String>,
    pub production_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
    pub remark: Option<String>,
}

impl OrderLine {
    pub fn validate(&self) -> DomainResult<()> {
        if self.quantity <= Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "line {}: quantity must be positive, got {}",
                self.line_no, self.quantity
            )));
        }
        if self.unit_price < Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "line {}: unit price must not be negative",
                self.line_no
            )));
        }
        if self.amount < Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "line {}: amount must not be negative",
                self.line_no
            )));
        }
        Ok(())
    }
}

/// Caller-supplied line content, before ids and numbering are assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineDraft {
    pub goods_id: GoodsId,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    /// Defaults to `quantity * unit_price`.
    pub amount: Option<Decimal>,
    pub batch_number: Option<String>,
    pub location: Option<String>,
    pub production_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
    pub remark: Option<String>,
}

impl LineDraft {
    pub fn new(goods_id: GoodsId, quantity: Decimal, unit_price: Decimal) -> Self {
        Self {
            goods_id,
            quantity,
            unit_price,
            amount: None,
            batch_number: None,
            location: None,
            production_date: None,
            expiry_date: None,
            remark: None,
        }
    }

    pub fn with_batch(mut self, batch_number: impl Into<String>) -> Self {
        self.batch_number = Some(batch_number.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_dates(mut self, production: Option<NaiveDate>, expiry: Option<NaiveDate>) -> Self {
        self.production_date = production;
        self.expiry_date = expiry;
        self
    }

    /// Assign ids and 1-based line numbers in draft order.
    pub fn number_all(drafts: Vec<LineDraft>) -> Vec<OrderLine> {
        drafts
            .into_iter()
            .zip(1u32..)
            .map(|(draft, line_no)| draft.into_line(line_no))
            .collect()
    }

    fn into_line(self, line_no: u32) -> OrderLine {
        OrderLine {
            line_id: LineId::new(),
            line_no,
            goods_id: self.goods_id,
            quantity: self.quantity,
            unit_price: self.unit_price,
            amount: self.amount.unwrap_or(self.quantity * self.unit_price),
            batch_number: self.batch_number,
            location: self.location,
            production_date: self.production_date,
            expiry_date: self.expiry_date,
            remark: self.remark,
        }
    }

    /// Copy an existing line back into draft form (used by document synthesis).
    pub fn from_line(line: &OrderLine) -> Self {
        Self {
            goods_id: line.goods_id,
            quantity: line.quantity,
            unit_price: line.unit_price,
            amount: Some(line.amount),
            batch_number: line.batch_number.clone(),
            location: line.location.clone(),
            production_date: line.production_date,
            expiry_date: line.expiry_date,
            remark: line.remark.clone(),
        }
    }
}

/// Header totals, always recomputed from the full line set.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub total_quantity: Decimal,
    pub total_amount: Decimal,
}

impl OrderTotals {
    pub fn from_lines(lines: &[OrderLine]) -> Self {
        lines.iter().fold(Self::default(), |acc, line| Self {
            total_quantity: acc.total_quantity + line.quantity,
            total_amount: acc.total_amount + line.amount,
        })
    }
}
