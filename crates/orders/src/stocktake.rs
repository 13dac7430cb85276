//! Stocktake count sheet: snapshot lines, counts and derived statistics.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use depot_core::{GoodsId, LineId};

/// One ledger row as captured for counting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StocktakeLine {
    pub line_id: LineId,
    pub goods_id: GoodsId,
    pub book_quantity: Decimal,
    /// Ledger average cost at snapshot time.
    pub unit_price: Decimal,
    pub book_amount: Decimal,
    pub actual_quantity: Option<Decimal>,
    pub difference_quantity: Decimal,
    pub actual_amount: Option<Decimal>,
    pub difference_amount: Decimal,
    pub batch_number: Option<String>,
    pub location: Option<String>,
    pub is_completed: bool,
    pub is_adjusted: bool,
    pub counted_by: Option<String>,
    pub remark: Option<String>,
}

impl StocktakeLine {
    pub fn snapshot(goods_id: GoodsId, book_quantity: Decimal, unit_price: Decimal) -> Self {
        Self {
            line_id: LineId::new(),
            goods_id,
            book_quantity,
            unit_price,
            book_amount: book_quantity * unit_price,
            actual_quantity: None,
            difference_quantity: Decimal::ZERO,
            actual_amount: None,
            difference_amount: Decimal::ZERO,
            batch_number: None,
            location: None,
            is_completed: false,
            is_adjusted: false,
            counted_by: None,
            remark: None,
        }
    }

    /// Apply a count and recompute difference and amounts.
    ///
    /// Clearing the actual quantity resets the difference to zero.
    pub fn record_count(&mut self, count: &LineCount) {
        self.actual_quantity = count.actual_quantity;
        match count.actual_quantity {
            Some(actual) => {
                self.difference_quantity = actual - self.book_quantity;
                self.actual_amount = Some(actual * self.unit_price);
            }
            None => {
                self.difference_quantity = Decimal::ZERO;
                self.actual_amount = None;
            }
        }
        self.difference_amount = self.difference_quantity * self.unit_price;
        self.is_completed = count.is_completed.unwrap_or(count.actual_quantity.is_some());
        if count.remark.is_some() {
            self.remark = count.remark.clone();
        }
        if count.counted_by.is_some() {
            self.counted_by = count.counted_by.clone();
        }
    }

    /// Counted, off-book and not yet pushed to the ledger.
    pub fn needs_adjustment(&self) -> bool {
        !self.is_adjusted
            && !self.difference_quantity.is_zero()
            && self.actual_quantity.is_some_and(|actual| actual >= Decimal::ZERO)
    }
}

/// Count entry for one line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineCount {
    pub line_id: LineId,
    pub actual_quantity: Option<Decimal>,
    pub remark: Option<String>,
    pub counted_by: Option<String>,
    /// Defaults to "counted" when an actual quantity is given.
    pub is_completed: Option<bool>,
}

impl LineCount {
    pub fn new(line_id: LineId, actual_quantity: Decimal) -> Self {
        Self {
            line_id,
            actual_quantity: Some(actual_quantity),
            remark: None,
            counted_by: None,
            is_completed: None,
        }
    }

    pub fn with_remark(mut self, remark: impl Into<String>) -> Self {
        self.remark = Some(remark.into());
        self
    }
}

/// Order-level counters, recomputed after every count.
///
/// Gain/loss/normal partition every line by the sign of its difference, so
/// uncounted lines land in `normal_items`.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StocktakeSummary {
    pub total_items: usize,
    pub completed_items: usize,
    pub difference_items: usize,
    pub gain_items: usize,
    pub loss_items: usize,
    pub normal_items: usize,
}

impl StocktakeSummary {
    pub fn from_lines(lines: &[StocktakeLine]) -> Self {
        let mut summary = Self {
            total_items: lines.len(),
            ..Self::default()
        };
        for line in lines {
            if line.is_completed {
                summary.completed_items += 1;
            }
            if line.difference_quantity > Decimal::ZERO {
                summary.gain_items += 1;
            } else if line.difference_quantity < Decimal::ZERO {
                summary.loss_items += 1;
            } else {
                summary.normal_items += 1;
            }
        }
        summary.difference_items = summary.gain_items + summary.loss_items;
        summary
    }
}

/// Valuation report over a count sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StocktakeReport {
    pub summary: StocktakeSummary,
    pub total_book_amount: Decimal,
    pub total_actual_amount: Decimal,
    pub gain_amount: Decimal,
    /// Reported as a positive figure.
    pub loss_amount: Decimal,
    pub gain_lines: Vec<StocktakeLine>,
    pub loss_lines: Vec<StocktakeLine>,
    pub normal_lines: Vec<StocktakeLine>,
}

impl StocktakeReport {
    pub fn from_lines(lines: &[StocktakeLine]) -> Self {
        let mut report = Self {
            summary: StocktakeSummary::from_lines(lines),
            total_book_amount: Decimal::ZERO,
            total_actual_amount: Decimal::ZERO,
            gain_amount: Decimal::ZERO,
            loss_amount: Decimal::ZERO,
            gain_lines: Vec::new(),
            loss_lines: Vec::new(),
            normal_lines: Vec::new(),
        };

        for line in lines {
            report.total_book_amount += line.book_amount;
            report.total_actual_amount += line.actual_amount.unwrap_or(Decimal::ZERO);
            if line.difference_quantity > Decimal::ZERO {
                report.gain_amount += line.difference_amount;
                report.gain_lines.push(line.clone());
            } else if line.difference_quantity < Decimal::ZERO {
                report.loss_amount += line.difference_amount.abs();
                report.loss_lines.push(line.clone());
            } else {
                report.normal_lines.push(line.clone());
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn count_below_book_records_a_loss() {
        let mut line = StocktakeLine::snapshot(GoodsId::new(), dec!(100), dec!(2.5));
        line.record_count(&LineCount::new(line.line_id, dec!(90)).with_remark("shelf B short"));

        assert_eq!(line.difference_quantity, dec!(-10));
        assert_eq!(line.actual_amount, Some(dec!(225)));
        assert_eq!(line.difference_amount, dec!(-25));
        assert!(line.is_completed);
        assert!(line.needs_adjustment());
        assert_eq!(line.remark.as_deref(), Some("shelf B short"));
    }

    #[test]
    fn clearing_a_count_resets_the_difference() {
        let mut line = StocktakeLine::snapshot(GoodsId::new(), dec!(5), dec!(1));
        line.record_count(&LineCount::new(line.line_id, dec!(7)));
        line.record_count(&LineCount {
            line_id: line.line_id,
            actual_quantity: None,
            remark: None,
            counted_by: None,
            is_completed: None,
        });

        assert_eq!(line.difference_quantity, Decimal::ZERO);
        assert!(!line.is_completed);
        assert!(!line.needs_adjustment());
    }

    #[test]
    fn adjusted_or_matching_lines_need_no_adjustment() {
        let mut matching = StocktakeLine::snapshot(GoodsId::new(), dec!(5), dec!(1));
        matching.record_count(&LineCount::new(matching.line_id, dec!(5)));
        assert!(!matching.needs_adjustment());

        let mut adjusted = StocktakeLine::snapshot(GoodsId::new(), dec!(5), dec!(1));
        adjusted.record_count(&LineCount::new(adjusted.line_id, dec!(6)));
        adjusted.is_adjusted = true;
        assert!(!adjusted.needs_adjustment());
    }

    #[test]
    fn summary_and_report_partition_lines() {
        let mut gain = StocktakeLine::snapshot(GoodsId::new(), dec!(10), dec!(2));
        gain.record_count(&LineCount::new(gain.line_id, dec!(12)));
        let mut loss = StocktakeLine::snapshot(GoodsId::new(), dec!(10), dec!(3));
        loss.record_count(&LineCount::new(loss.line_id, dec!(7)));
        let uncounted = StocktakeLine::snapshot(GoodsId::new(), dec!(4), dec!(1));
        let lines = vec![gain, loss, uncounted];

        let summary = StocktakeSummary::from_lines(&lines);
        assert_eq!(
            summary,
            StocktakeSummary {
                total_items: 3,
                completed_items: 2,
                difference_items: 2,
                gain_items: 1,
                loss_items: 1,
                normal_items: 1,
            }
        );

        let report = StocktakeReport::from_lines(&lines);
        assert_eq!(report.total_book_amount, dec!(54));
        assert_eq!(report.total_actual_amount, dec!(45));
        assert_eq!(report.gain_amount, dec!(4));
        assert_eq!(report.loss_amount, dec!(9));
        assert_eq!(report.normal_lines.len(), 1);
    }
}
