use serde::{Deserialize, Serialize};

/// The four document kinds that move or reconcile stock.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderKind {
    Inbound,
    Outbound,
    Transfer,
    Stocktake,
}

impl OrderKind {
    pub const ALL: [OrderKind; 4] = [
        OrderKind::Inbound,
        OrderKind::Outbound,
        OrderKind::Transfer,
        OrderKind::Stocktake,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderKind::Inbound => "INBOUND",
            OrderKind::Outbound => "OUTBOUND",
            OrderKind::Transfer => "TRANSFER",
            OrderKind::Stocktake => "STOCKTAKE",
        }
    }

    pub fn default_prefix(&self) -> &'static str {
        match self {
            OrderKind::Inbound => "IN",
            OrderKind::Outbound => "OUT",
            OrderKind::Transfer => "TR",
            OrderKind::Stocktake => "PD",
        }
    }

    /// Whether reaching APPROVED reserves the lines' stock on the ledger.
    pub fn locks_on_approval(&self) -> bool {
        matches!(self, OrderKind::Outbound | OrderKind::Transfer)
    }

    /// Whether creation and edits pre-check available stock.
    pub fn draws_stock(&self) -> bool {
        self.locks_on_approval()
    }
}

impl core::fmt::Display for OrderKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BusinessType {
    PurchaseIn,
    ReturnIn,
    TransferIn,
    InventoryGain,
    OtherIn,
    SaleOut,
    TransferOut,
    InventoryLoss,
    DamageOut,
    OtherOut,
    WarehouseTransfer,
    RegularCheck,
    SpotCheck,
    AnnualCheck,
}

impl BusinessType {
    /// The order kind this business type belongs to.
    pub fn kind(&self) -> OrderKind {
        match self {
            BusinessType::PurchaseIn
            | BusinessType::ReturnIn
            | BusinessType::TransferIn
            | BusinessType::InventoryGain
            | BusinessType::OtherIn => OrderKind::Inbound,
            BusinessType::SaleOut
            | BusinessType::TransferOut
            | BusinessType::InventoryLoss
            | BusinessType::DamageOut
            | BusinessType::OtherOut => OrderKind::Outbound,
            BusinessType::WarehouseTransfer => OrderKind::Transfer,
            BusinessType::RegularCheck | BusinessType::SpotCheck | BusinessType::AnnualCheck => {
                OrderKind::Stocktake
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BusinessType::PurchaseIn => "PURCHASE_IN",
            BusinessType::ReturnIn => "RETURN_IN",
            BusinessType::TransferIn => "TRANSFER_IN",
            BusinessType::InventoryGain => "INVENTORY_GAIN",
            BusinessType::OtherIn => "OTHER_IN",
            BusinessType::SaleOut => "SALE_OUT",
            BusinessType::TransferOut => "TRANSFER_OUT",
            BusinessType::InventoryLoss => "INVENTORY_LOSS",
            BusinessType::DamageOut => "DAMAGE_OUT",
            BusinessType::OtherOut => "OTHER_OUT",
            BusinessType::WarehouseTransfer => "WAREHOUSE_TRANSFER",
            BusinessType::RegularCheck => "REGULAR_CHECK",
            BusinessType::SpotCheck => "SPOT_CHECK",
            BusinessType::AnnualCheck => "ANNUAL_CHECK",
        }
    }
}

impl core::fmt::Display for BusinessType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StocktakeType {
    #[default]
    Full,
    Partial,
    Cycle,
    Dynamic,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferPriority {
    #[default]
    Normal,
    Urgent,
    Critical,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_legs_belong_to_their_own_kinds() {
        assert_eq!(BusinessType::TransferOut.kind(), OrderKind::Outbound);
        assert_eq!(BusinessType::TransferIn.kind(), OrderKind::Inbound);
        assert_eq!(BusinessType::WarehouseTransfer.kind(), OrderKind::Transfer);
    }

    #[test]
    fn only_stock_drawing_kinds_lock() {
        let locking: Vec<OrderKind> = OrderKind::ALL
            .into_iter()
            .filter(OrderKind::locks_on_approval)
            .collect();
        assert_eq!(locking, vec![OrderKind::Outbound, OrderKind::Transfer]);
    }
}
