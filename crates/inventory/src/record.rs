use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use depot_core::{
    Aggregate, AggregateRoot, DomainError, GoodsId, InventoryId, WarehouseId,
};
use depot_events::Event;

/// Decimal places kept on the weighted-average cost.
pub const COST_SCALE: u32 = 4;

/// Unique ledger key: one record per (warehouse, goods).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InventoryKey {
    pub warehouse_id: WarehouseId,
    pub goods_id: GoodsId,
}

impl InventoryKey {
    pub fn new(warehouse_id: WarehouseId, goods_id: GoodsId) -> Self {
        Self {
            warehouse_id,
            goods_id,
        }
    }
}

impl core::fmt::Display for InventoryKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "warehouse {} / goods {}", self.warehouse_id, self.goods_id)
    }
}

/// The three quantity buckets of a row.
///
/// `quantity == available_quantity + locked_quantity`, all non-negative.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevels {
    pub quantity: Decimal,
    pub available_quantity: Decimal,
    pub locked_quantity: Decimal,
}

impl StockLevels {
    pub fn is_consistent(&self) -> bool {
        self.quantity == self.available_quantity + self.locked_quantity
            && self.quantity >= Decimal::ZERO
            && self.available_quantity >= Decimal::ZERO
            && self.locked_quantity >= Decimal::ZERO
    }
}

/// Aggregate root: one ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    id: InventoryId,
    key: InventoryKey,
    levels: StockLevels,
    average_cost: Decimal,
    latest_cost: Decimal,
    production_date: Option<NaiveDate>,
    expiry_date: Option<NaiveDate>,
    last_inbound_at: Option<DateTime<Utc>>,
    last_outbound_at: Option<DateTime<Utc>>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    version: u64,
}

impl InventoryRecord {
    /// Zero-valued row for a key that has never moved.
    pub fn empty(id: InventoryId, key: InventoryKey) -> Self {
        Self {
            id,
            key,
            levels: StockLevels::default(),
            average_cost: Decimal::ZERO,
            latest_cost: Decimal::ZERO,
            production_date: None,
            expiry_date: None,
            last_inbound_at: None,
            last_outbound_at: None,
            created_at: None,
            updated_at: None,
            version: 0,
        }
    }

    pub fn id_typed(&self) -> InventoryId {
        self.id
    }

    pub fn key(&self) -> InventoryKey {
        self.key
    }

    pub fn levels(&self) -> StockLevels {
        self.levels
    }

    pub fn quantity(&self) -> Decimal {
        self.levels.quantity
    }

    pub fn available_quantity(&self) -> Decimal {
        self.levels.available_quantity
    }

    pub fn locked_quantity(&self) -> Decimal {
        self.levels.locked_quantity
    }

    pub fn average_cost(&self) -> Decimal {
        self.average_cost
    }

    pub fn latest_cost(&self) -> Decimal {
        self.latest_cost
    }

    pub fn production_date(&self) -> Option<NaiveDate> {
        self.production_date
    }

    pub fn expiry_date(&self) -> Option<NaiveDate> {
        self.expiry_date
    }

    pub fn last_inbound_at(&self) -> Option<DateTime<Utc>> {
        self.last_inbound_at
    }

    pub fn last_outbound_at(&self) -> Option<DateTime<Utc>> {
        self.last_outbound_at
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// Whether any movement has ever been applied to this row.
    pub fn exists(&self) -> bool {
        self.version > 0
    }

    /// Stock value at average cost.
    pub fn stock_value(&self) -> Decimal {
        self.levels.quantity * self.average_cost
    }
}

impl AggregateRoot for InventoryRecord {
    type Id = InventoryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: Receive (inbound movement).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receive {
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    pub production_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Issue (outbound movement).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub quantity: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Lock (reserve available stock).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
    pub quantity: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Unlock (release reserved stock).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unlock {
    pub quantity: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetAbsolute (manual correction, stocktake adjustment).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetAbsolute {
    pub quantity: Decimal,
    /// When present, replaces both average and latest cost.
    pub unit_cost: Option<Decimal>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerCommand {
    Receive(Receive),
    Issue(Issue),
    Lock(Lock),
    Unlock(Unlock),
    SetAbsolute(SetAbsolute),
}

/// Event: StockReceived.
///
/// Carries the already-computed average cost so replay never re-rounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReceived {
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    pub average_cost: Decimal,
    pub production_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockIssued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockIssued {
    pub quantity: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockLocked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLocked {
    pub quantity: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockUnlocked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockUnlocked {
    pub quantity: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockReset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReset {
    pub quantity: Decimal,
    pub available_quantity: Decimal,
    pub unit_cost: Option<Decimal>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    StockReceived(StockReceived),
    StockIssued(StockIssued),
    StockLocked(StockLocked),
    StockUnlocked(StockUnlocked),
    StockReset(StockReset),
}

impl Event for LedgerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::StockReceived(_) => "inventory.stock.received",
            LedgerEvent::StockIssued(_) => "inventory.stock.issued",
            LedgerEvent::StockLocked(_) => "inventory.stock.locked",
            LedgerEvent::StockUnlocked(_) => "inventory.stock.unlocked",
            LedgerEvent::StockReset(_) => "inventory.stock.reset",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LedgerEvent::StockReceived(e) => e.occurred_at,
            LedgerEvent::StockIssued(e) => e.occurred_at,
            LedgerEvent::StockLocked(e) => e.occurred_at,
            LedgerEvent::StockUnlocked(e) => e.occurred_at,
            LedgerEvent::StockReset(e) => e.occurred_at,
        }
    }
}

impl Aggregate for InventoryRecord {
    type Command = LedgerCommand;
    type Event = LedgerEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            LedgerEvent::StockReceived(e) => {
                self.levels.quantity += e.quantity;
                self.levels.available_quantity += e.quantity;
                self.average_cost = e.average_cost;
                self.latest_cost = e.unit_cost;
                if e.production_date.is_some() {
                    self.production_date = e.production_date;
                }
                if e.expiry_date.is_some() {
                    self.expiry_date = e.expiry_date;
                }
                self.last_inbound_at = Some(e.occurred_at);
            }
            LedgerEvent::StockIssued(e) => {
                self.levels.quantity -= e.quantity;
                self.levels.available_quantity -= e.quantity;
                self.last_outbound_at = Some(e.occurred_at);
            }
            LedgerEvent::StockLocked(e) => {
                self.levels.available_quantity -= e.quantity;
                self.levels.locked_quantity += e.quantity;
            }
            LedgerEvent::StockUnlocked(e) => {
                self.levels.locked_quantity -= e.quantity;
                self.levels.available_quantity += e.quantity;
            }
            LedgerEvent::StockReset(e) => {
                self.levels.quantity = e.quantity;
                self.levels.available_quantity = e.available_quantity;
                if let Some(cost) = e.unit_cost {
                    self.average_cost = cost;
                    self.latest_cost = cost;
                }
            }
        }

        let at = event.occurred_at();
        self.created_at.get_or_insert(at);
        self.updated_at = Some(at);
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            LedgerCommand::Receive(cmd) => self.handle_receive(cmd),
            LedgerCommand::Issue(cmd) => self.handle_issue(cmd),
            LedgerCommand::Lock(cmd) => self.handle_lock(cmd),
            LedgerCommand::Unlock(cmd) => self.handle_unlock(cmd),
            LedgerCommand::SetAbsolute(cmd) => self.handle_set_absolute(cmd),
        }
    }
}

fn ensure_positive(quantity: Decimal) -> Result<(), DomainError> {
    if quantity <= Decimal::ZERO {
        return Err(DomainError::validation(format!(
            "quantity must be positive, got {quantity}"
        )));
    }
    Ok(())
}

fn ensure_cost(cost: Decimal) -> Result<(), DomainError> {
    if cost < Decimal::ZERO {
        return Err(DomainError::validation(format!(
            "unit cost must not be negative, got {cost}"
        )));
    }
    Ok(())
}

impl InventoryRecord {
    fn shortage(&self, requested: Decimal) -> DomainError {
        DomainError::insufficient_stock(
            self.key.warehouse_id,
            self.key.goods_id,
            requested,
            self.levels.available_quantity,
        )
    }

    /// Quantity-weighted blend of the current and incoming unit cost.
    fn blended_cost(&self, quantity: Decimal, unit_cost: Decimal) -> Decimal {
        let total = self.levels.quantity + quantity;
        if total.is_zero() {
            return Decimal::ZERO;
        }
        let value = self.levels.quantity * self.average_cost + quantity * unit_cost;
        (value / total).round_dp_with_strategy(COST_SCALE, RoundingStrategy::MidpointAwayFromZero)
    }

    fn handle_receive(&self, cmd: &Receive) -> Result<Vec<LedgerEvent>, DomainError> {
        ensure_positive(cmd.quantity)?;
        ensure_cost(cmd.unit_cost)?;

        Ok(vec![LedgerEvent::StockReceived(StockReceived {
            quantity: cmd.quantity,
            unit_cost: cmd.unit_cost,
            average_cost: self.blended_cost(cmd.quantity, cmd.unit_cost),
            production_date: cmd.production_date,
            expiry_date: cmd.expiry_date,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_issue(&self, cmd: &Issue) -> Result<Vec<LedgerEvent>, DomainError> {
        ensure_positive(cmd.quantity)?;
        if self.levels.available_quantity < cmd.quantity {
            return Err(self.shortage(cmd.quantity));
        }

        Ok(vec![LedgerEvent::StockIssued(StockIssued {
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_lock(&self, cmd: &Lock) -> Result<Vec<LedgerEvent>, DomainError> {
        ensure_positive(cmd.quantity)?;
        if self.levels.available_quantity < cmd.quantity {
            return Err(self.shortage(cmd.quantity));
        }

        Ok(vec![LedgerEvent::StockLocked(StockLocked {
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_unlock(&self, cmd: &Unlock) -> Result<Vec<LedgerEvent>, DomainError> {
        ensure_positive(cmd.quantity)?;
        if self.levels.locked_quantity < cmd.quantity {
            return Err(DomainError::invalid_state(format!(
                "{}: cannot unlock {}, only {} locked",
                self.key, cmd.quantity, self.levels.locked_quantity
            )));
        }

        Ok(vec![LedgerEvent::StockUnlocked(StockUnlocked {
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_absolute(&self, cmd: &SetAbsolute) -> Result<Vec<LedgerEvent>, DomainError> {
        if cmd.quantity < Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "quantity must not be negative, got {}",
                cmd.quantity
            )));
        }
        if let Some(cost) = cmd.unit_cost {
            ensure_cost(cost)?;
        }

        let available = cmd.quantity - self.levels.locked_quantity;
        if available < Decimal::ZERO {
            return Err(DomainError::invalid_state(format!(
                "{}: cannot set quantity to {} while {} is locked",
                self.key, cmd.quantity, self.levels.locked_quantity
            )));
        }

        Ok(vec![LedgerEvent::StockReset(StockReset {
            quantity: cmd.quantity,
            available_quantity: available,
            unit_cost: cmd.unit_cost,
            occurred_at: cmd.occurred_at,
        })])
    }
}
