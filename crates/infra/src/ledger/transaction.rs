use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

use depot_core::{Aggregate, DomainError, DomainResult, InventoryId};
use depot_inventory::{
    InventoryKey, InventoryRecord, Issue, LedgerCommand, Lock, MovementContext, MovementFact,
    Receive, SetAbsolute, Unlock,
};

use crate::master_data::{Lookup, MasterData};

/// Quantity and cost basis of an inbound movement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    pub production_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
}

impl Receipt {
    pub fn new(quantity: Decimal, unit_cost: Decimal) -> Self {
        Self {
            quantity,
            unit_cost,
            production_date: None,
            expiry_date: None,
        }
    }

    pub fn with_dates(mut self, production: Option<NaiveDate>, expiry: Option<NaiveDate>) -> Self {
        self.production_date = production;
        self.expiry_date = expiry;
        self
    }
}

/// Staged view of the rows locked by one ledger transaction.
///
/// Every movement runs against a private copy of its row. Nothing becomes
/// visible to other callers until the transaction body returns `Ok`; an
/// error anywhere discards every staged change and every pending fact.
pub struct LedgerTxn<'a, M: ?Sized> {
    pub(super) staged: BTreeMap<InventoryKey, InventoryRecord>,
    pub(super) facts: Vec<MovementFact>,
    pub(super) master_data: &'a M,
    pub(super) context: &'a MovementContext,
    pub(super) now: DateTime<Utc>,
}

impl<'a, M> LedgerTxn<'a, M>
where
    M: MasterData + ?Sized,
{
    pub(super) fn new(
        rows: impl IntoIterator<Item = (InventoryKey, Option<InventoryRecord>)>,
        master_data: &'a M,
        context: &'a MovementContext,
        now: DateTime<Utc>,
    ) -> Self {
        let staged = rows
            .into_iter()
            .map(|(key, row)| {
                let record = row.unwrap_or_else(|| InventoryRecord::empty(InventoryId::new(), key));
                (key, record)
            })
            .collect();

        Self {
            staged,
            facts: Vec::new(),
            master_data,
            context,
            now,
        }
    }

    /// Current staged state of a row; `None` if it has never held stock.
    pub fn record(&self, key: InventoryKey) -> Option<&InventoryRecord> {
        self.staged.get(&key).filter(|r| r.exists())
    }

    /// Receive stock, creating the row on first use.
    pub fn inbound(&mut self, key: InventoryKey, receipt: &Receipt) -> DomainResult<InventoryRecord> {
        self.ensure_catalogued(key)?;
        self.run(
            key,
            LedgerCommand::Receive(Receive {
                quantity: receipt.quantity,
                unit_cost: receipt.unit_cost,
                production_date: receipt.production_date,
                expiry_date: receipt.expiry_date,
                occurred_at: self.now,
            }),
        )
    }

    pub fn outbound(&mut self, key: InventoryKey, quantity: Decimal) -> DomainResult<InventoryRecord> {
        let occurred_at = self.now;
        self.run(key, LedgerCommand::Issue(Issue { quantity, occurred_at }))
    }

    pub fn lock(&mut self, key: InventoryKey, quantity: Decimal) -> DomainResult<InventoryRecord> {
        let occurred_at = self.now;
        self.run(key, LedgerCommand::Lock(Lock { quantity, occurred_at }))
    }

    pub fn unlock(&mut self, key: InventoryKey, quantity: Decimal) -> DomainResult<InventoryRecord> {
        let occurred_at = self.now;
        self.run(key, LedgerCommand::Unlock(Unlock { quantity, occurred_at }))
    }

    /// Overwrite on-hand quantity, keeping locked stock intact.
    ///
    /// Cost fields only move when `unit_cost` is given.
    pub fn set_absolute(
        &mut self,
        key: InventoryKey,
        quantity: Decimal,
        unit_cost: Option<Decimal>,
    ) -> DomainResult<InventoryRecord> {
        self.ensure_catalogued(key)?;
        let occurred_at = self.now;
        self.run(
            key,
            LedgerCommand::SetAbsolute(SetAbsolute {
                quantity,
                unit_cost,
                occurred_at,
            }),
        )
    }

    fn ensure_catalogued(&self, key: InventoryKey) -> DomainResult<()> {
        if matches!(self.master_data.warehouse(key.warehouse_id), Lookup::NotFound) {
            return Err(DomainError::not_found(format!("warehouse {}", key.warehouse_id)));
        }
        if matches!(self.master_data.goods(key.goods_id), Lookup::NotFound) {
            return Err(DomainError::not_found(format!("goods {}", key.goods_id)));
        }
        Ok(())
    }

    fn run(&mut self, key: InventoryKey, command: LedgerCommand) -> DomainResult<InventoryRecord> {
        let record = self.staged.get_mut(&key).ok_or_else(|| {
            DomainError::invalid_state(format!("row {key} is not part of this ledger transaction"))
        })?;

        // Decide first: a rejected command leaves the staged row untouched.
        let events = record.handle(&command)?;
        for event in &events {
            let before = record.levels();
            record.apply(event);
            let fact = MovementFact::from_applied(before, record, event, self.context);
            tracing::debug!(
                inventory_id = %fact.inventory_id,
                key = %key,
                kind = fact.kind.as_str(),
                quantity = %fact.quantity,
                "staged ledger movement"
            );
            self.facts.push(fact);
        }

        Ok(record.clone())
    }
}
