//! The inventory ledger service.
//!
//! One slot per (warehouse, goods) key, each behind its own mutex. Every
//! mutation runs inside [`InventoryLedger::transaction`], which locks the keys
//! it names in sorted order, stages the changes on copies and writes them back
//! only when the whole body succeeds. Callers on different keys never share a
//! lock; callers on the same key serialise on its slot.

mod transaction;

pub use transaction::{LedgerTxn, Receipt};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use uuid::Uuid;

use depot_core::{
    Clock, DomainError, DomainResult, GoodsId, InventoryId, SystemClock, WarehouseId,
};
use depot_inventory::{
    ClassificationRules, InventoryKey, InventoryRecord, MovementContext, MovementFact, StockStatus,
    StockThresholds,
};

use crate::audit::AuditSink;
use crate::master_data::{Lookup, MasterData};

type Slot = Arc<Mutex<Option<InventoryRecord>>>;

/// A row whose classification needs someone's attention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockAlert {
    pub record: InventoryRecord,
    pub status: StockStatus,
}

pub struct InventoryLedger<M, A> {
    rows: RwLock<HashMap<InventoryKey, Slot>>,
    ids: RwLock<HashMap<InventoryId, InventoryKey>>,
    master_data: M,
    audit: A,
    rules: ClassificationRules,
    clock: Arc<dyn Clock>,
}

impl<M, A> core::fmt::Debug for InventoryLedger<M, A> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InventoryLedger")
            .field("rules", &self.rules)
            .finish_non_exhaustive()
    }
}

impl<M, A> InventoryLedger<M, A>
where
    M: MasterData,
    A: AuditSink,
{
    pub fn new(master_data: M, audit: A) -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
            ids: RwLock::new(HashMap::new()),
            master_data,
            audit,
            rules: ClassificationRules::default(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_rules(mut self, rules: ClassificationRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn master_data(&self) -> &M {
        &self.master_data
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn rules(&self) -> &ClassificationRules {
        &self.rules
    }

    /// Run `body` atomically against the rows for `keys`.
    ///
    /// Rows are locked in key order, so two transactions over overlapping
    /// key sets cannot deadlock. Movement facts go to the audit sink after
    /// the write-back and before the rows are released; sink failures are
    /// logged and otherwise ignored. `body` must not open another ledger
    /// transaction.
    pub fn transaction<T>(
        &self,
        keys: &[InventoryKey],
        context: &MovementContext,
        body: impl FnOnce(&mut LedgerTxn<'_, M>) -> DomainResult<T>,
    ) -> DomainResult<T> {
        let mut keys = keys.to_vec();
        keys.sort();
        keys.dedup();

        let slots: Vec<Slot> = keys.iter().map(|key| self.slot(*key)).collect();
        let mut guards: Vec<MutexGuard<'_, Option<InventoryRecord>>> = slots
            .iter()
            .map(|slot| slot.lock().unwrap_or_else(PoisonError::into_inner))
            .collect();

        let mut txn = LedgerTxn::new(
            keys.iter().copied().zip(guards.iter().map(|g| (**g).clone())),
            &self.master_data,
            context,
            self.clock.now(),
        );
        let output = body(&mut txn)?;

        let LedgerTxn { mut staged, facts, .. } = txn;
        let mut created = Vec::new();
        for (key, guard) in keys.iter().zip(guards.iter_mut()) {
            let Some(record) = staged.remove(key) else {
                continue;
            };
            if !record.exists() {
                continue;
            }
            if guard.is_none() {
                created.push((record.id_typed(), *key));
            }
            **guard = Some(record);
        }
        if !created.is_empty() {
            self.ids
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .extend(created);
        }

        self.publish(&facts);
        drop(guards);

        Ok(output)
    }

    fn publish(&self, facts: &[MovementFact]) {
        for fact in facts {
            tracing::debug!(
                inventory_id = %fact.inventory_id,
                sequence = fact.sequence,
                "{}",
                fact.describe()
            );
            if let Err(error) = self.audit.record(fact) {
                tracing::warn!(
                    inventory_id = %fact.inventory_id,
                    sequence = fact.sequence,
                    %error,
                    "movement fact not recorded"
                );
            }
        }
    }

    fn slot(&self, key: InventoryKey) -> Slot {
        if let Some(slot) = self
            .rows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Arc::clone(slot);
        }
        let mut rows = self.rows.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(rows.entry(key).or_default())
    }

    fn key_of(&self, inventory_id: InventoryId) -> DomainResult<InventoryKey> {
        self.ids
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&inventory_id)
            .copied()
            .ok_or_else(|| DomainError::not_found(format!("inventory record {inventory_id}")))
    }

    pub fn inbound(
        &self,
        key: InventoryKey,
        receipt: &Receipt,
        context: &MovementContext,
    ) -> DomainResult<InventoryRecord> {
        self.transaction(&[key], context, |txn| txn.inbound(key, receipt))
    }

    pub fn outbound(
        &self,
        key: InventoryKey,
        quantity: Decimal,
        context: &MovementContext,
    ) -> DomainResult<InventoryRecord> {
        self.transaction(&[key], context, |txn| txn.outbound(key, quantity))
    }

    pub fn lock(
        &self,
        inventory_id: InventoryId,
        quantity: Decimal,
        context: &MovementContext,
    ) -> DomainResult<InventoryRecord> {
        let key = self.key_of(inventory_id)?;
        self.transaction(&[key], context, |txn| txn.lock(key, quantity))
    }

    pub fn unlock(
        &self,
        inventory_id: InventoryId,
        quantity: Decimal,
        context: &MovementContext,
    ) -> DomainResult<InventoryRecord> {
        let key = self.key_of(inventory_id)?;
        self.transaction(&[key], context, |txn| txn.unlock(key, quantity))
    }

    /// Manual correction to an absolute on-hand quantity.
    pub fn adjust_absolute(
        &self,
        key: InventoryKey,
        quantity: Decimal,
        unit_cost: Option<Decimal>,
        context: &MovementContext,
    ) -> DomainResult<InventoryRecord> {
        self.transaction(&[key], context, |txn| txn.set_absolute(key, quantity, unit_cost))
    }

    /// Manual correction by a signed delta.
    ///
    /// A gain is received at `unit_cost`, or at the current average cost when
    /// none is given; a loss is issued from available stock.
    pub fn adjust_delta(
        &self,
        key: InventoryKey,
        delta: Decimal,
        unit_cost: Option<Decimal>,
        context: &MovementContext,
    ) -> DomainResult<InventoryRecord> {
        if delta.is_zero() {
            return Err(DomainError::validation("adjustment delta must not be zero"));
        }
        self.transaction(&[key], context, |txn| {
            if delta > Decimal::ZERO {
                let cost = unit_cost
                    .or_else(|| txn.record(key).map(InventoryRecord::average_cost))
                    .unwrap_or(Decimal::ZERO);
                txn.inbound(key, &Receipt::new(delta, cost))
            } else {
                txn.outbound(key, -delta)
            }
        })
    }

    /// The row for `key`, or a zero-valued record when nothing was ever stocked.
    pub fn get(&self, key: InventoryKey) -> InventoryRecord {
        self.find(key)
            .unwrap_or_else(|| InventoryRecord::empty(InventoryId::from_uuid(Uuid::nil()), key))
    }

    pub fn find(&self, key: InventoryKey) -> Option<InventoryRecord> {
        let slot = self
            .rows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()?;
        let row = slot.lock().unwrap_or_else(PoisonError::into_inner).clone();
        row
    }

    pub fn get_by_id(&self, inventory_id: InventoryId) -> DomainResult<InventoryRecord> {
        let key = self.key_of(inventory_id)?;
        self.find(key)
            .ok_or_else(|| DomainError::not_found(format!("inventory record {inventory_id}")))
    }

    /// Every row ever stocked, zero-quantity rows included, by key.
    pub fn list_all(&self) -> Vec<InventoryRecord> {
        self.snapshot(|_| true)
    }

    pub fn list_by_warehouse(&self, warehouse_id: WarehouseId) -> Vec<InventoryRecord> {
        self.snapshot(|key| key.warehouse_id == warehouse_id)
    }

    pub fn list_with_stock(&self, warehouse_id: WarehouseId) -> Vec<InventoryRecord> {
        self.list_by_warehouse(warehouse_id)
            .into_iter()
            .filter(|r| r.quantity() > Decimal::ZERO)
            .collect()
    }

    /// Rows of one goods across warehouses.
    pub fn list_by_goods(&self, goods_id: GoodsId) -> Vec<InventoryRecord> {
        self.snapshot(|key| key.goods_id == goods_id)
    }

    /// Stocked rows expiring on or before `today + days`, soonest first.
    /// Already expired rows are included.
    pub fn list_near_expiry(&self, today: NaiveDate, days: u64) -> Vec<InventoryRecord> {
        let horizon = today
            .checked_add_days(Days::new(days))
            .unwrap_or(NaiveDate::MAX);
        self.by_expiry(|expiry| expiry <= horizon)
    }

    /// Stocked rows whose expiry date is before `today`, soonest first.
    pub fn list_expired(&self, today: NaiveDate) -> Vec<InventoryRecord> {
        self.by_expiry(|expiry| expiry < today)
    }

    pub fn list_with_locked_stock(&self) -> Vec<InventoryRecord> {
        self.snapshot(|_| true)
            .into_iter()
            .filter(|r| r.locked_quantity() > Decimal::ZERO)
            .collect()
    }

    /// Advisory only: the answer may be stale by the time the caller acts.
    /// Movements re-check availability under the row lock.
    pub fn check_stock_available(&self, key: InventoryKey, quantity: Decimal) -> bool {
        self.find(key)
            .is_some_and(|r| r.available_quantity() >= quantity)
    }

    pub fn status(&self, key: InventoryKey, today: NaiveDate) -> StockStatus {
        let record = self.get(key);
        self.rules
            .classify(&record, &self.thresholds(key.goods_id), today)
    }

    /// Rows that are zero, high, low, expired or close to expiry.
    pub fn alerts(&self, today: NaiveDate) -> Vec<StockAlert> {
        self.list_all()
            .into_iter()
            .filter_map(|record| {
                let thresholds = self.thresholds(record.key().goods_id);
                let status = self.rules.classify(&record, &thresholds, today);
                status
                    .needs_attention()
                    .then_some(StockAlert { record, status })
            })
            .collect()
    }

    fn thresholds(&self, goods_id: GoodsId) -> StockThresholds {
        match self.master_data.goods(goods_id) {
            Lookup::Found(info) | Lookup::Disabled(info) => info.thresholds,
            Lookup::NotFound => StockThresholds::default(),
        }
    }

    fn by_expiry(&self, include: impl Fn(NaiveDate) -> bool) -> Vec<InventoryRecord> {
        let mut rows: Vec<InventoryRecord> = self
            .snapshot(|_| true)
            .into_iter()
            .filter(|r| r.quantity() > Decimal::ZERO && r.expiry_date().is_some_and(&include))
            .collect();
        rows.sort_by_key(|r| (r.expiry_date(), r.key()));
        rows
    }

    fn snapshot(&self, include: impl Fn(&InventoryKey) -> bool) -> Vec<InventoryRecord> {
        let mut slots: Vec<(InventoryKey, Slot)> = self
            .rows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(key, _)| include(key))
            .map(|(key, slot)| (*key, Arc::clone(slot)))
            .collect();
        slots.sort_by_key(|(key, _)| *key);

        slots
            .into_iter()
            .filter_map(|(_, slot)| slot.lock().unwrap_or_else(PoisonError::into_inner).clone())
            .collect()
    }
}
