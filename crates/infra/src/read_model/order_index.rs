use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use depot_core::{AggregateRoot, DomainError, DomainResult, OrderId, WarehouseId};
use depot_orders::{
    BusinessType, Order, OrderKind, OrderNumber, OrderStatus, OrderTotals, Route, next_number,
};

use crate::command_dispatcher::{DispatchError, apply_history};
use crate::event_store::EventStore;
use crate::read_model::{InMemoryKeyedStore, KeyedStore};

/// Queryable header-level view of one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSummary {
    pub id: OrderId,
    pub number: OrderNumber,
    pub kind: OrderKind,
    pub status: OrderStatus,
    pub business_type: BusinessType,
    pub route: Route,
    pub reference_number: Option<String>,
    pub planned_date: Option<NaiveDate>,
    pub totals: OrderTotals,
    pub created_at: Option<DateTime<Utc>>,
    pub operation_time: Option<DateTime<Utc>>,
    pub deleted: bool,
    pub version: u64,
}

impl OrderSummary {
    /// `None` for an aggregate that was never created.
    pub fn of(order: &Order) -> Option<Self> {
        let header = order.header()?;
        Some(Self {
            id: order.id_typed(),
            number: order.number()?.clone(),
            kind: order.kind(),
            status: order.status(),
            business_type: header.business_type,
            route: header.route,
            reference_number: header.reference_number.clone(),
            planned_date: header.planned_date,
            totals: order.totals(),
            created_at: order.created_at(),
            operation_time: order.operation_time(),
            deleted: order.is_deleted(),
            version: order.version(),
        })
    }
}

/// Order lookup index plus the order-number registry.
///
/// Numbers are handed out under the registry's write lock, so two concurrent
/// creators never receive the same one. A number stays taken after a soft
/// delete.
#[derive(Debug)]
pub struct OrderIndex<S = InMemoryKeyedStore<OrderId, OrderSummary>> {
    summaries: S,
    numbers: RwLock<BTreeMap<OrderNumber, Option<OrderId>>>,
}

fn number_is_free(
    numbers: &BTreeMap<OrderNumber, Option<OrderId>>,
    number: &OrderNumber,
    id: OrderId,
) -> DomainResult<()> {
    match numbers.get(number) {
        Some(Some(owner)) if *owner != id => Err(DomainError::conflict(format!(
            "order number {number} is already used by order {owner}"
        ))),
        _ => Ok(()),
    }
}

impl Default for OrderIndex {
    fn default() -> Self {
        Self::new(InMemoryKeyedStore::new())
    }
}

impl<S> OrderIndex<S>
where
    S: KeyedStore<OrderId, OrderSummary>,
{
    pub fn new(summaries: S) -> Self {
        Self {
            summaries,
            numbers: RwLock::new(BTreeMap::new()),
        }
    }

    /// Next free `{prefix}{date}{seq}` number, held until recorded or released.
    pub fn reserve_number(&self, prefix: &str, date: NaiveDate) -> OrderNumber {
        let mut numbers = self.numbers.write().unwrap_or_else(PoisonError::into_inner);
        let number = next_number(prefix, date, numbers.keys());
        numbers.insert(number.clone(), None);
        number
    }

    /// Give back a reservation whose order was never created.
    pub fn release_number(&self, number: &OrderNumber) {
        let mut numbers = self.numbers.write().unwrap_or_else(PoisonError::into_inner);
        if matches!(numbers.get(number), Some(None)) {
            numbers.remove(number);
        }
    }

    /// Upsert the summary for `order`.
    ///
    /// Fails with `Conflict` if its number already belongs to another order.
    pub fn record(&self, order: &Order) -> DomainResult<()> {
        let Some(summary) = OrderSummary::of(order) else {
            return Ok(());
        };

        {
            let mut numbers = self.numbers.write().unwrap_or_else(PoisonError::into_inner);
            number_is_free(&numbers, &summary.number, summary.id)?;
            numbers.insert(summary.number.clone(), Some(summary.id));
        }

        self.summaries.upsert(summary.id, summary);
        Ok(())
    }

    /// `Conflict` if `order`'s number belongs to a different order. Run
    /// before appending, so a clash never leaves a persisted event behind.
    pub fn check_number(&self, order: &Order) -> DomainResult<()> {
        let Some(number) = order.number() else {
            return Ok(());
        };
        let numbers = self.numbers.read().unwrap_or_else(PoisonError::into_inner);
        number_is_free(&numbers, number, order.id_typed())
    }

    pub fn get(&self, id: OrderId) -> Option<OrderSummary> {
        self.summaries.get(&id).filter(|s| !s.deleted)
    }

    pub fn find_by_number(&self, number: &str) -> Option<OrderSummary> {
        let id = self
            .numbers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&OrderNumber::from_string(number))
            .copied()
            .flatten()?;
        self.get(id)
    }

    pub fn list_by_status(&self, status: OrderStatus) -> Vec<OrderSummary> {
        self.select(|s| s.status == status)
    }

    pub fn list_by_kind(&self, kind: OrderKind) -> Vec<OrderSummary> {
        self.select(|s| s.kind == kind)
    }

    /// Orders whose reference number is `reference`, e.g. the documents
    /// synthesized from a transfer.
    pub fn list_by_reference(&self, reference: &str) -> Vec<OrderSummary> {
        self.select(|s| s.reference_number.as_deref() == Some(reference))
    }

    /// Orders of `kind` that move stock in or out of `warehouse_id`, on
    /// either side of a transfer.
    pub fn list_by_warehouse(&self, kind: OrderKind, warehouse_id: WarehouseId) -> Vec<OrderSummary> {
        self.select(|s| s.kind == kind && s.route.warehouses().contains(&warehouse_id))
    }

    pub fn list_by_source_warehouse(&self, warehouse_id: WarehouseId) -> Vec<OrderSummary> {
        self.select(|s| matches!(s.route, Route::Transfer { source, .. } if source == warehouse_id))
    }

    pub fn list_by_target_warehouse(&self, warehouse_id: WarehouseId) -> Vec<OrderSummary> {
        self.select(|s| matches!(s.route, Route::Transfer { target, .. } if target == warehouse_id))
    }

    /// Orders of `kind` planned between `from` and `to`, both inclusive.
    pub fn list_by_planned_date(&self, kind: OrderKind, from: NaiveDate, to: NaiveDate) -> Vec<OrderSummary> {
        self.select(|s| {
            s.kind == kind && s.planned_date.is_some_and(|planned| planned >= from && planned <= to)
        })
    }

    /// Orders of `kind` created on `day` (UTC).
    pub fn list_created_on(&self, kind: OrderKind, day: NaiveDate) -> Vec<OrderSummary> {
        self.select(|s| s.kind == kind && s.created_at.is_some_and(|at| at.date_naive() == day))
    }

    pub fn approved_not_executed(&self) -> Vec<OrderSummary> {
        self.select(|s| s.status == OrderStatus::Approved)
    }

    /// Planned before `today` and still open.
    pub fn overdue(&self, today: NaiveDate) -> Vec<OrderSummary> {
        self.select(|s| {
            s.planned_date.is_some_and(|planned| planned < today)
                && matches!(
                    s.status,
                    OrderStatus::Pending | OrderStatus::Approved | OrderStatus::InProgress
                )
        })
    }

    /// Rebuild from every order stream in `store`. Returns the number of
    /// orders indexed.
    pub fn rebuild<E: EventStore>(&self, store: &E, aggregate_type: &str) -> Result<usize, DispatchError> {
        self.summaries.clear();
        self.numbers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();

        let mut indexed = 0;
        for stream in store.load_all(aggregate_type)? {
            let Some(first) = stream.first() else {
                continue;
            };
            let mut order = Order::empty(OrderId::from_uuid(*first.aggregate_id.as_uuid()));
            apply_history(&mut order, &stream)?;
            self.record(&order)?;
            indexed += 1;
        }
        Ok(indexed)
    }

    fn select(&self, keep: impl Fn(&OrderSummary) -> bool) -> Vec<OrderSummary> {
        let mut out: Vec<OrderSummary> = self
            .summaries
            .list()
            .into_iter()
            .filter(|s| !s.deleted && keep(s))
            .collect();
        out.sort_by(|a, b| a.number.cmp(&b.number));
        out
    }
}
