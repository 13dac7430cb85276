//! Order execution engine.
//!
//! Top-level orchestrator over the ledger and the order store. Every
//! write to an order happens under that order's mutex. When a step also
//! moves stock, the order append runs inside the ledger transaction, so the
//! rows and the document change together or not at all.

mod stocktake;
mod transfer;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::NaiveDate;
use rust_decimal::Decimal;

use depot_auth::{Actor, RoleResolver};
use depot_core::{DomainError, DomainResult, GoodsId, OrderId, UserId, WarehouseId};
use depot_inventory::{InventoryKey, MovementContext};
use depot_orders::{
    AdvanceApproval, CancelOrder, CreateOrder, Decision, DeleteOrder, LineDraft, MarkExecuted,
    Order, OrderCommand, OrderHeader, OrderKind, OrderLine, OrderOrigin, OrderStatus, ReviseOrder,
    Route, StocktakeLine, TakeSnapshot,
};

use crate::audit::AuditSink;
use crate::config::{DepotConfig, NumberingSettings};
use crate::event_store::EventStore;
use crate::ledger::{InventoryLedger, Receipt};
use crate::master_data::MasterData;
use crate::order_store::OrderStore;
use crate::read_model::OrderSummary;

/// Input for a new order document.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub kind: OrderKind,
    pub header: OrderHeader,
    /// Empty for stocktakes: their lines come from the ledger snapshot.
    pub lines: Vec<LineDraft>,
}

impl NewOrder {
    pub fn new(kind: OrderKind, header: OrderHeader, lines: Vec<LineDraft>) -> Self {
        Self { kind, header, lines }
    }
}

pub struct WarehouseEngine<S, M, A> {
    ledger: InventoryLedger<M, A>,
    orders: OrderStore<S>,
    numbering: NumberingSettings,
}

impl<S, M, A> core::fmt::Debug for WarehouseEngine<S, M, A> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WarehouseEngine")
            .field("numbering", &self.numbering)
            .finish_non_exhaustive()
    }
}

fn hold(lock: &Arc<Mutex<()>>) -> MutexGuard<'_, ()> {
    lock.lock().unwrap_or_else(PoisonError::into_inner)
}

fn movement_context(actor: &Actor, order_number: &str) -> MovementContext {
    MovementContext::new(actor.user_id, actor.name.clone()).with_order(order_number)
}

fn receipt(line: &OrderLine) -> Receipt {
    Receipt::new(line.quantity, line.unit_price).with_dates(line.production_date, line.expiry_date)
}

fn route_of(order: &Order) -> DomainResult<Route> {
    order.route().ok_or_else(|| {
        DomainError::invalid_state(format!("order {} has no header", order.id_typed()))
    })
}

fn keys_for(warehouse_id: WarehouseId, lines: &[OrderLine]) -> Vec<InventoryKey> {
    lines
        .iter()
        .map(|line| InventoryKey::new(warehouse_id, line.goods_id))
        .collect()
}

impl<S, M, A> WarehouseEngine<S, M, A>
where
    S: EventStore,
    M: MasterData,
    A: AuditSink,
{
    /// Open an engine over `store`, indexing the orders it already holds.
    pub fn new(store: S, ledger: InventoryLedger<M, A>) -> DomainResult<Self> {
        Ok(Self {
            ledger,
            orders: OrderStore::open(store)?,
            numbering: NumberingSettings::default(),
        })
    }

    pub fn from_config(config: &DepotConfig, store: S, master_data: M, audit: A) -> DomainResult<Self> {
        let ledger = InventoryLedger::new(master_data, audit).with_rules(config.ledger.rules());
        Ok(Self::new(store, ledger)?.with_numbering(config.numbering.clone()))
    }

    pub fn with_numbering(mut self, numbering: NumberingSettings) -> Self {
        self.numbering = numbering;
        self
    }

    pub fn ledger(&self) -> &InventoryLedger<M, A> {
        &self.ledger
    }

    pub fn orders(&self) -> &OrderStore<S> {
        &self.orders
    }

    #[tracing::instrument(skip_all, fields(kind = %new.kind, actor = %actor.name))]
    pub fn create_order(&self, actor: &Actor, new: NewOrder) -> DomainResult<Order> {
        self.create_document(actor, new, OrderOrigin::Manual)
    }

    /// Shared creation path. Synthesized documents skip the stock pre-check
    /// because their stock already moved.
    pub(crate) fn create_document(
        &self,
        actor: &Actor,
        new: NewOrder,
        origin: OrderOrigin,
    ) -> DomainResult<Order> {
        let NewOrder { kind, header, lines } = new;
        self.check_master_data(&header.route, &lines)?;

        let lines = LineDraft::number_all(lines);
        if origin == OrderOrigin::Manual && kind.draws_stock() {
            self.precheck_stock(header.route.primary(), &lines)?;
        }
        let stocktake_lines = if kind == OrderKind::Stocktake {
            self.snapshot(header.route.primary())
        } else {
            Vec::new()
        };

        let now = self.ledger.clock().now();
        let order_id = OrderId::new();
        let number = self
            .orders
            .index()
            .reserve_number(self.numbering.prefix(kind), now.date_naive());

        let command = OrderCommand::Create(CreateOrder {
            order_id,
            kind,
            number: number.clone(),
            header,
            lines,
            stocktake_lines,
            origin,
            created_by: actor.name.clone(),
            occurred_at: now,
        });

        match self.orders.execute(order_id, &command) {
            Ok(order) => {
                tracing::info!(
                    order_id = %order.id_typed(),
                    number = %number,
                    status = %order.status(),
                    "order created"
                );
                Ok(order)
            }
            Err(error) => {
                self.orders.index().release_number(&number);
                Err(error)
            }
        }
    }

    /// Replace header and lines of a PENDING order.
    #[tracing::instrument(skip_all, fields(order_id = %id, actor = %actor.name))]
    pub fn update_order(
        &self,
        actor: &Actor,
        id: OrderId,
        header: OrderHeader,
        lines: Vec<LineDraft>,
    ) -> DomainResult<Order> {
        let lock = self.orders.order_lock(id);
        let _guard = hold(&lock);

        self.check_master_data(&header.route, &lines)?;
        let lines = LineDraft::number_all(lines);
        let primary = header.route.primary();

        let prepared = self.orders.prepare(
            id,
            &OrderCommand::Revise(ReviseOrder {
                header,
                lines: lines.clone(),
                occurred_at: self.ledger.clock().now(),
            }),
        )?;
        let kind = prepared.aggregate.kind();
        let number = prepared.aggregate.number_str().to_string();
        if kind.draws_stock() {
            self.precheck_stock(primary, &lines)
                .map_err(|e| e.for_order(&number))?;
        }

        let order = self.orders.commit(prepared)?;
        tracing::info!(number = %number, lines = order.lines().len(), "order revised");
        Ok(order)
    }

    /// Soft-delete a PENDING order.
    #[tracing::instrument(skip_all, fields(order_id = %id, actor = %actor.name))]
    pub fn delete_order(&self, actor: &Actor, id: OrderId) -> DomainResult<()> {
        let lock = self.orders.order_lock(id);
        let _guard = hold(&lock);

        let order = self.orders.execute(
            id,
            &OrderCommand::Delete(DeleteOrder {
                occurred_at: self.ledger.clock().now(),
            }),
        )?;
        tracing::info!(number = order.number_str(), "order deleted");
        Ok(())
    }

    /// [`advance`](Self::advance) for a bare user id, with the role looked
    /// up through `resolver` at decision time.
    pub fn advance_as<R: RoleResolver + ?Sized>(
        &self,
        resolver: &R,
        user_id: UserId,
        id: OrderId,
        decision: Decision,
        remark: Option<String>,
    ) -> DomainResult<Order> {
        let actor = resolver.resolve(user_id)?;
        self.advance(&actor, id, decision, remark)
    }

    /// Record one approval decision by `actor`.
    ///
    /// Reaching APPROVED locks the source stock of outbound and transfer
    /// orders in the same transaction as the status change; a stocktake
    /// reaching APPROVED without count lines gets its snapshot.
    #[tracing::instrument(skip_all, fields(order_id = %id, actor = %actor.name, role = %actor.role))]
    pub fn advance(
        &self,
        actor: &Actor,
        id: OrderId,
        decision: Decision,
        remark: Option<String>,
    ) -> DomainResult<Order> {
        let lock = self.orders.order_lock(id);
        let _guard = hold(&lock);

        let now = self.ledger.clock().now();
        let prepared = self
            .orders
            .prepare(
                id,
                &OrderCommand::AdvanceApproval(AdvanceApproval {
                    role: actor.role,
                    actor_name: actor.name.clone(),
                    decision,
                    remark,
                    occurred_at: now,
                }),
            )
            .inspect_err(|error| {
                if matches!(error, DomainError::Permission(_) | DomainError::InvalidState(_)) {
                    tracing::warn!(%error, "approval refused");
                }
            })?;

        let target = prepared.aggregate.status();
        let kind = prepared.aggregate.kind();
        let number = prepared.aggregate.number_str().to_string();

        let mut order = if target == OrderStatus::Approved && kind.locks_on_approval() {
            let source = route_of(&prepared.aggregate)?.primary();
            let lines = prepared.aggregate.lines().to_vec();
            let context = movement_context(actor, &number);
            self.ledger
                .transaction(&keys_for(source, &lines), &context, |txn| {
                    for line in &lines {
                        txn.lock(InventoryKey::new(source, line.goods_id), line.quantity)?;
                    }
                    self.orders.commit(prepared)
                })
                .map_err(|e| e.for_order(&number))?
        } else {
            self.orders.commit(prepared)?
        };
        tracing::info!(number = %number, status = %target, "approval recorded");

        if kind == OrderKind::Stocktake
            && target == OrderStatus::Approved
            && order.stocktake_lines().is_empty()
        {
            order = self.take_snapshot(&order)?;
        }
        Ok(order)
    }

    /// Apply an APPROVED order to the ledger and mark it EXECUTED.
    ///
    /// All lines run in one ledger transaction together with the order
    /// append; a failing line leaves both ledger and order untouched.
    /// Stocktakes are completed instead (see `complete_stocktake`).
    #[tracing::instrument(skip_all, fields(order_id = %id, actor = %actor.name))]
    pub fn execute(&self, actor: &Actor, id: OrderId) -> DomainResult<Order> {
        let lock = self.orders.order_lock(id);
        let _guard = hold(&lock);

        let order = self.orders.load(id)?;
        if order.kind() == OrderKind::Stocktake {
            return self.complete_loaded(actor, order);
        }

        let prepared = self.orders.prepare(
            id,
            &OrderCommand::MarkExecuted(MarkExecuted {
                executed_by: actor.name.clone(),
                adjusted_lines: Vec::new(),
                occurred_at: self.ledger.clock().now(),
            }),
        )?;

        let route = route_of(&order)?;
        let number = order.number_str().to_string();
        let mut keys = keys_for(route.primary(), order.lines());
        if let Some(target) = route.target() {
            keys.extend(keys_for(target, order.lines()));
        }

        let kind = order.kind();
        let context = movement_context(actor, &number);
        let executed = self
            .ledger
            .transaction(&keys, &context, |txn| {
                for line in order.lines() {
                    let source = InventoryKey::new(route.primary(), line.goods_id);
                    match kind {
                        OrderKind::Inbound => {
                            txn.inbound(source, &receipt(line))?;
                        }
                        OrderKind::Outbound => {
                            txn.unlock(source, line.quantity)?;
                            txn.outbound(source, line.quantity)?;
                        }
                        OrderKind::Transfer => {
                            let target = route.target().ok_or_else(|| {
                                DomainError::invalid_state("transfer without a target warehouse")
                            })?;
                            txn.unlock(source, line.quantity)?;
                            txn.outbound(source, line.quantity)?;
                            txn.inbound(InventoryKey::new(target, line.goods_id), &receipt(line))?;
                        }
                        OrderKind::Stocktake => {
                            return Err(DomainError::invalid_state(
                                "stocktakes are completed, not executed line by line",
                            ));
                        }
                    }
                }
                self.orders.commit(prepared)
            })
            .map_err(|e| e.for_order(&number))?;

        tracing::info!(number = %number, kind = %kind, "order executed");

        if kind == OrderKind::Transfer {
            self.synthesize_transfer_documents(&executed);
        }
        Ok(executed)
    }

    /// Cancel an order that has not been executed.
    ///
    /// An APPROVED outbound or transfer gives its locked stock back in the
    /// same transaction.
    #[tracing::instrument(skip_all, fields(order_id = %id, actor = %actor.name))]
    pub fn cancel(&self, actor: &Actor, id: OrderId, reason: &str) -> DomainResult<Order> {
        let lock = self.orders.order_lock(id);
        let _guard = hold(&lock);

        let order = self.orders.load(id)?;
        let prepared = self.orders.prepare(
            id,
            &OrderCommand::Cancel(CancelOrder {
                reason: reason.to_string(),
                cancelled_by: actor.name.clone(),
                occurred_at: self.ledger.clock().now(),
            }),
        )?;

        let number = order.number_str().to_string();
        let cancelled = if order.status() == OrderStatus::Approved && order.kind().locks_on_approval() {
            let source = route_of(&order)?.primary();
            let context = movement_context(actor, &number);
            self.ledger
                .transaction(&keys_for(source, order.lines()), &context, |txn| {
                    for line in order.lines() {
                        txn.unlock(InventoryKey::new(source, line.goods_id), line.quantity)?;
                    }
                    self.orders.commit(prepared)
                })
                .map_err(|e| e.for_order(&number))?
        } else {
            self.orders.commit(prepared)?
        };

        tracing::info!(number = %number, previous = %order.status(), "order cancelled");
        Ok(cancelled)
    }

    pub fn get_order(&self, id: OrderId) -> DomainResult<Order> {
        self.orders.load(id)
    }

    pub fn find_order_by_number(&self, number: &str) -> DomainResult<Order> {
        let summary = self
            .orders
            .index()
            .find_by_number(number)
            .ok_or_else(|| DomainError::not_found(format!("order {number}")))?;
        self.orders.load(summary.id)
    }

    pub fn list_orders_by_status(&self, status: OrderStatus) -> DomainResult<Vec<Order>> {
        self.load_summaries(self.orders.index().list_by_status(status))
    }

    pub fn list_orders_by_reference(&self, reference: &str) -> DomainResult<Vec<Order>> {
        self.load_summaries(self.orders.index().list_by_reference(reference))
    }

    pub fn approved_not_executed(&self) -> DomainResult<Vec<Order>> {
        self.load_summaries(self.orders.index().approved_not_executed())
    }

    pub fn overdue_orders(&self, today: NaiveDate) -> DomainResult<Vec<Order>> {
        self.load_summaries(self.orders.index().overdue(today))
    }

    pub fn list_orders_by_warehouse(
        &self,
        kind: OrderKind,
        warehouse_id: WarehouseId,
    ) -> DomainResult<Vec<Order>> {
        self.load_summaries(self.orders.index().list_by_warehouse(kind, warehouse_id))
    }

    pub fn transfers_from(&self, warehouse_id: WarehouseId) -> DomainResult<Vec<Order>> {
        self.load_summaries(self.orders.index().list_by_source_warehouse(warehouse_id))
    }

    pub fn transfers_to(&self, warehouse_id: WarehouseId) -> DomainResult<Vec<Order>> {
        self.load_summaries(self.orders.index().list_by_target_warehouse(warehouse_id))
    }

    pub fn list_orders_planned_between(
        &self,
        kind: OrderKind,
        from: NaiveDate,
        to: NaiveDate,
    ) -> DomainResult<Vec<Order>> {
        self.load_summaries(self.orders.index().list_by_planned_date(kind, from, to))
    }

    /// Orders of `kind` created today by the engine's clock.
    pub fn todays_orders(&self, kind: OrderKind) -> DomainResult<Vec<Order>> {
        let today = self.ledger.clock().now().date_naive();
        self.load_summaries(self.orders.index().list_created_on(kind, today))
    }

    fn load_summaries(&self, summaries: Vec<OrderSummary>) -> DomainResult<Vec<Order>> {
        summaries
            .into_iter()
            .map(|summary| self.orders.load(summary.id))
            .collect()
    }

    fn check_master_data(&self, route: &Route, lines: &[LineDraft]) -> DomainResult<()> {
        let master_data = self.ledger.master_data();
        for warehouse_id in route.warehouses() {
            master_data.require_warehouse(warehouse_id)?;
        }
        for line in lines {
            master_data.require_goods(line.goods_id)?;
        }
        Ok(())
    }

    /// Advisory availability check at create/update time. Locking re-checks
    /// under the row lock at approval.
    fn precheck_stock(&self, warehouse_id: WarehouseId, lines: &[OrderLine]) -> DomainResult<()> {
        let mut needed: BTreeMap<GoodsId, Decimal> = BTreeMap::new();
        for line in lines {
            *needed.entry(line.goods_id).or_default() += line.quantity;
        }
        for (goods_id, quantity) in needed {
            let available = self
                .ledger
                .get(InventoryKey::new(warehouse_id, goods_id))
                .available_quantity();
            if available < quantity {
                return Err(DomainError::insufficient_stock(
                    warehouse_id,
                    goods_id,
                    quantity,
                    available,
                ));
            }
        }
        Ok(())
    }

    /// Count lines for every row with stock in `warehouse_id`.
    fn snapshot(&self, warehouse_id: WarehouseId) -> Vec<StocktakeLine> {
        self.ledger
            .list_with_stock(warehouse_id)
            .iter()
            .map(|record| {
                StocktakeLine::snapshot(record.key().goods_id, record.quantity(), record.average_cost())
            })
            .collect()
    }

    /// Give a stocktake its snapshot if it has none yet. Caller holds the
    /// order lock.
    fn take_snapshot(&self, order: &Order) -> DomainResult<Order> {
        if !order.stocktake_lines().is_empty() {
            return Ok(order.clone());
        }
        let lines = self.snapshot(route_of(order)?.primary());
        if lines.is_empty() {
            return Ok(order.clone());
        }
        let count = lines.len();
        let order = self.orders.execute(
            order.id_typed(),
            &OrderCommand::TakeSnapshot(TakeSnapshot {
                lines,
                occurred_at: self.ledger.clock().now(),
            }),
        )?;
        tracing::info!(number = order.number_str(), lines = count, "stocktake snapshot taken");
        Ok(order)
    }
}

#[cfg(test)]
mod tests;
