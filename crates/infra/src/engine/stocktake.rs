//! Stocktake reconciliation.
//!
//! Snapshot, count entry, completion and reporting. Completion pushes every
//! counted, off-book, not yet adjusted line to the ledger with `SetAbsolute`
//! and marks the order EXECUTED in the same transaction.

use depot_auth::Actor;
use depot_core::{DomainError, DomainResult, LineId, OrderId};
use depot_inventory::InventoryKey;
use depot_orders::{
    LineCount, MarkExecuted, Order, OrderCommand, OrderKind, RecordCounts, StartStocktake,
    StocktakeLine, StocktakeReport,
};

use super::{WarehouseEngine, hold, movement_context, route_of};
use crate::audit::AuditSink;
use crate::event_store::EventStore;
use crate::master_data::MasterData;

fn ensure_stocktake(order: &Order) -> DomainResult<()> {
    if order.kind() != OrderKind::Stocktake {
        return Err(DomainError::invalid_state(format!(
            "order {} is a {} order, not a stocktake",
            order.number_str(),
            order.kind()
        )));
    }
    Ok(())
}

impl<S, M, A> WarehouseEngine<S, M, A>
where
    S: EventStore,
    M: MasterData,
    A: AuditSink,
{
    /// APPROVED -> IN_PROGRESS, taking the snapshot first if it is missing.
    #[tracing::instrument(skip_all, fields(order_id = %id, actor = %actor.name))]
    pub fn start_stocktake(&self, actor: &Actor, id: OrderId) -> DomainResult<Order> {
        let lock = self.orders().order_lock(id);
        let _guard = hold(&lock);

        let order = self.orders().load(id)?;
        ensure_stocktake(&order)?;
        let order = self.take_snapshot(&order)?;

        let order = self.orders().execute(
            order.id_typed(),
            &OrderCommand::StartStocktake(StartStocktake {
                started_by: actor.name.clone(),
                occurred_at: self.ledger().clock().now(),
            }),
        )?;
        tracing::info!(
            number = order.number_str(),
            lines = order.stocktake_lines().len(),
            "stocktake started"
        );
        Ok(order)
    }

    /// Record one count and return the recomputed line.
    pub fn update_stocktake_line(
        &self,
        actor: &Actor,
        id: OrderId,
        count: LineCount,
    ) -> DomainResult<StocktakeLine> {
        let line_id = count.line_id;
        let order = self.batch_update_stocktake_lines(actor, id, vec![count])?;
        order
            .stocktake_line(line_id)
            .cloned()
            .ok_or_else(|| DomainError::not_found(format!("line {line_id}")))
    }

    /// Record several counts at once; all or none are applied.
    #[tracing::instrument(skip_all, fields(order_id = %id, actor = %actor.name, counts = counts.len()))]
    pub fn batch_update_stocktake_lines(
        &self,
        actor: &Actor,
        id: OrderId,
        counts: Vec<LineCount>,
    ) -> DomainResult<Order> {
        let lock = self.orders().order_lock(id);
        let _guard = hold(&lock);

        let counts = counts
            .into_iter()
            .map(|mut count| {
                count.counted_by.get_or_insert_with(|| actor.name.clone());
                count
            })
            .collect();

        self.orders().execute(
            id,
            &OrderCommand::RecordCounts(RecordCounts {
                counts,
                occurred_at: self.ledger().clock().now(),
            }),
        )
    }

    /// Reconcile an IN_PROGRESS stocktake against the ledger.
    ///
    /// A second call finds the order EXECUTED and fails with `InvalidState`
    /// without touching the ledger.
    #[tracing::instrument(skip_all, fields(order_id = %id, actor = %actor.name))]
    pub fn complete_stocktake(&self, actor: &Actor, id: OrderId) -> DomainResult<Order> {
        let lock = self.orders().order_lock(id);
        let _guard = hold(&lock);

        let order = self.orders().load(id)?;
        self.complete_loaded(actor, order)
    }

    /// Caller holds the order lock.
    pub(super) fn complete_loaded(&self, actor: &Actor, order: Order) -> DomainResult<Order> {
        ensure_stocktake(&order)?;

        let adjustments: Vec<StocktakeLine> = order
            .stocktake_lines()
            .iter()
            .filter(|line| line.needs_adjustment())
            .cloned()
            .collect();
        let adjusted_lines: Vec<LineId> = adjustments.iter().map(|line| line.line_id).collect();

        let prepared = self.orders().prepare(
            order.id_typed(),
            &OrderCommand::MarkExecuted(MarkExecuted {
                executed_by: actor.name.clone(),
                adjusted_lines,
                occurred_at: self.ledger().clock().now(),
            }),
        )?;

        let warehouse_id = route_of(&order)?.primary();
        let number = order.number_str().to_string();
        let keys: Vec<InventoryKey> = adjustments
            .iter()
            .map(|line| InventoryKey::new(warehouse_id, line.goods_id))
            .collect();

        let context = movement_context(actor, &number);
        let completed = self
            .ledger()
            .transaction(&keys, &context, |txn| {
                for line in &adjustments {
                    let Some(actual) = line.actual_quantity else {
                        continue;
                    };
                    txn.set_absolute(InventoryKey::new(warehouse_id, line.goods_id), actual, None)?;
                }
                self.orders().commit(prepared)
            })
            .map_err(|e| e.for_order(&number))?;

        tracing::info!(
            number = %number,
            adjusted = adjustments.len(),
            "stocktake completed"
        );
        Ok(completed)
    }

    pub fn stocktake_report(&self, id: OrderId) -> DomainResult<StocktakeReport> {
        let order = self.orders().load(id)?;
        ensure_stocktake(&order)?;
        Ok(StocktakeReport::from_lines(order.stocktake_lines()))
    }

    /// Lines whose count differs from the book quantity.
    pub fn stocktake_differences(&self, id: OrderId) -> DomainResult<Vec<StocktakeLine>> {
        let order = self.orders().load(id)?;
        ensure_stocktake(&order)?;
        Ok(order
            .stocktake_lines()
            .iter()
            .filter(|line| !line.difference_quantity.is_zero())
            .cloned()
            .collect())
    }
}
