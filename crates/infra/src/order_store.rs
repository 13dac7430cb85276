//! Event-sourced order persistence with per-order serialisation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use depot_core::{AggregateId, DomainError, DomainResult, OrderId};
use depot_orders::{Order, OrderCommand};

use crate::command_dispatcher::{CommandDispatcher, DispatchError, Prepared};
use crate::event_store::EventStore;
use crate::read_model::OrderIndex;

/// Stream type of every order document.
pub const ORDER_STREAM: &str = "order";

fn make_order(id: AggregateId) -> Order {
    Order::empty(OrderId::from_uuid(*id.as_uuid()))
}

/// Order documents on top of an [`EventStore`], kept in step with an
/// [`OrderIndex`].
///
/// Writers serialise per order through [`OrderStore::order_lock`]; different
/// orders never wait on each other. The optimistic append underneath turns
/// any writer that skipped the lock into a `Conflict` instead of a lost
/// update.
#[derive(Debug)]
pub struct OrderStore<S> {
    dispatcher: CommandDispatcher<S>,
    index: OrderIndex,
    locks: Mutex<HashMap<OrderId, Arc<Mutex<()>>>>,
}

impl<S> OrderStore<S>
where
    S: EventStore,
{
    /// Wrap `store`, indexing whatever orders it already holds.
    pub fn open(store: S) -> Result<Self, DispatchError> {
        let this = Self {
            dispatcher: CommandDispatcher::new(store),
            index: OrderIndex::default(),
            locks: Mutex::new(HashMap::new()),
        };
        let indexed = this.index.rebuild(this.dispatcher.store(), ORDER_STREAM)?;
        tracing::info!(indexed, "order index rebuilt");
        Ok(this)
    }

    pub fn index(&self) -> &OrderIndex {
        &self.index
    }

    /// The mutex guarding writes to one order.
    pub fn order_lock(&self, id: OrderId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(id).or_default())
    }

    /// A live order; soft-deleted and unknown ids are `NotFound`.
    pub fn load(&self, id: OrderId) -> DomainResult<Order> {
        let order = self.dispatcher.load(id.into(), make_order)?;
        if !order.exists() {
            return Err(DomainError::not_found(format!("order {id}")));
        }
        Ok(order)
    }

    pub fn prepare(&self, id: OrderId, command: &OrderCommand) -> DomainResult<Prepared<Order>> {
        Ok(self
            .dispatcher
            .prepare(id.into(), ORDER_STREAM, command, make_order)?)
    }

    /// Persist a prepared command and refresh the index.
    ///
    /// The number is checked against the index before the append. Numbers
    /// are only ever handed out by the index, so the `record` after the
    /// append cannot clash.
    pub fn commit(&self, prepared: Prepared<Order>) -> DomainResult<Order> {
        self.index.check_number(&prepared.aggregate)?;
        let (order, committed) = self.dispatcher.commit(prepared)?;
        self.index.record(&order)?;
        for stored in &committed {
            tracing::debug!(
                order_id = %order.id_typed(),
                number = order.number_str(),
                event_type = %stored.event_type,
                sequence = stored.sequence_number,
                "order event appended"
            );
        }
        Ok(order)
    }

    pub fn execute(&self, id: OrderId, command: &OrderCommand) -> DomainResult<Order> {
        let prepared = self.prepare(id, command)?;
        self.commit(prepared)
    }
}
