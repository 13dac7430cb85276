//! Paired documents for an executed transfer.
//!
//! After a transfer commits, the engine records the same movement as an
//! EXECUTED TRANSFER_OUT document on the source warehouse and an EXECUTED
//! TRANSFER_IN document on the target, both referencing the transfer number.
//! The transfer stays the source of truth: a failure here is logged and the
//! completed transfer is left as it is.

use depot_auth::Actor;
use depot_core::{DomainError, DomainResult, WarehouseId};
use depot_orders::{BusinessType, LineDraft, Order, OrderHeader, OrderKind, OrderOrigin, Route};

use super::{NewOrder, WarehouseEngine};
use crate::audit::AuditSink;
use crate::event_store::EventStore;
use crate::master_data::{Lookup, MasterData};

impl<S, M, A> WarehouseEngine<S, M, A>
where
    S: EventStore,
    M: MasterData,
    A: AuditSink,
{
    pub(super) fn synthesize_transfer_documents(&self, transfer: &Order) {
        match self.try_synthesize(transfer) {
            Ok((outbound, inbound)) => {
                tracing::info!(
                    transfer = transfer.number_str(),
                    outbound = outbound.number_str(),
                    inbound = inbound.number_str(),
                    "transfer documents synthesized"
                );
            }
            Err(error) => {
                tracing::error!(
                    transfer = transfer.number_str(),
                    %error,
                    "failed to synthesize transfer documents"
                );
            }
        }
    }

    fn try_synthesize(&self, transfer: &Order) -> DomainResult<(Order, Order)> {
        let (Some(header), Some(executed_at)) = (transfer.header(), transfer.operation_time()) else {
            return Err(DomainError::invalid_state(format!(
                "transfer {} is not executed",
                transfer.number_str()
            )));
        };
        let Route::Transfer { source, target } = header.route else {
            return Err(DomainError::invalid_state(format!(
                "order {} is not a transfer",
                transfer.number_str()
            )));
        };

        let origin = OrderOrigin::Synthesized { executed_at };
        let system = Actor::system();

        let outbound = self.create_document(
            &system,
            self.derived(transfer, header, OrderKind::Outbound, source, target),
            origin,
        )?;
        let inbound = self.create_document(
            &system,
            self.derived(transfer, header, OrderKind::Inbound, target, source),
            origin,
        )?;
        Ok((outbound, inbound))
    }

    /// A single-warehouse copy of the transfer; `counterpart` is the other
    /// side of the movement.
    fn derived(
        &self,
        transfer: &Order,
        header: &OrderHeader,
        kind: OrderKind,
        warehouse_id: WarehouseId,
        counterpart: WarehouseId,
    ) -> NewOrder {
        let business_type = match kind {
            OrderKind::Outbound => BusinessType::TransferOut,
            _ => BusinessType::TransferIn,
        };

        let mut derived = OrderHeader::new(Route::Single { warehouse_id }, business_type);
        derived.planned_date = header.planned_date;
        derived.reference_number = Some(transfer.number_str().to_string());
        derived.counterparty = Some(self.warehouse_name(counterpart));
        derived.remark = header.remark.clone();

        NewOrder::new(
            kind,
            derived,
            transfer.lines().iter().map(LineDraft::from_line).collect(),
        )
    }

    fn warehouse_name(&self, id: WarehouseId) -> String {
        match self.ledger().master_data().warehouse(id) {
            Lookup::Found(info) | Lookup::Disabled(info) => info.name,
            Lookup::NotFound => id.to_string(),
        }
    }
}
