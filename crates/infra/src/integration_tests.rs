//! End-to-end scenarios across the engine, the ledger and the order store.
//!
//! Each test drives the public engine surface the way a caller would and
//! checks both sides: the order documents and the ledger rows.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, TimeZone, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use depot_auth::{Actor, Role};
    use depot_core::{DomainError, FixedClock, GoodsId, OrderId, UserId, WarehouseId};
    use depot_events::{EventBus, InMemoryEventBus};
    use depot_inventory::{InventoryKey, MovementFact, MovementKind, StockThresholds};
    use depot_orders::{
        BusinessType, Decision, LineCount, LineDraft, Order, OrderHeader, OrderKind, OrderStatus,
        Route,
    };

    use crate::audit::{AuditError, AuditSink, BusAuditSink, RecordingAuditSink};
    use crate::engine::{NewOrder, WarehouseEngine};
    use crate::event_store::InMemoryEventStore;
    use crate::ledger::{InventoryLedger, Receipt};
    use crate::master_data::InMemoryMasterData;
    use crate::projections::MovementHistoryProjection;
    use crate::read_model::InMemoryKeyedStore;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 14, 0, 0).unwrap()
    }

    struct Depot<A> {
        engine: WarehouseEngine<InMemoryEventStore, Arc<InMemoryMasterData>, A>,
        north: WarehouseId,
        south: WarehouseId,
        cable: GoodsId,
        tape: GoodsId,
    }

    fn depot<A: AuditSink>(audit: A) -> Depot<A> {
        let master_data = Arc::new(InMemoryMasterData::new());
        let north = master_data.add_warehouse("North");
        let south = master_data.add_warehouse("South");
        let cable = master_data.add_goods("Cable 3x1.5", "m", StockThresholds::default());
        let tape = master_data.add_goods("Insulating tape", "roll", StockThresholds::default());

        let ledger = InventoryLedger::new(master_data, audit).with_clock(Arc::new(FixedClock(now())));
        Depot {
            engine: WarehouseEngine::new(InMemoryEventStore::new(), ledger).unwrap(),
            north,
            south,
            cable,
            tape,
        }
    }

    fn admin() -> Actor {
        Actor::new(UserId::new(), "ada", Role::WarehouseAdmin)
    }

    impl<A: AuditSink> Depot<A> {
        fn key(&self, warehouse_id: WarehouseId, goods_id: GoodsId) -> InventoryKey {
            InventoryKey::new(warehouse_id, goods_id)
        }

        fn stock_up(&self, warehouse_id: WarehouseId, goods_id: GoodsId, quantity: Decimal) -> Order {
            let order = self
                .engine
                .create_order(
                    &admin(),
                    NewOrder::new(
                        OrderKind::Inbound,
                        OrderHeader::new(Route::Single { warehouse_id }, BusinessType::PurchaseIn),
                        vec![LineDraft::new(goods_id, quantity, dec!(4))],
                    ),
                )
                .unwrap();
            self.engine
                .advance(&admin(), order.id_typed(), Decision::Approve, None)
                .unwrap();
            self.engine.execute(&admin(), order.id_typed()).unwrap()
        }

        fn outbound(&self, lines: Vec<LineDraft>) -> Order {
            self.engine
                .create_order(
                    &admin(),
                    NewOrder::new(
                        OrderKind::Outbound,
                        OrderHeader::new(
                            Route::Single { warehouse_id: self.north },
                            BusinessType::SaleOut,
                        ),
                        lines,
                    ),
                )
                .unwrap()
        }

        fn approve(&self, id: OrderId) -> Order {
            self.engine.advance(&admin(), id, Decision::Approve, None).unwrap()
        }
    }

    #[test]
    fn transfer_moves_stock_and_synthesizes_both_documents() {
        let audit = Arc::new(RecordingAuditSink::new());
        let d = depot(Arc::clone(&audit));
        d.stock_up(d.north, d.cable, dec!(50));

        let mut header = OrderHeader::new(
            Route::Transfer {
                source: d.north,
                target: d.south,
            },
            BusinessType::WarehouseTransfer,
        );
        header.remark = Some("rebalance".to_string());
        let transfer = d
            .engine
            .create_order(
                &admin(),
                NewOrder::new(OrderKind::Transfer, header, vec![LineDraft::new(d.cable, dec!(20), dec!(4))]),
            )
            .unwrap();
        assert_eq!(transfer.number_str(), "TR20261019001");

        d.approve(transfer.id_typed());
        let source = d.engine.ledger().get(d.key(d.north, d.cable));
        assert_eq!(source.available_quantity(), dec!(30));
        assert_eq!(source.locked_quantity(), dec!(20));
        assert!(d.engine.ledger().find(d.key(d.south, d.cable)).is_none());

        let executed = d.engine.execute(&admin(), transfer.id_typed()).unwrap();
        assert_eq!(executed.status(), OrderStatus::Executed);

        let source = d.engine.ledger().get(d.key(d.north, d.cable));
        let target = d.engine.ledger().get(d.key(d.south, d.cable));
        assert_eq!(source.quantity(), dec!(30));
        assert_eq!(source.locked_quantity(), Decimal::ZERO);
        assert_eq!(target.quantity(), dec!(20));
        assert_eq!(target.average_cost(), dec!(4));

        let derived = d.engine.list_orders_by_reference("TR20261019001").unwrap();
        assert_eq!(derived.len(), 2);
        let (inbound, outbound) = (&derived[0], &derived[1]);

        assert_eq!(outbound.number_str(), "OUT20261019001");
        assert_eq!(outbound.kind(), OrderKind::Outbound);
        assert_eq!(outbound.status(), OrderStatus::Executed);
        assert_eq!(outbound.operation_time(), executed.operation_time());
        let out_header = outbound.header().unwrap();
        assert_eq!(out_header.business_type, BusinessType::TransferOut);
        assert_eq!(out_header.route, Route::Single { warehouse_id: d.north });
        assert_eq!(out_header.counterparty.as_deref(), Some("South"));

        assert_eq!(inbound.number_str(), "IN20261019002");
        assert_eq!(inbound.kind(), OrderKind::Inbound);
        assert_eq!(inbound.status(), OrderStatus::Executed);
        let in_header = inbound.header().unwrap();
        assert_eq!(in_header.business_type, BusinessType::TransferIn);
        assert_eq!(in_header.route, Route::Single { warehouse_id: d.south });
        assert_eq!(in_header.counterparty.as_deref(), Some("North"));
        assert_eq!(inbound.lines()[0].quantity, dec!(20));

        // Synthesis records the movement; it does not repeat it.
        assert_eq!(d.engine.ledger().get(d.key(d.south, d.cable)).quantity(), dec!(20));

        let transfer_facts: Vec<(MovementKind, Decimal)> = audit
            .facts()
            .iter()
            .filter(|f| f.related_order_number.as_deref() == Some("TR20261019001"))
            .map(|f| (f.kind, f.delta))
            .collect();
        assert_eq!(
            transfer_facts,
            vec![
                (MovementKind::Lock, Decimal::ZERO),
                (MovementKind::Unlock, Decimal::ZERO),
                (MovementKind::Outbound, dec!(-20)),
                (MovementKind::Inbound, dec!(20)),
            ]
        );
    }

    #[test]
    fn stocktake_completion_applies_the_difference_once() {
        let d = depot(Arc::new(RecordingAuditSink::new()));
        d.stock_up(d.north, d.cable, dec!(100));

        let order = d
            .engine
            .create_order(
                &admin(),
                NewOrder::new(
                    OrderKind::Stocktake,
                    OrderHeader::new(Route::Single { warehouse_id: d.north }, BusinessType::AnnualCheck),
                    Vec::new(),
                ),
            )
            .unwrap();
        let id = order.id_typed();
        let line_id = order.stocktake_lines()[0].line_id;
        assert_eq!(order.stocktake_lines()[0].book_quantity, dec!(100));

        d.approve(id);
        d.engine.start_stocktake(&admin(), id).unwrap();
        d.engine
            .update_stocktake_line(&admin(), id, LineCount::new(line_id, dec!(90)))
            .unwrap();

        let completed = d.engine.complete_stocktake(&admin(), id).unwrap();
        assert_eq!(completed.status(), OrderStatus::Executed);
        assert!(completed.stocktake_line(line_id).unwrap().is_adjusted);
        assert_eq!(d.engine.ledger().get(d.key(d.north, d.cable)).quantity(), dec!(90));

        assert!(matches!(
            d.engine.complete_stocktake(&admin(), id),
            Err(DomainError::InvalidState(_))
        ));
        assert!(matches!(d.engine.execute(&admin(), id), Err(DomainError::InvalidState(_))));
        let record = d.engine.ledger().get(d.key(d.north, d.cable));
        assert_eq!(record.quantity(), dec!(90));
        assert_eq!(record.average_cost(), dec!(4));
    }

    #[test]
    fn same_day_inbound_numbers_are_sequential() {
        let d = depot(Arc::new(RecordingAuditSink::new()));
        let first = d.stock_up(d.north, d.cable, dec!(1));
        let second = d.stock_up(d.north, d.tape, dec!(1));

        assert_eq!(first.number_str(), "IN20261019001");
        assert_eq!(second.number_str(), "IN20261019002");
        assert_eq!(
            d.engine.find_order_by_number("IN20261019002").unwrap().id_typed(),
            second.id_typed()
        );
    }

    #[test]
    fn outbound_boundary_through_the_ledger() {
        let d = depot(Arc::new(RecordingAuditSink::new()));
        d.stock_up(d.north, d.cable, dec!(12));
        let key = d.key(d.north, d.cable);
        let ctx = depot_inventory::MovementContext::new(None, "counter");

        let before = d.engine.ledger().get(key);
        assert!(matches!(
            d.engine.ledger().outbound(key, dec!(13), &ctx),
            Err(DomainError::InsufficientStock(_))
        ));
        assert_eq!(d.engine.ledger().get(key), before);

        let after = d.engine.ledger().outbound(key, dec!(12), &ctx).unwrap();
        assert_eq!(after.quantity(), Decimal::ZERO);
        assert_eq!(after.available_quantity(), Decimal::ZERO);
    }

    #[test]
    fn approval_path_is_exclusive_and_admins_can_skip_it() {
        let d = depot(Arc::new(RecordingAuditSink::new()));
        d.stock_up(d.north, d.cable, dec!(10));
        let team_leader = Actor::new(UserId::new(), "tom", Role::TeamLeader);
        let squad_leader = Actor::new(UserId::new(), "sue", Role::SquadLeader);

        let pending = d.outbound(vec![LineDraft::new(d.cable, dec!(1), dec!(9))]);
        assert!(matches!(
            d.engine.advance(&team_leader, pending.id_typed(), Decision::Approve, None),
            Err(DomainError::Permission(_))
        ));
        assert_eq!(
            d.engine.get_order(pending.id_typed()).unwrap().status(),
            OrderStatus::Pending
        );
        assert!(matches!(
            d.engine.advance(
                &Actor::new(UserId::new(), "uma", Role::User),
                pending.id_typed(),
                Decision::Approve,
                None
            ),
            Err(DomainError::Permission(_))
        ));

        // Fast path from every pre-terminal stage.
        let from_pending = d.outbound(vec![LineDraft::new(d.cable, dec!(1), dec!(9))]);
        assert_eq!(d.approve(from_pending.id_typed()).status(), OrderStatus::Approved);

        let from_squad = d.outbound(vec![LineDraft::new(d.cable, dec!(1), dec!(9))]);
        d.engine
            .advance(&squad_leader, from_squad.id_typed(), Decision::Approve, None)
            .unwrap();
        assert_eq!(d.approve(from_squad.id_typed()).status(), OrderStatus::Approved);

        let from_team = d.outbound(vec![LineDraft::new(d.cable, dec!(1), dec!(9))]);
        d.engine
            .advance(&squad_leader, from_team.id_typed(), Decision::Approve, None)
            .unwrap();
        d.engine
            .advance(&team_leader, from_team.id_typed(), Decision::Approve, None)
            .unwrap();
        let approved = d
            .engine
            .advance(
                &Actor::new(UserId::new(), "root", Role::SystemAdmin),
                from_team.id_typed(),
                Decision::Approve,
                None,
            )
            .unwrap();
        assert_eq!(approved.status(), OrderStatus::Approved);

        assert_eq!(
            d.engine.ledger().get(d.key(d.north, d.cable)).locked_quantity(),
            dec!(3)
        );
    }

    #[test]
    fn terminal_orders_refuse_every_change() {
        let d = depot(Arc::new(RecordingAuditSink::new()));
        d.stock_up(d.north, d.cable, dec!(10));
        let line = || vec![LineDraft::new(d.cable, dec!(1), dec!(9))];

        let executed = d.outbound(line());
        d.approve(executed.id_typed());
        d.engine.execute(&admin(), executed.id_typed()).unwrap();

        let rejected = d.outbound(line());
        d.engine
            .advance(&admin(), rejected.id_typed(), Decision::Reject, None)
            .unwrap();

        let cancelled = d.outbound(line());
        d.engine
            .cancel(&admin(), cancelled.id_typed(), "customer withdrew")
            .unwrap();

        for order in [&executed, &rejected, &cancelled] {
            let id = order.id_typed();
            let header = OrderHeader::new(Route::Single { warehouse_id: d.north }, BusinessType::SaleOut);
            assert!(matches!(
                d.engine.update_order(&admin(), id, header, line()),
                Err(DomainError::InvalidState(_))
            ));
            assert!(matches!(d.engine.delete_order(&admin(), id), Err(DomainError::InvalidState(_))));
            assert!(matches!(
                d.engine.advance(&admin(), id, Decision::Approve, None),
                Err(DomainError::InvalidState(_))
            ));
            assert!(matches!(d.engine.execute(&admin(), id), Err(DomainError::InvalidState(_))));
        }

        assert!(matches!(
            d.engine.cancel(&admin(), executed.id_typed(), "too late"),
            Err(DomainError::InvalidState(_))
        ));
        assert_eq!(d.engine.ledger().get(d.key(d.north, d.cable)).quantity(), dec!(9));
    }

    #[test]
    fn cancelling_an_approved_outbound_releases_its_lock() {
        let d = depot(Arc::new(RecordingAuditSink::new()));
        d.stock_up(d.north, d.cable, dec!(10));
        let order = d.outbound(vec![LineDraft::new(d.cable, dec!(4), dec!(9))]);
        d.approve(order.id_typed());
        assert_eq!(d.engine.ledger().get(d.key(d.north, d.cable)).available_quantity(), dec!(6));

        assert!(matches!(
            d.engine.cancel(&admin(), order.id_typed(), "  "),
            Err(DomainError::Validation(_))
        ));

        let cancelled = d
            .engine
            .cancel(&admin(), order.id_typed(), "wrong customer")
            .unwrap();
        assert_eq!(cancelled.status(), OrderStatus::Cancelled);
        assert_eq!(cancelled.cancel_reason(), Some("wrong customer"));

        let record = d.engine.ledger().get(d.key(d.north, d.cable));
        assert_eq!(record.available_quantity(), dec!(10));
        assert_eq!(record.locked_quantity(), Decimal::ZERO);
    }

    #[test]
    fn failing_execution_leaves_order_and_ledger_untouched() {
        let d = depot(Arc::new(RecordingAuditSink::new()));
        d.stock_up(d.north, d.cable, dec!(10));
        d.stock_up(d.north, d.tape, dec!(10));
        let order = d.outbound(vec![
            LineDraft::new(d.cable, dec!(4), dec!(9)),
            LineDraft::new(d.tape, dec!(5), dec!(2)),
        ]);
        d.approve(order.id_typed());

        // Someone releases the tape reservation by hand and sells it off.
        let ctx = depot_inventory::MovementContext::new(None, "manual");
        let tape = d.engine.ledger().get(d.key(d.north, d.tape));
        d.engine.ledger().unlock(tape.id_typed(), dec!(5), &ctx).unwrap();
        d.engine.ledger().outbound(d.key(d.north, d.tape), dec!(8), &ctx).unwrap();

        let cable_before = d.engine.ledger().get(d.key(d.north, d.cable));
        assert!(matches!(
            d.engine.execute(&admin(), order.id_typed()),
            Err(DomainError::InvalidState(_))
        ));

        let reloaded = d.engine.get_order(order.id_typed()).unwrap();
        assert_eq!(reloaded.status(), OrderStatus::Approved);
        assert!(reloaded.operation_time().is_none());
        assert_eq!(d.engine.ledger().get(d.key(d.north, d.cable)), cable_before);
        assert_eq!(d.engine.ledger().get(d.key(d.north, d.tape)).quantity(), dec!(2));
    }

    #[derive(Debug, Default)]
    struct BrokenSink;

    impl AuditSink for BrokenSink {
        fn record(&self, _fact: &MovementFact) -> Result<(), AuditError> {
            Err(AuditError::Unavailable("log shipper down".to_string()))
        }
    }

    #[test]
    fn audit_failures_never_roll_back_movements() {
        let d = depot(BrokenSink);
        let executed = d.stock_up(d.north, d.tape, dec!(6));

        assert_eq!(executed.status(), OrderStatus::Executed);
        assert_eq!(d.engine.ledger().get(d.key(d.north, d.tape)).quantity(), dec!(6));
    }

    #[test]
    fn movement_history_follows_the_audit_bus() {
        let bus = Arc::new(InMemoryEventBus::new());
        let subscription = bus.subscribe();
        let d = depot(BusAuditSink::new(Arc::clone(&bus)));
        let history = MovementHistoryProjection::new(InMemoryKeyedStore::new());

        let inbound = d.stock_up(d.north, d.cable, dec!(10));
        let outbound = d.outbound(vec![LineDraft::new(d.cable, dec!(3), dec!(9))]);
        d.approve(outbound.id_typed());
        d.engine.execute(&admin(), outbound.id_typed()).unwrap();

        assert_eq!(history.catch_up(&subscription).unwrap(), 4);
        let row = d.engine.ledger().get(d.key(d.north, d.cable));
        let entries = history.history(row.id_typed());
        let operations: Vec<MovementKind> = entries.iter().map(|e| e.operation).collect();
        assert_eq!(
            operations,
            vec![
                MovementKind::Inbound,
                MovementKind::Lock,
                MovementKind::Unlock,
                MovementKind::Outbound,
            ]
        );
        assert_eq!(entries[0].related_order_number.as_deref(), Some(inbound.number_str()));
        assert_eq!(entries[3].before_quantity, dec!(10));
        assert_eq!(entries[3].after_quantity, dec!(7));
        assert_eq!(entries[3].actor_name, "ada");
        assert_eq!(history.for_order(outbound.number_str()).len(), 3);
    }
}
