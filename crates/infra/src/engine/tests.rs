use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use depot_auth::{Actor, InMemoryRoleResolver, Role};
use depot_core::{AggregateRoot, DomainError, FixedClock, GoodsId, UserId, WarehouseId};
use depot_inventory::{InventoryKey, MovementContext, StockThresholds};
use depot_orders::{
    BusinessType, Decision, LineCount, LineDraft, OrderHeader, OrderKind, OrderStatus, Route,
};

use super::{NewOrder, WarehouseEngine};
use crate::audit::RecordingAuditSink;
use crate::event_store::InMemoryEventStore;
use crate::ledger::{InventoryLedger, Receipt};
use crate::master_data::InMemoryMasterData;

type Engine = WarehouseEngine<InMemoryEventStore, Arc<InMemoryMasterData>, Arc<RecordingAuditSink>>;

struct Fixture {
    engine: Engine,
    master_data: Arc<InMemoryMasterData>,
    main: WarehouseId,
    bolts: GoodsId,
    nuts: GoodsId,
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, 9, 30, 0).unwrap()
}

fn today() -> NaiveDate {
    now().date_naive()
}

fn fixture() -> Fixture {
    let master_data = Arc::new(InMemoryMasterData::new());
    let main = master_data.add_warehouse("Main");
    let bolts = master_data.add_goods("Bolt M8", "pcs", StockThresholds::default());
    let nuts = master_data.add_goods("Nut M8", "pcs", StockThresholds::default());

    let ledger = InventoryLedger::new(Arc::clone(&master_data), Arc::new(RecordingAuditSink::new()))
        .with_clock(Arc::new(FixedClock(now())));
    let engine = WarehouseEngine::new(InMemoryEventStore::new(), ledger).unwrap();

    Fixture {
        engine,
        master_data,
        main,
        bolts,
        nuts,
    }
}

fn actor(name: &str, role: Role) -> Actor {
    Actor::new(UserId::new(), name, role)
}

fn admin() -> Actor {
    actor("wendy", Role::WarehouseAdmin)
}

impl Fixture {
    fn seed(&self, goods_id: GoodsId, quantity: Decimal) {
        self.engine
            .ledger()
            .inbound(
                InventoryKey::new(self.main, goods_id),
                &Receipt::new(quantity, dec!(2)),
                &MovementContext::new(None, "seed"),
            )
            .unwrap();
    }

    fn available(&self, goods_id: GoodsId) -> Decimal {
        self.engine
            .ledger()
            .get(InventoryKey::new(self.main, goods_id))
            .available_quantity()
    }

    fn single(&self, business_type: BusinessType) -> OrderHeader {
        OrderHeader::new(Route::Single { warehouse_id: self.main }, business_type)
    }

    fn outbound(&self, goods_id: GoodsId, quantity: Decimal) -> NewOrder {
        NewOrder::new(
            OrderKind::Outbound,
            self.single(BusinessType::SaleOut),
            vec![LineDraft::new(goods_id, quantity, dec!(3))],
        )
    }
}

#[test]
fn create_validates_master_data() {
    let fx = fixture();
    let unknown = NewOrder::new(
        OrderKind::Inbound,
        fx.single(BusinessType::PurchaseIn),
        vec![LineDraft::new(GoodsId::new(), dec!(1), dec!(1))],
    );
    assert!(matches!(
        fx.engine.create_order(&admin(), unknown),
        Err(DomainError::NotFound(_))
    ));

    fx.master_data.set_warehouse_enabled(fx.main, false);
    let disabled = NewOrder::new(
        OrderKind::Inbound,
        fx.single(BusinessType::PurchaseIn),
        vec![LineDraft::new(fx.bolts, dec!(1), dec!(1))],
    );
    assert!(matches!(
        fx.engine.create_order(&admin(), disabled),
        Err(DomainError::Validation(_))
    ));
}

#[test]
fn outbound_creation_prechecks_summed_lines() {
    let fx = fixture();
    fx.seed(fx.bolts, dec!(10));

    let split = NewOrder::new(
        OrderKind::Outbound,
        fx.single(BusinessType::SaleOut),
        vec![
            LineDraft::new(fx.bolts, dec!(6), dec!(3)),
            LineDraft::new(fx.bolts, dec!(6), dec!(3)),
        ],
    );
    let Err(DomainError::InsufficientStock(shortage)) = fx.engine.create_order(&admin(), split) else {
        panic!("expected a shortage");
    };
    assert_eq!(shortage.requested, dec!(12));
    assert_eq!(shortage.available, dec!(10));

    let order = fx.engine.create_order(&admin(), fx.outbound(fx.bolts, dec!(10))).unwrap();
    assert_eq!(order.status(), OrderStatus::Pending);
    // Creation never reserves stock.
    assert_eq!(fx.available(fx.bolts), dec!(10));
}

#[test]
fn failed_creation_gives_its_number_back() {
    let fx = fixture();
    let wrong_type = NewOrder::new(
        OrderKind::Inbound,
        fx.single(BusinessType::SaleOut),
        vec![LineDraft::new(fx.bolts, dec!(1), dec!(1))],
    );
    assert!(matches!(
        fx.engine.create_order(&admin(), wrong_type),
        Err(DomainError::Validation(_))
    ));

    let order = fx
        .engine
        .create_order(
            &admin(),
            NewOrder::new(
                OrderKind::Inbound,
                fx.single(BusinessType::PurchaseIn),
                vec![LineDraft::new(fx.bolts, dec!(1), dec!(1))],
            ),
        )
        .unwrap();
    assert_eq!(order.number_str(), "IN20261019001");
}

#[test]
fn update_replaces_lines_and_rechecks_stock() {
    let fx = fixture();
    fx.seed(fx.bolts, dec!(10));
    let order = fx.engine.create_order(&admin(), fx.outbound(fx.bolts, dec!(4))).unwrap();

    let too_much = vec![LineDraft::new(fx.bolts, dec!(11), dec!(3))];
    assert!(matches!(
        fx.engine
            .update_order(&admin(), order.id_typed(), fx.single(BusinessType::SaleOut), too_much),
        Err(DomainError::InsufficientStock(_))
    ));

    let revised = fx
        .engine
        .update_order(
            &admin(),
            order.id_typed(),
            fx.single(BusinessType::DamageOut),
            vec![
                LineDraft::new(fx.bolts, dec!(5), dec!(3)),
                LineDraft::new(fx.bolts, dec!(1), dec!(3)),
            ],
        )
        .unwrap();
    assert_eq!(revised.lines().len(), 2);
    assert_eq!(revised.totals().total_quantity, dec!(6));
    assert_eq!(revised.header().unwrap().business_type, BusinessType::DamageOut);
}

#[test]
fn deleted_orders_disappear_from_lookups() {
    let fx = fixture();
    fx.seed(fx.bolts, dec!(10));
    let order = fx.engine.create_order(&admin(), fx.outbound(fx.bolts, dec!(4))).unwrap();

    fx.engine.delete_order(&admin(), order.id_typed()).unwrap();

    assert!(matches!(fx.engine.get_order(order.id_typed()), Err(DomainError::NotFound(_))));
    assert!(matches!(
        fx.engine.find_order_by_number(order.number_str()),
        Err(DomainError::NotFound(_))
    ));
    assert!(fx.engine.list_orders_by_status(OrderStatus::Pending).unwrap().is_empty());
}

#[test]
fn chain_approval_locks_only_at_the_last_step() {
    let fx = fixture();
    fx.seed(fx.bolts, dec!(10));
    let id = fx
        .engine
        .create_order(&admin(), fx.outbound(fx.bolts, dec!(4)))
        .unwrap()
        .id_typed();

    let squad = fx
        .engine
        .advance(&actor("sam", Role::SquadLeader), id, Decision::Approve, None)
        .unwrap();
    assert_eq!(squad.status(), OrderStatus::SquadApproved);
    assert_eq!(fx.available(fx.bolts), dec!(10));

    let team = fx
        .engine
        .advance(&actor("tess", Role::TeamLeader), id, Decision::Approve, Some("ok".into()))
        .unwrap();
    assert_eq!(team.status(), OrderStatus::TeamApproved);

    let approved = fx
        .engine
        .advance(&actor("will", Role::WarehouseAdmin), id, Decision::Approve, None)
        .unwrap();
    assert_eq!(approved.status(), OrderStatus::Approved);
    assert_eq!(approved.approvals().len(), 3);
    assert_eq!(approved.approved_by(), Some("will"));
    assert_eq!(fx.available(fx.bolts), dec!(6));
    assert_eq!(
        fx.engine.ledger().get(InventoryKey::new(fx.main, fx.bolts)).locked_quantity(),
        dec!(4)
    );
}

#[test]
fn approval_fails_when_stock_is_gone_and_order_stays_put() {
    let fx = fixture();
    fx.seed(fx.bolts, dec!(10));
    let order = fx.engine.create_order(&admin(), fx.outbound(fx.bolts, dec!(8))).unwrap();

    fx.engine
        .ledger()
        .outbound(
            InventoryKey::new(fx.main, fx.bolts),
            dec!(5),
            &MovementContext::new(None, "walk-in sale"),
        )
        .unwrap();

    let Err(DomainError::InsufficientStock(shortage)) =
        fx.engine.advance(&admin(), order.id_typed(), Decision::Approve, None)
    else {
        panic!("expected a shortage");
    };
    assert_eq!(shortage.order_number.as_deref(), Some(order.number_str()));
    assert_eq!(
        fx.engine.get_order(order.id_typed()).unwrap().status(),
        OrderStatus::Pending
    );
    assert_eq!(fx.available(fx.bolts), dec!(5));
}

#[test]
fn approval_by_user_id_uses_the_resolved_role() {
    let fx = fixture();
    let directory = InMemoryRoleResolver::new();
    let (squad, clerk) = (UserId::new(), UserId::new());
    directory.register(squad, "sam", vec![Role::SquadLeader]);
    directory.register(clerk, "carl", Vec::new());

    let order = fx
        .engine
        .create_order(
            &admin(),
            NewOrder::new(
                OrderKind::Inbound,
                fx.single(BusinessType::PurchaseIn),
                vec![LineDraft::new(fx.nuts, dec!(3), dec!(1))],
            ),
        )
        .unwrap();
    let id = order.id_typed();

    assert!(matches!(
        fx.engine.advance_as(&directory, UserId::new(), id, Decision::Approve, None),
        Err(DomainError::NotFound(_))
    ));
    assert!(matches!(
        fx.engine.advance_as(&directory, clerk, id, Decision::Approve, None),
        Err(DomainError::Permission(_))
    ));

    let advanced = fx
        .engine
        .advance_as(&directory, squad, id, Decision::Approve, Some("checked".into()))
        .unwrap();
    assert_eq!(advanced.status(), OrderStatus::SquadApproved);
    assert_eq!(advanced.approved_by(), Some("sam"));
}

#[test]
fn rejection_is_terminal_and_moves_nothing() {
    let fx = fixture();
    fx.seed(fx.bolts, dec!(10));
    let id = fx
        .engine
        .create_order(&admin(), fx.outbound(fx.bolts, dec!(4)))
        .unwrap()
        .id_typed();

    let rejected = fx
        .engine
        .advance(&actor("sam", Role::SquadLeader), id, Decision::Reject, Some("duplicate".into()))
        .unwrap();
    assert_eq!(rejected.status(), OrderStatus::Rejected);
    assert!(matches!(
        fx.engine.advance(&admin(), id, Decision::Approve, None),
        Err(DomainError::InvalidState(_))
    ));
    assert_eq!(fx.available(fx.bolts), dec!(10));
}

#[test]
fn inbound_execution_receives_with_dates() {
    let fx = fixture();
    let expiry = NaiveDate::from_ymd_opt(2027, 3, 1).unwrap();
    let order = fx
        .engine
        .create_order(
            &admin(),
            NewOrder::new(
                OrderKind::Inbound,
                fx.single(BusinessType::PurchaseIn),
                vec![
                    LineDraft::new(fx.bolts, dec!(10), dec!(5)).with_dates(None, Some(expiry)),
                    LineDraft::new(fx.bolts, dec!(10), dec!(15)),
                ],
            ),
        )
        .unwrap();
    fx.engine
        .advance(&admin(), order.id_typed(), Decision::Approve, None)
        .unwrap();

    let executed = fx.engine.execute(&admin(), order.id_typed()).unwrap();

    assert_eq!(executed.status(), OrderStatus::Executed);
    assert_eq!(executed.operation_time(), Some(now()));
    assert_eq!(executed.executed_by(), Some("wendy"));
    let record = fx.engine.ledger().get(InventoryKey::new(fx.main, fx.bolts));
    assert_eq!(record.quantity(), dec!(20));
    assert_eq!(record.average_cost(), dec!(10));
    assert_eq!(record.expiry_date(), Some(expiry));
}

#[test]
fn stocktake_counts_report_and_reconcile() {
    let fx = fixture();
    fx.seed(fx.bolts, dec!(100));
    fx.seed(fx.nuts, dec!(40));

    let order = fx
        .engine
        .create_order(
            &admin(),
            NewOrder::new(OrderKind::Stocktake, fx.single(BusinessType::RegularCheck), Vec::new()),
        )
        .unwrap();
    assert_eq!(order.number_str(), "PD20261019001");
    assert_eq!(order.stocktake_lines().len(), 2);
    let line_of = |goods_id| {
        order
            .stocktake_lines()
            .iter()
            .find(|line| line.goods_id == goods_id)
            .map(|line| line.line_id)
            .unwrap()
    };
    let (bolt_line, nut_line) = (line_of(fx.bolts), line_of(fx.nuts));

    let id = order.id_typed();
    // Counting needs IN_PROGRESS.
    assert!(matches!(
        fx.engine.update_stocktake_line(&admin(), id, LineCount::new(bolt_line, dec!(90))),
        Err(DomainError::InvalidState(_))
    ));

    fx.engine.advance(&admin(), id, Decision::Approve, None).unwrap();
    let started = fx.engine.start_stocktake(&admin(), id).unwrap();
    assert_eq!(started.status(), OrderStatus::InProgress);

    let line = fx
        .engine
        .update_stocktake_line(&admin(), id, LineCount::new(bolt_line, dec!(90)).with_remark("shelf B"))
        .unwrap();
    assert_eq!(line.difference_quantity, dec!(-10));
    assert_eq!(line.counted_by.as_deref(), Some("wendy"));

    assert!(matches!(
        fx.engine
            .batch_update_stocktake_lines(&admin(), id, vec![LineCount::new(nut_line, dec!(-1))]),
        Err(DomainError::Validation(_))
    ));
    let counted = fx
        .engine
        .batch_update_stocktake_lines(&admin(), id, vec![LineCount::new(nut_line, dec!(40))])
        .unwrap();
    assert_eq!(counted.stocktake_summary().completed_items, 2);
    assert_eq!(counted.stocktake_summary().difference_items, 1);

    let differences = fx.engine.stocktake_differences(id).unwrap();
    assert_eq!(differences.len(), 1);
    assert_eq!(differences[0].goods_id, fx.bolts);

    let report = fx.engine.stocktake_report(id).unwrap();
    assert_eq!(report.loss_amount, dec!(20));
    assert_eq!(report.gain_amount, Decimal::ZERO);
    assert_eq!(report.normal_lines.len(), 1);

    let nut_version = fx.engine.ledger().get(InventoryKey::new(fx.main, fx.nuts)).version();
    let completed = fx.engine.execute(&admin(), id).unwrap();

    assert_eq!(completed.status(), OrderStatus::Executed);
    assert!(completed.stocktake_line(bolt_line).unwrap().is_adjusted);
    assert!(!completed.stocktake_line(nut_line).unwrap().is_adjusted);
    assert_eq!(fx.available(fx.bolts), dec!(90));
    let nuts = fx.engine.ledger().get(InventoryKey::new(fx.main, fx.nuts));
    assert_eq!(nuts.quantity(), dec!(40));
    assert_eq!(nuts.version(), nut_version);
}

#[test]
fn approval_snapshots_a_stocktake_created_on_an_empty_warehouse() {
    let fx = fixture();
    let order = fx
        .engine
        .create_order(
            &admin(),
            NewOrder::new(OrderKind::Stocktake, fx.single(BusinessType::SpotCheck), Vec::new()),
        )
        .unwrap();
    assert!(order.stocktake_lines().is_empty());

    fx.seed(fx.nuts, dec!(7));
    let approved = fx
        .engine
        .advance(&admin(), order.id_typed(), Decision::Approve, None)
        .unwrap();

    assert_eq!(approved.status(), OrderStatus::Approved);
    assert_eq!(approved.stocktake_lines().len(), 1);
    assert_eq!(approved.stocktake_lines()[0].book_quantity, dec!(7));
}

#[test]
fn stocktake_keeps_the_warehouse_its_sheet_was_counted_from() {
    let fx = fixture();
    fx.seed(fx.bolts, dec!(100));
    let annex = fx.master_data.add_warehouse("Annex");
    fx.engine
        .ledger()
        .inbound(
            InventoryKey::new(annex, fx.bolts),
            &Receipt::new(dec!(5), dec!(2)),
            &MovementContext::new(None, "seed"),
        )
        .unwrap();

    let order = fx
        .engine
        .create_order(
            &admin(),
            NewOrder::new(OrderKind::Stocktake, fx.single(BusinessType::RegularCheck), Vec::new()),
        )
        .unwrap();
    let id = order.id_typed();

    let moved = OrderHeader::new(Route::Single { warehouse_id: annex }, BusinessType::RegularCheck);
    assert!(matches!(
        fx.engine.update_order(&admin(), id, moved, Vec::new()),
        Err(DomainError::Validation(_))
    ));
    let unchanged = fx.engine.get_order(id).unwrap();
    assert_eq!(unchanged.route(), Some(Route::Single { warehouse_id: fx.main }));
    assert_eq!(unchanged.stocktake_lines()[0].book_quantity, dec!(100));

    // Header edits on the same warehouse still go through.
    let mut remarked = fx.single(BusinessType::RegularCheck);
    remarked.remark = Some("aisle 4 first".to_string());
    let revised = fx.engine.update_order(&admin(), id, remarked, Vec::new()).unwrap();
    assert_eq!(revised.header().and_then(|h| h.remark.as_deref()), Some("aisle 4 first"));
    assert_eq!(revised.stocktake_lines().len(), 1);

    assert_eq!(
        fx.engine.ledger().get(InventoryKey::new(annex, fx.bolts)).quantity(),
        dec!(5)
    );
}

#[test]
fn stocktake_operations_reject_other_kinds() {
    let fx = fixture();
    fx.seed(fx.bolts, dec!(10));
    let order = fx.engine.create_order(&admin(), fx.outbound(fx.bolts, dec!(1))).unwrap();

    assert!(matches!(
        fx.engine.stocktake_report(order.id_typed()),
        Err(DomainError::InvalidState(_))
    ));
    assert!(matches!(
        fx.engine.complete_stocktake(&admin(), order.id_typed()),
        Err(DomainError::InvalidState(_))
    ));
}

#[test]
fn overdue_and_approved_queues() {
    let fx = fixture();
    fx.seed(fx.bolts, dec!(10));

    let mut late = fx.single(BusinessType::PurchaseIn);
    late.planned_date = NaiveDate::from_ymd_opt(2026, 10, 18);
    let late = fx
        .engine
        .create_order(
            &admin(),
            NewOrder::new(OrderKind::Inbound, late, vec![LineDraft::new(fx.nuts, dec!(1), dec!(1))]),
        )
        .unwrap();
    let approved = fx.engine.create_order(&admin(), fx.outbound(fx.bolts, dec!(2))).unwrap();
    fx.engine
        .advance(&admin(), approved.id_typed(), Decision::Approve, None)
        .unwrap();

    let overdue = fx.engine.overdue_orders(today()).unwrap();
    assert_eq!(overdue.len(), 1);
    assert_eq!(overdue[0].id_typed(), late.id_typed());

    let queue = fx.engine.approved_not_executed().unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].id_typed(), approved.id_typed());
}

#[test]
fn warehouse_plan_and_day_lookups() {
    let fx = fixture();
    fx.seed(fx.bolts, dec!(10));
    let annex = fx.master_data.add_warehouse("Annex");

    let mut planned = fx.single(BusinessType::PurchaseIn);
    planned.planned_date = NaiveDate::from_ymd_opt(2026, 10, 25);
    let receipt = fx
        .engine
        .create_order(
            &admin(),
            NewOrder::new(OrderKind::Inbound, planned, vec![LineDraft::new(fx.nuts, dec!(1), dec!(1))]),
        )
        .unwrap();
    let transfer = fx
        .engine
        .create_order(
            &admin(),
            NewOrder::new(
                OrderKind::Transfer,
                OrderHeader::new(
                    Route::Transfer { source: fx.main, target: annex },
                    BusinessType::WarehouseTransfer,
                ),
                vec![LineDraft::new(fx.bolts, dec!(2), dec!(2))],
            ),
        )
        .unwrap();

    let ids = |orders: Vec<depot_orders::Order>| {
        orders.iter().map(|o| o.id_typed()).collect::<Vec<_>>()
    };

    assert_eq!(
        ids(fx.engine.list_orders_by_warehouse(OrderKind::Inbound, fx.main).unwrap()),
        vec![receipt.id_typed()]
    );
    assert!(fx.engine.list_orders_by_warehouse(OrderKind::Inbound, annex).unwrap().is_empty());
    assert_eq!(ids(fx.engine.transfers_from(fx.main).unwrap()), vec![transfer.id_typed()]);
    assert_eq!(ids(fx.engine.transfers_to(annex).unwrap()), vec![transfer.id_typed()]);
    assert!(fx.engine.transfers_to(fx.main).unwrap().is_empty());

    let week = today() + chrono::Duration::days(7);
    assert_eq!(
        ids(fx.engine.list_orders_planned_between(OrderKind::Inbound, today(), week).unwrap()),
        vec![receipt.id_typed()]
    );
    assert!(fx
        .engine
        .list_orders_planned_between(OrderKind::Inbound, today(), today())
        .unwrap()
        .is_empty());

    assert_eq!(
        ids(fx.engine.todays_orders(OrderKind::Transfer).unwrap()),
        vec![transfer.id_typed()]
    );
    assert!(fx.engine.todays_orders(OrderKind::Stocktake).unwrap().is_empty());
}

#[test]
fn reopening_the_store_rebuilds_the_index() {
    let master_data = Arc::new(InMemoryMasterData::new());
    let main = master_data.add_warehouse("Main");
    let goods = master_data.add_goods("Washer", "pcs", StockThresholds::default());
    let store = Arc::new(InMemoryEventStore::new());
    let ledger = || {
        InventoryLedger::new(Arc::clone(&master_data), Arc::new(RecordingAuditSink::new()))
            .with_clock(Arc::new(FixedClock(now())))
    };
    let inbound = || {
        NewOrder::new(
            OrderKind::Inbound,
            OrderHeader::new(Route::Single { warehouse_id: main }, BusinessType::PurchaseIn),
            vec![LineDraft::new(goods, dec!(1), dec!(1))],
        )
    };

    let first = WarehouseEngine::new(Arc::clone(&store), ledger()).unwrap();
    let order = first.create_order(&admin(), inbound()).unwrap();

    let reopened = WarehouseEngine::new(Arc::clone(&store), ledger()).unwrap();
    assert_eq!(
        reopened.find_order_by_number("IN20261019001").unwrap().id_typed(),
        order.id_typed()
    );
    assert_eq!(
        reopened.create_order(&admin(), inbound()).unwrap().number_str(),
        "IN20261019002"
    );
}
