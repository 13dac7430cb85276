use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use depot_auth::Role;
use depot_core::{Aggregate, AggregateRoot, DomainError, LineId, OrderId, WarehouseId};
use depot_events::Event;

use crate::approval::{ApprovalStep, Decision, next_status};
use crate::kind::{BusinessType, OrderKind, StocktakeType, TransferPriority};
use crate::line::{OrderLine, OrderTotals};
use crate::numbering::OrderNumber;
use crate::status::OrderStatus;
use crate::stocktake::{LineCount, StocktakeLine, StocktakeSummary};

/// Where an order's stock lives.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Route {
    /// Inbound, outbound and stocktake orders.
    Single { warehouse_id: WarehouseId },
    Transfer {
        source: WarehouseId,
        target: WarehouseId,
    },
}

impl Route {
    /// The warehouse stock is received into, issued from, counted in or
    /// transferred out of.
    pub fn primary(&self) -> WarehouseId {
        match self {
            Route::Single { warehouse_id } => *warehouse_id,
            Route::Transfer { source, .. } => *source,
        }
    }

    pub fn target(&self) -> Option<WarehouseId> {
        match self {
            Route::Single { .. } => None,
            Route::Transfer { target, .. } => Some(*target),
        }
    }

    pub fn warehouses(&self) -> Vec<WarehouseId> {
        match self {
            Route::Single { warehouse_id } => vec![*warehouse_id],
            Route::Transfer { source, target } => vec![*source, *target],
        }
    }
}

/// Editable header fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderHeader {
    pub route: Route,
    pub business_type: BusinessType,
    pub planned_date: Option<NaiveDate>,
    pub reference_number: Option<String>,
    /// Supplier for inbound, recipient for outbound.
    pub counterparty: Option<String>,
    pub priority: Option<TransferPriority>,
    pub stocktake_type: Option<StocktakeType>,
    pub remark: Option<String>,
}

impl OrderHeader {
    pub fn new(route: Route, business_type: BusinessType) -> Self {
        Self {
            route,
            business_type,
            planned_date: None,
            reference_number: None,
            counterparty: None,
            priority: None,
            stocktake_type: None,
            remark: None,
        }
    }

    fn validate_for(&self, kind: OrderKind) -> Result<(), DomainError> {
        if self.business_type.kind() != kind {
            return Err(DomainError::validation(format!(
                "business type {} does not belong to {} orders",
                self.business_type, kind
            )));
        }
        match (kind, self.route) {
            (OrderKind::Transfer, Route::Transfer { source, target }) => {
                if source == target {
                    return Err(DomainError::validation(
                        "transfer source and target warehouse must differ",
                    ));
                }
            }
            (OrderKind::Transfer, Route::Single { .. }) => {
                return Err(DomainError::validation(
                    "transfer orders need a source and a target warehouse",
                ));
            }
            (_, Route::Transfer { .. }) => {
                return Err(DomainError::validation(format!(
                    "{kind} orders carry exactly one warehouse"
                )));
            }
            (_, Route::Single { .. }) => {}
        }
        Ok(())
    }
}

/// How a document came into existence.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderOrigin {
    /// Created by a caller; starts PENDING.
    Manual,
    /// Derived from another document whose stock already moved; starts EXECUTED.
    Synthesized { executed_at: DateTime<Utc> },
}

/// Aggregate root: an order document of any kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    kind: OrderKind,
    number: Option<OrderNumber>,
    header: Option<OrderHeader>,
    status: OrderStatus,
    lines: Vec<OrderLine>,
    totals: OrderTotals,
    stocktake_lines: Vec<StocktakeLine>,
    stocktake_summary: StocktakeSummary,
    approvals: Vec<ApprovalStep>,
    approved_at: Option<DateTime<Utc>>,
    approved_by: Option<String>,
    started_at: Option<DateTime<Utc>>,
    operation_time: Option<DateTime<Utc>>,
    actual_date: Option<NaiveDate>,
    executed_by: Option<String>,
    cancel_reason: Option<String>,
    cancelled_at: Option<DateTime<Utc>>,
    cancelled_by: Option<String>,
    created_by: Option<String>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    deleted: bool,
    version: u64,
    created: bool,
}

impl Order {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: OrderId) -> Self {
        Self {
            id,
            kind: OrderKind::Inbound,
            number: None,
            header: None,
            status: OrderStatus::Pending,
            lines: Vec::new(),
            totals: OrderTotals::default(),
            stocktake_lines: Vec::new(),
            stocktake_summary: StocktakeSummary::default(),
            approvals: Vec::new(),
            approved_at: None,
            approved_by: None,
            started_at: None,
            operation_time: None,
            actual_date: None,
            executed_by: None,
            cancel_reason: None,
            cancelled_at: None,
            cancelled_by: None,
            created_by: None,
            created_at: None,
            updated_at: None,
            deleted: false,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn kind(&self) -> OrderKind {
        self.kind
    }

    pub fn number(&self) -> Option<&OrderNumber> {
        self.number.as_ref()
    }

    /// Order number for messages; empty before creation.
    pub fn number_str(&self) -> &str {
        self.number.as_ref().map(OrderNumber::as_str).unwrap_or_default()
    }

    pub fn header(&self) -> Option<&OrderHeader> {
        self.header.as_ref()
    }

    pub fn route(&self) -> Option<Route> {
        self.header.as_ref().map(|h| h.route)
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn totals(&self) -> OrderTotals {
        self.totals
    }

    pub fn stocktake_lines(&self) -> &[StocktakeLine] {
        &self.stocktake_lines
    }

    pub fn stocktake_line(&self, line_id: LineId) -> Option<&StocktakeLine> {
        self.stocktake_lines.iter().find(|l| l.line_id == line_id)
    }

    pub fn stocktake_summary(&self) -> StocktakeSummary {
        self.stocktake_summary
    }

    pub fn approvals(&self) -> &[ApprovalStep] {
        &self.approvals
    }

    pub fn approved_at(&self) -> Option<DateTime<Utc>> {
        self.approved_at
    }

    pub fn approved_by(&self) -> Option<&str> {
        self.approved_by.as_deref()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn operation_time(&self) -> Option<DateTime<Utc>> {
        self.operation_time
    }

    pub fn actual_date(&self) -> Option<NaiveDate> {
        self.actual_date
    }

    pub fn executed_by(&self) -> Option<&str> {
        self.executed_by.as_deref()
    }

    pub fn cancel_reason(&self) -> Option<&str> {
        self.cancel_reason.as_deref()
    }

    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        self.cancelled_at
    }

    pub fn created_by(&self) -> Option<&str> {
        self.created_by.as_deref()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn exists(&self) -> bool {
        self.created && !self.deleted
    }
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateOrder.
///
/// `number` is reserved by the caller; `stocktake_lines` carries the ledger
/// snapshot for stocktakes and is empty otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrder {
    pub order_id: OrderId,
    pub kind: OrderKind,
    pub number: OrderNumber,
    pub header: OrderHeader,
    pub lines: Vec<OrderLine>,
    pub stocktake_lines: Vec<StocktakeLine>,
    pub origin: OrderOrigin,
    pub created_by: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReviseOrder (replaces header and lines wholesale).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviseOrder {
    pub header: OrderHeader,
    pub lines: Vec<OrderLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeleteOrder (soft delete).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOrder {
    pub occurred_at: DateTime<Utc>,
}

/// Command: AdvanceApproval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvanceApproval {
    pub role: Role,
    pub actor_name: String,
    pub decision: Decision,
    pub remark: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: TakeSnapshot (stocktake only, when no lines exist yet).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TakeSnapshot {
    pub lines: Vec<StocktakeLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: StartStocktake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartStocktake {
    pub started_by: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordCounts (one or more count entries, applied together).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordCounts {
    pub counts: Vec<LineCount>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkExecuted.
///
/// For stocktakes, `adjusted_lines` lists the lines whose difference was
/// pushed to the ledger in the same transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkExecuted {
    pub executed_by: String,
    pub adjusted_lines: Vec<LineId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOrder {
    pub reason: String,
    pub cancelled_by: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderCommand {
    Create(CreateOrder),
    Revise(ReviseOrder),
    Delete(DeleteOrder),
    AdvanceApproval(AdvanceApproval),
    TakeSnapshot(TakeSnapshot),
    StartStocktake(StartStocktake),
    RecordCounts(RecordCounts),
    MarkExecuted(MarkExecuted),
    Cancel(CancelOrder),
}

/// Event: OrderCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub order_id: OrderId,
    pub kind: OrderKind,
    pub number: OrderNumber,
    pub header: OrderHeader,
    pub lines: Vec<OrderLine>,
    pub stocktake_lines: Vec<StocktakeLine>,
    pub origin: OrderOrigin,
    pub created_by: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderRevised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRevised {
    pub header: OrderHeader,
    pub lines: Vec<OrderLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderDeleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDeleted {
    pub occurred_at: DateTime<Utc>,
}

/// Event: ApprovalAdvanced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalAdvanced {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub role: Role,
    pub actor_name: String,
    pub decision: Decision,
    pub remark: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SnapshotTaken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotTaken {
    pub lines: Vec<StocktakeLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StocktakeStarted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StocktakeStarted {
    pub started_by: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LinesCounted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinesCounted {
    pub counts: Vec<LineCount>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderExecuted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderExecuted {
    pub executed_by: String,
    pub adjusted_lines: Vec<LineId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancelled {
    pub previous_status: OrderStatus,
    pub reason: String,
    pub cancelled_by: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    OrderCreated(OrderCreated),
    OrderRevised(OrderRevised),
    OrderDeleted(OrderDeleted),
    ApprovalAdvanced(ApprovalAdvanced),
    SnapshotTaken(SnapshotTaken),
    StocktakeStarted(StocktakeStarted),
    LinesCounted(LinesCounted),
    OrderExecuted(OrderExecuted),
    OrderCancelled(OrderCancelled),
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderCreated(_) => "order.created",
            OrderEvent::OrderRevised(_) => "order.revised",
            OrderEvent::OrderDeleted(_) => "order.deleted",
            OrderEvent::ApprovalAdvanced(_) => "order.approval_advanced",
            OrderEvent::SnapshotTaken(_) => "order.stocktake.snapshot_taken",
            OrderEvent::StocktakeStarted(_) => "order.stocktake.started",
            OrderEvent::LinesCounted(_) => "order.stocktake.lines_counted",
            OrderEvent::OrderExecuted(_) => "order.executed",
            OrderEvent::OrderCancelled(_) => "order.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::OrderCreated(e) => e.occurred_at,
            OrderEvent::OrderRevised(e) => e.occurred_at,
            OrderEvent::OrderDeleted(e) => e.occurred_at,
            OrderEvent::ApprovalAdvanced(e) => e.occurred_at,
            OrderEvent::SnapshotTaken(e) => e.occurred_at,
            OrderEvent::StocktakeStarted(e) => e.occurred_at,
            OrderEvent::LinesCounted(e) => e.occurred_at,
            OrderEvent::OrderExecuted(e) => e.occurred_at,
            OrderEvent::OrderCancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Order {
    type Command = OrderCommand;
    type Event = OrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrderEvent::OrderCreated(e) => {
                self.id = e.order_id;
                self.kind = e.kind;
                self.number = Some(e.number.clone());
                self.header = Some(e.header.clone());
                self.lines = e.lines.clone();
                self.totals = OrderTotals::from_lines(&self.lines);
                self.stocktake_lines = e.stocktake_lines.clone();
                self.created_by = Some(e.created_by.clone());
                self.created_at = Some(e.occurred_at);
                self.status = OrderStatus::Pending;
                if let OrderOrigin::Synthesized { executed_at } = e.origin {
                    self.status = OrderStatus::Executed;
                    self.operation_time = Some(executed_at);
                    self.actual_date = Some(executed_at.date_naive());
                    self.executed_by = Some(e.created_by.clone());
                }
                self.created = true;
            }
            OrderEvent::OrderRevised(e) => {
                self.header = Some(e.header.clone());
                self.lines = e.lines.clone();
                self.totals = OrderTotals::from_lines(&self.lines);
            }
            OrderEvent::OrderDeleted(_) => {
                self.deleted = true;
            }
            OrderEvent::ApprovalAdvanced(e) => {
                self.status = e.to;
                self.approved_at = Some(e.occurred_at);
                self.approved_by = Some(e.actor_name.clone());
                self.approvals.push(ApprovalStep {
                    from: e.from,
                    to: e.to,
                    role: e.role,
                    actor_name: e.actor_name.clone(),
                    decision: e.decision,
                    remark: e.remark.clone(),
                    at: e.occurred_at,
                });
            }
            OrderEvent::SnapshotTaken(e) => {
                self.stocktake_lines = e.lines.clone();
            }
            OrderEvent::StocktakeStarted(e) => {
                self.status = OrderStatus::InProgress;
                self.started_at = Some(e.occurred_at);
            }
            OrderEvent::LinesCounted(e) => {
                for count in &e.counts {
                    if let Some(line) = self
                        .stocktake_lines
                        .iter_mut()
                        .find(|l| l.line_id == count.line_id)
                    {
                        line.record_count(count);
                    }
                }
            }
            OrderEvent::OrderExecuted(e) => {
                for line in self
                    .stocktake_lines
                    .iter_mut()
                    .filter(|l| e.adjusted_lines.contains(&l.line_id))
                {
                    line.is_adjusted = true;
                }
                self.status = OrderStatus::Executed;
                self.operation_time = Some(e.occurred_at);
                self.actual_date = Some(e.occurred_at.date_naive());
                self.executed_by = Some(e.executed_by.clone());
            }
            OrderEvent::OrderCancelled(e) => {
                self.status = OrderStatus::Cancelled;
                self.cancel_reason = Some(e.reason.clone());
                self.cancelled_at = Some(e.occurred_at);
                self.cancelled_by = Some(e.cancelled_by.clone());
            }
        }

        if self.kind == OrderKind::Stocktake {
            self.stocktake_summary = StocktakeSummary::from_lines(&self.stocktake_lines);
        }
        self.updated_at = Some(event.occurred_at());
        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::Create(cmd) => self.handle_create(cmd),
            OrderCommand::Revise(cmd) => self.handle_revise(cmd),
            OrderCommand::Delete(cmd) => self.handle_delete(cmd),
            OrderCommand::AdvanceApproval(cmd) => self.handle_advance(cmd),
            OrderCommand::TakeSnapshot(cmd) => self.handle_snapshot(cmd),
            OrderCommand::StartStocktake(cmd) => self.handle_start(cmd),
            OrderCommand::RecordCounts(cmd) => self.handle_counts(cmd),
            OrderCommand::MarkExecuted(cmd) => self.handle_execute(cmd),
            OrderCommand::Cancel(cmd) => self.handle_cancel(cmd),
        }
    }
}

fn validate_lines(kind: OrderKind, lines: &[OrderLine]) -> Result<(), DomainError> {
    if kind == OrderKind::Stocktake {
        if !lines.is_empty() {
            return Err(DomainError::validation(
                "stocktake orders take their lines from the ledger snapshot",
            ));
        }
        return Ok(());
    }
    if lines.is_empty() {
        return Err(DomainError::validation("order must have at least one line"));
    }
    lines.iter().try_for_each(OrderLine::validate)
}

impl Order {
    fn ensure_live(&self) -> Result<(), DomainError> {
        if !self.exists() {
            return Err(DomainError::not_found(format!("order {}", self.id)));
        }
        Ok(())
    }

    fn ensure_status(&self, expected: OrderStatus, action: &str) -> Result<(), DomainError> {
        if self.status != expected {
            return Err(DomainError::invalid_state(format!(
                "cannot {action} order {} in status {} (requires {expected})",
                self.number_str(),
                self.status
            )));
        }
        Ok(())
    }

    fn ensure_stocktake(&self, action: &str) -> Result<(), DomainError> {
        if self.kind != OrderKind::Stocktake {
            return Err(DomainError::invalid_state(format!(
                "cannot {action} on {} order {}",
                self.kind,
                self.number_str()
            )));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateOrder) -> Result<Vec<OrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict(format!("order {} already exists", cmd.order_id)));
        }
        if cmd.order_id != self.id {
            return Err(DomainError::validation("order id does not match the stream"));
        }
        cmd.header.validate_for(cmd.kind)?;
        validate_lines(cmd.kind, &cmd.lines)?;
        if cmd.kind != OrderKind::Stocktake && !cmd.stocktake_lines.is_empty() {
            return Err(DomainError::validation("only stocktake orders carry count lines"));
        }

        Ok(vec![OrderEvent::OrderCreated(OrderCreated {
            order_id: cmd.order_id,
            kind: cmd.kind,
            number: cmd.number.clone(),
            header: cmd.header.clone(),
            lines: cmd.lines.clone(),
            stocktake_lines: cmd.stocktake_lines.clone(),
            origin: cmd.origin,
            created_by: cmd.created_by.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_revise(&self, cmd: &ReviseOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_live()?;
        self.ensure_status(OrderStatus::Pending, "edit")?;
        cmd.header.validate_for(self.kind)?;
        validate_lines(self.kind, &cmd.lines)?;
        // The count sheet was snapshotted from this warehouse.
        if self.kind == OrderKind::Stocktake && self.route() != Some(cmd.header.route) {
            return Err(DomainError::validation(format!(
                "stocktake {} cannot move to another warehouse",
                self.number_str()
            )));
        }

        Ok(vec![OrderEvent::OrderRevised(OrderRevised {
            header: cmd.header.clone(),
            lines: cmd.lines.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_live()?;
        self.ensure_status(OrderStatus::Pending, "delete")?;

        Ok(vec![OrderEvent::OrderDeleted(OrderDeleted {
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_advance(&self, cmd: &AdvanceApproval) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_live()?;
        let to = next_status(self.status, cmd.role, cmd.decision).map_err(|e| match e {
            DomainError::InvalidState(msg) => {
                DomainError::invalid_state(format!("{}: {msg}", self.number_str()))
            }
            DomainError::Permission(msg) => {
                DomainError::permission(format!("{}: {msg}", self.number_str()))
            }
            other => other,
        })?;

        Ok(vec![OrderEvent::ApprovalAdvanced(ApprovalAdvanced {
            from: self.status,
            to,
            role: cmd.role,
            actor_name: cmd.actor_name.clone(),
            decision: cmd.decision,
            remark: cmd.remark.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_snapshot(&self, cmd: &TakeSnapshot) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_live()?;
        self.ensure_stocktake("take a snapshot")?;
        if self.status.is_terminal() {
            return Err(DomainError::invalid_state(format!(
                "stocktake {} is already {}",
                self.number_str(),
                self.status
            )));
        }
        if !self.stocktake_lines.is_empty() {
            return Err(DomainError::invalid_state(format!(
                "stocktake {} already has a snapshot",
                self.number_str()
            )));
        }

        Ok(vec![OrderEvent::SnapshotTaken(SnapshotTaken {
            lines: cmd.lines.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_start(&self, cmd: &StartStocktake) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_live()?;
        self.ensure_stocktake("start counting")?;
        self.ensure_status(OrderStatus::Approved, "start")?;

        Ok(vec![OrderEvent::StocktakeStarted(StocktakeStarted {
            started_by: cmd.started_by.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_counts(&self, cmd: &RecordCounts) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_live()?;
        self.ensure_stocktake("record counts")?;
        self.ensure_status(OrderStatus::InProgress, "record counts on")?;
        if cmd.counts.is_empty() {
            return Err(DomainError::validation("no counts given"));
        }
        for count in &cmd.counts {
            if self.stocktake_line(count.line_id).is_none() {
                return Err(DomainError::not_found(format!(
                    "line {} on stocktake {}",
                    count.line_id,
                    self.number_str()
                )));
            }
            if count.actual_quantity.is_some_and(|q| q < rust_decimal::Decimal::ZERO) {
                return Err(DomainError::validation(format!(
                    "line {}: counted quantity must not be negative",
                    count.line_id
                )));
            }
        }

        Ok(vec![OrderEvent::LinesCounted(LinesCounted {
            counts: cmd.counts.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_execute(&self, cmd: &MarkExecuted) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_live()?;
        if self.kind == OrderKind::Stocktake {
            self.ensure_status(OrderStatus::InProgress, "complete")?;
            for line_id in &cmd.adjusted_lines {
                if !self
                    .stocktake_line(*line_id)
                    .is_some_and(StocktakeLine::needs_adjustment)
                {
                    return Err(DomainError::invalid_state(format!(
                        "line {line_id} on stocktake {} has nothing to adjust",
                        self.number_str()
                    )));
                }
            }
        } else {
            self.ensure_status(OrderStatus::Approved, "execute")?;
            if !cmd.adjusted_lines.is_empty() {
                return Err(DomainError::validation("only stocktakes adjust lines"));
            }
        }

        Ok(vec![OrderEvent::OrderExecuted(OrderExecuted {
            executed_by: cmd.executed_by.clone(),
            adjusted_lines: cmd.adjusted_lines.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_live()?;
        if self.operation_time.is_some() {
            return Err(DomainError::invalid_state(format!(
                "order {} was already executed",
                self.number_str()
            )));
        }
        if self.status == OrderStatus::Cancelled {
            return Err(DomainError::invalid_state(format!(
                "order {} is already cancelled",
                self.number_str()
            )));
        }
        if cmd.reason.trim().is_empty() {
            return Err(DomainError::validation("cancellation needs a reason"));
        }

        Ok(vec![OrderEvent::OrderCancelled(OrderCancelled {
            previous_status: self.status,
            reason: cmd.reason.clone(),
            cancelled_by: cmd.cancelled_by.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
