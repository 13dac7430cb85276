//! Command execution pipeline for event-sourced aggregates.
//!
//! ```text
//! Command
//!   ↓
//! 1. Load the aggregate's stream
//!   ↓
//! 2. Rehydrate (apply history in sequence order)
//!   ↓
//! 3. Handle (pure decision, produces events)
//!   ↓
//! 4. Append with an exact expected version
//! ```
//!
//! Steps 1-3 and step 4 are exposed separately as [`CommandDispatcher::prepare`]
//! and [`CommandDispatcher::commit`] so a caller can make other work (ledger
//! movements) happen between the decision and the append, and drop the
//! prepared events if that work fails.

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use uuid::Uuid;

use depot_core::{Aggregate, AggregateId, DomainError, ExpectedVersion};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// The aggregate refused the command.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Optimistic concurrency failure (a concurrent writer appended first).
    #[error("concurrent modification: {0}")]
    Concurrency(String),

    /// A historical payload no longer matches the aggregate's event type.
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),

    #[error(transparent)]
    Store(EventStoreError),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            other => DispatchError::Store(other),
        }
    }
}

impl From<DispatchError> for DomainError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::Domain(e) => e,
            DispatchError::Concurrency(msg) => DomainError::conflict(msg),
            DispatchError::Deserialize(msg) => {
                DomainError::invalid_state(format!("stored history is unreadable: {msg}"))
            }
            DispatchError::Store(e) => DomainError::invalid_state(e.to_string()),
        }
    }
}

/// A decided but not yet persisted command.
///
/// `aggregate` already has the new events applied, so callers can inspect
/// the resulting state before committing.
#[derive(Debug, Clone)]
pub struct Prepared<A: Aggregate> {
    pub aggregate: A,
    pub events: Vec<A::Event>,
    aggregate_id: AggregateId,
    aggregate_type: String,
    expected: ExpectedVersion,
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// The dispatcher keeps domain code pure: aggregates only decide and evolve,
/// while loading, ordering checks and optimistic appends happen here.
#[derive(Debug)]
pub struct CommandDispatcher<S> {
    store: S,
}

impl<S> CommandDispatcher<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S> CommandDispatcher<S>
where
    S: EventStore,
{
    /// Rebuild an aggregate from its stream.
    pub fn load<A>(
        &self,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<A, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, &history)?;
        let mut aggregate = make_aggregate(aggregate_id);
        apply_history(&mut aggregate, &history)?;
        Ok(aggregate)
    }

    /// Load, rehydrate and decide, without persisting anything.
    pub fn prepare<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        command: &A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Prepared<A>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: DeserializeOwned,
    {
        let mut aggregate = self.load(aggregate_id, make_aggregate)?;
        let expected = ExpectedVersion::Exact(aggregate.version());

        let events = aggregate.handle(command)?;
        for event in &events {
            aggregate.apply(event);
        }

        Ok(Prepared {
            aggregate,
            events,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            expected,
        })
    }

    /// Append prepared events. Fails with `Concurrency` if anyone else
    /// appended to the stream since `prepare`.
    pub fn commit<A>(&self, prepared: Prepared<A>) -> Result<(A, Vec<StoredEvent>), DispatchError>
    where
        A: Aggregate,
        A::Event: depot_events::Event + Serialize,
    {
        if prepared.events.is_empty() {
            return Ok((prepared.aggregate, vec![]));
        }

        let uncommitted = prepared
            .events
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(
                    prepared.aggregate_id,
                    prepared.aggregate_type.clone(),
                    Uuid::now_v7(),
                    ev,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self.store.append(uncommitted, prepared.expected)?;
        Ok((prepared.aggregate, committed))
    }

    /// `prepare` followed by `commit`.
    pub fn dispatch<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        command: &A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<(A, Vec<StoredEvent>), DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: depot_events::Event + Serialize + DeserializeOwned,
    {
        let prepared = self.prepare(aggregate_id, aggregate_type, command, make_aggregate)?;
        self.commit(prepared)
    }
}

fn validate_loaded_stream(
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    // A buggy backend must not leak another stream or reorder this one.
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            ))));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

pub(crate) fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    let mut sorted = history.to_vec();
    sorted.sort_by_key(|e| e.sequence_number);

    for stored in sorted {
        let ev: A::Event = serde_json::from_value(stored.payload)
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }

    Ok(())
}
