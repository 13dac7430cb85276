/// Execute an aggregate command in place: decide, then evolve.
///
/// Calls `handle` and applies every returned event, returning the events.
/// Nothing is persisted; the infra `CommandDispatcher` adds storage and
/// optimistic concurrency on top of the same two steps.
pub fn execute<A>(
    aggregate: &mut A,
    command: &A::Command,
) -> Result<Vec<A::Event>, A::Error>
where
    A: depot_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
