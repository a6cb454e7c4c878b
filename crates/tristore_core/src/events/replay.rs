//! Deterministic state reconstruction.

use super::operator::{EvalError, Operator};
use super::{Event, State};
use thiserror::Error;

/// An event that could not be applied to the state built so far.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("event at {timestamp} cannot {op} item '{item}': {source}")]
pub(crate) struct ReplayError {
    pub(crate) timestamp: i64,
    pub(crate) item: String,
    pub(crate) op: Operator,
    #[source]
    pub(crate) source: EvalError,
}

/// Replays events in the order given, which must be ascending by timestamp.
///
/// Returns the timestamp of the last event and the resulting state, or
/// `None` if there are no events. Within one event, items are applied in
/// name order; they never depend on each other.
pub(crate) fn replay<I>(events: I) -> Result<Option<(i64, State)>, ReplayError>
where
    I: IntoIterator<Item = Event>,
{
    let mut state = State::new();
    let mut last = None;
    for event in events {
        for (item, (op, operand)) in event.changes {
            match op.evaluate(state.get(&item), operand) {
                Ok(Some(value)) => {
                    state.insert(item, value);
                }
                Ok(None) => {
                    state.remove(&item);
                }
                Err(source) => {
                    return Err(ReplayError {
                        timestamp: event.timestamp,
                        item,
                        op,
                        source,
                    })
                }
            }
        }
        last = Some(event.timestamp);
    }
    Ok(last.map(|t| (t, state)))
}
