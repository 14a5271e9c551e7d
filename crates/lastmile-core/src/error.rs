use thiserror::Error;
use uuid::Uuid;

use crate::stop::StopStatus;

/// Errors from the store and sequencer state machines.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The referenced stop does not exist in the store.
    #[error("unknown stop {0}")]
    UnknownStop(Uuid),

    /// The requested status change violates the lifecycle table.
    #[error("invalid status transition for stop {local_id}: {from} -> {to}")]
    InvalidTransition {
        local_id: Uuid,
        from: StopStatus,
        to: StopStatus,
    },

    /// An operation that requires a current stop found none.
    #[error("no stop is awaiting an outcome")]
    NoPendingStop,

    /// An operation that requires *no* current stop found one; the
    /// single-pending invariant would be broken.
    #[error("stop {0} is already awaiting an outcome")]
    PendingStopExists(Uuid),

    /// `retry_failed` was called with nothing to retry.
    #[error("no failed stops to re-admit")]
    NoFailedStops,

    /// The referenced stop is not part of the current route run.
    #[error("stop {0} is not part of this route run")]
    NotInRun(Uuid),

    /// A summary was requested while stops were still undecided.
    #[error("route run still has undecided stops ({remaining} remaining)")]
    RunStillActive { remaining: usize },
}
