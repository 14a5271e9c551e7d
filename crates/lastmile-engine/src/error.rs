use thiserror::Error;
use uuid::Uuid;

use lastmile_authority::AuthorityError;
use lastmile_core::CoreError;

/// Errors surfaced by the delivery engine.
///
/// All of these are value-returned to the host so it can render a
/// recoverable, user-actionable message; none is used as control flow.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Local precondition: not enough stops for the requested operation.
    /// Checked before any network call.
    #[error("not enough stops: have {have}, need at least {need}")]
    InsufficientStops { have: usize, need: usize },

    /// A stop reached route submission without resolvable geometry.
    #[error("stop {0} has no coordinates; it cannot be routed")]
    MissingCoordinates(Uuid),

    /// `start_route` was called before a route was computed.
    #[error("no route has been computed yet")]
    RouteNotComputed,

    /// A run is already in progress; it must finish or be abandoned first.
    #[error("route run {0} is already in progress")]
    RunAlreadyStarted(i64),

    /// An execution operation was requested before `start_route`.
    #[error("no route run has been started")]
    RunNotStarted,

    /// A run stop is missing its execution identifier; the authority
    /// record that should have carried it never reconciled.
    #[error("stop {0} has no execution identifier")]
    MissingExecutionId(Uuid),

    /// The authority declined the outcome without reporting a previously
    /// recorded one.
    #[error("authority did not acknowledge the outcome (run status: {run_status})")]
    OutcomeRejected { run_status: String },

    /// The authority holds a different outcome for this execution id.
    /// Surfaced as a hard error, never auto-resolved.
    #[error("outcome conflict for execution {execution_id}: authority holds '{existing}', submitted '{submitted}'")]
    IdempotencyConflict {
        execution_id: i64,
        existing: String,
        submitted: String,
    },

    /// Transport or authority failure. The step aborted without partial
    /// commit and may be retried in full.
    #[error(transparent)]
    Authority(#[from] AuthorityError),

    /// Store or sequencer state machine violation.
    #[error(transparent)]
    Core(#[from] CoreError),
}
