//! The execution sequencer: a strictly sequential, resumable confirmation
//! walk over a route run's ordered stop list.
//!
//! The sequencer is deliberately pure state: it mutates only the store and
//! performs no I/O. The engine wraps [`apply_outcome`] with the authority
//! round-trip so that local state changes only after acknowledgement.
//!
//! Invariant: at most one stop is `ExecutionPending` at any time — the one
//! with the lowest `order` among stops without a recorded outcome. Status
//! tags drive the walk; positions in the run list are never spliced, so
//! retries cannot corrupt ordering.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::CoreError;
use crate::run::RouteRun;
use crate::stop::{Stop, StopStatus};
use crate::store::StopStore;

/// A confirmed delivery outcome for the current stop.
#[derive(Debug, Clone)]
pub struct StopOutcome {
    pub success: bool,
    pub note: Option<String>,
}

/// Where the walk stands after applying an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// The walk advanced; this stop is now awaiting an outcome.
    Advanced(Uuid),
    /// Every stop has a recorded outcome; the run is finished.
    Finished,
}

/// Orders the run's stop ids by authority order, capture order breaking
/// ties (stops in the same building share an order).
pub(crate) fn order_of(store: &StopStore, id: Uuid) -> u32 {
    store.get(id).and_then(|s| s.order).unwrap_or(u32::MAX)
}

/// The current stop: the single `ExecutionPending` entry of the run.
#[must_use]
pub fn current<'a>(store: &'a StopStore, run: &RouteRun) -> Option<&'a Stop> {
    run.stop_ids
        .iter()
        .filter_map(|id| store.get(*id))
        .find(|s| s.status == StopStatus::ExecutionPending)
}

/// Activates the first undecided stop of the run.
///
/// Called once when the run starts, and again after a snapshot restore if
/// the pointer was lost.
///
/// # Errors
///
/// - [`CoreError::PendingStopExists`] if a stop is already pending.
/// - [`CoreError::NoPendingStop`] if every stop already has an outcome.
pub fn activate_first(store: &mut StopStore, run: &RouteRun) -> Result<Uuid, CoreError> {
    if let Some(pending) = current(store, run) {
        return Err(CoreError::PendingStopExists(pending.local_id));
    }
    let next = run
        .stop_ids
        .iter()
        .copied()
        .filter(|id| {
            store
                .get(*id)
                .is_some_and(|s| s.status == StopStatus::Sequenced)
        })
        .min_by_key(|id| order_of(store, *id))
        .ok_or(CoreError::NoPendingStop)?;
    store.transition(next, StopStatus::ExecutionPending)?;
    Ok(next)
}

/// Records an acknowledged outcome on the current stop and advances the
/// walk.
///
/// `local_id` must be the current stop — outcomes for any other stop are
/// rejected, which is what makes progression exactly-once: a duplicate
/// acknowledgement arriving after the walk advanced cannot re-apply.
///
/// # Errors
///
/// - [`CoreError::NoPendingStop`] if the run has no current stop.
/// - [`CoreError::NotInRun`] if `local_id` is not the current stop.
pub fn apply_outcome(
    store: &mut StopStore,
    run: &RouteRun,
    local_id: Uuid,
    outcome: &StopOutcome,
    at: DateTime<Utc>,
) -> Result<Progress, CoreError> {
    let pending = current(store, run).ok_or(CoreError::NoPendingStop)?;
    if pending.local_id != local_id {
        return Err(CoreError::NotInRun(local_id));
    }

    let to = if outcome.success {
        StopStatus::Completed
    } else {
        StopStatus::Failed
    };
    store.transition(local_id, to)?;
    let stop = store.get_mut(local_id)?;
    stop.outcome_note = outcome.note.clone();
    stop.outcome_at = Some(at);

    match activate_first(store, run) {
        Ok(next) => Ok(Progress::Advanced(next)),
        Err(CoreError::NoPendingStop) => Ok(Progress::Finished),
        Err(other) => Err(other),
    }
}

/// Re-admits the first `Failed` stop (in authority order) as the current
/// stop, clearing its prior outcome. No other stop is touched and the run
/// ordering is unchanged.
///
/// # Errors
///
/// - [`CoreError::PendingStopExists`] while another stop is still pending.
/// - [`CoreError::NoFailedStops`] if there is nothing to retry.
pub fn retry_failed(store: &mut StopStore, run: &RouteRun) -> Result<Uuid, CoreError> {
    if let Some(pending) = current(store, run) {
        return Err(CoreError::PendingStopExists(pending.local_id));
    }
    let target = run
        .stop_ids
        .iter()
        .copied()
        .filter(|id| {
            store
                .get(*id)
                .is_some_and(|s| s.status == StopStatus::Failed)
        })
        .min_by_key(|id| order_of(store, *id))
        .ok_or(CoreError::NoFailedStops)?;
    store.transition(target, StopStatus::ExecutionPending)?;
    store.get_mut(target)?.clear_outcome();
    Ok(target)
}

/// Read-only look at any stop of the run, for re-inspection. Selecting a
/// non-current stop never changes its status.
///
/// # Errors
///
/// Returns [`CoreError::NotInRun`] if the stop is not part of the run.
pub fn jump_to<'a>(
    store: &'a StopStore,
    run: &RouteRun,
    local_id: Uuid,
) -> Result<&'a Stop, CoreError> {
    if !run.stop_ids.contains(&local_id) {
        return Err(CoreError::NotInRun(local_id));
    }
    store.get(local_id).ok_or(CoreError::UnknownStop(local_id))
}

/// Whether every stop of the run has an acknowledged outcome.
#[must_use]
pub fn is_finished(store: &StopStore, run: &RouteRun) -> bool {
    run.stop_ids
        .iter()
        .all(|id| store.get(*id).is_some_and(|s| s.status.is_terminal()))
}
