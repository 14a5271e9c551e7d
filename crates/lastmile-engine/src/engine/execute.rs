//! Execution phase: the acknowledgement-gated confirmation walk.
//!
//! Local state never moves ahead of the authority: an outcome is sent
//! first, and only an acknowledgement (or an identical previously recorded
//! outcome, which is the same thing replayed) lets the sequencer record it
//! and advance. A transport failure leaves the current stop pending, so
//! the driver retries the same confirmation.

use chrono::Utc;
use uuid::Uuid;

use lastmile_authority::types::{LatLng, OutcomeKind, OutcomeRequest};
use lastmile_authority::AuthorityError;
use lastmile_core::sequencer::{self, Progress, StopOutcome};
use lastmile_core::{CoreError, Stop};

use crate::engine::DeliveryEngine;
use crate::error::EngineError;

/// Where the walk stands after a confirmed outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryProgress {
    /// The walk advanced to this stop.
    Advanced(Uuid),
    /// Every stop has an acknowledged outcome.
    Finished,
}

impl DeliveryEngine {
    /// Records an outcome for the current stop.
    ///
    /// The outcome is submitted to the authority first; the local
    /// transition happens only on acknowledgement. If the authority
    /// already holds the identical outcome for this execution id, that is
    /// a replayed confirmation and counts as acknowledged.
    ///
    /// `at` is the driver's position at confirmation time, when known.
    ///
    /// # Errors
    ///
    /// - [`EngineError::RunNotStarted`] before `start_route`.
    /// - [`lastmile_core::CoreError::NoPendingStop`] with no current stop.
    /// - [`EngineError::MissingExecutionId`] if the current stop never
    ///   received an execution identifier.
    /// - [`EngineError::IdempotencyConflict`] if the authority holds a
    ///   different outcome for this execution id.
    /// - [`EngineError::OutcomeRejected`] if the authority declined
    ///   without reporting a previous outcome.
    /// - [`EngineError::Authority`] on transport failure; the stop stays
    ///   pending.
    pub async fn record_outcome(
        &mut self,
        outcome: StopOutcome,
        at: Option<(f64, f64)>,
    ) -> Result<DeliveryProgress, EngineError> {
        let run = self.run.clone().ok_or(EngineError::RunNotStarted)?;
        let current = sequencer::current(&self.store, &run).ok_or(CoreError::NoPendingStop)?;
        let local_id = current.local_id;
        let execution_id = current
            .execution_id
            .ok_or(EngineError::MissingExecutionId(local_id))?;

        let kind = if outcome.success {
            OutcomeKind::Completed
        } else {
            OutcomeKind::Failed
        };
        let request = OutcomeRequest {
            execution_id,
            outcome: kind,
            note: outcome.note.clone(),
            location: at.map(|(latitude, longitude)| LatLng {
                latitude,
                longitude,
            }),
        };

        let response = match self.client.record_outcome(&request).await {
            Ok(response) => response,
            Err(AuthorityError::OutcomeConflict {
                execution_id,
                existing,
                submitted,
            }) => {
                return Err(EngineError::IdempotencyConflict {
                    execution_id,
                    existing,
                    submitted,
                });
            }
            Err(err) => return Err(err.into()),
        };
        if !response.acknowledged && response.previous_outcome.is_none() {
            return Err(EngineError::OutcomeRejected {
                run_status: response.run_status,
            });
        }
        if response.previous_outcome.is_some() {
            tracing::info!(execution_id, outcome = %kind, "outcome was already recorded; replaying locally");
        }

        let progress = sequencer::apply_outcome(&mut self.store, &run, local_id, &outcome, Utc::now())?;
        tracing::info!(%local_id, execution_id, outcome = %kind, "outcome acknowledged");
        Ok(match progress {
            Progress::Advanced(next) => DeliveryProgress::Advanced(next),
            Progress::Finished => DeliveryProgress::Finished,
        })
    }

    /// Re-admits the first failed stop for another attempt. Purely local:
    /// the authority learns of the retry when its outcome is recorded,
    /// replacing the failed one under the same execution id.
    ///
    /// # Errors
    ///
    /// - [`EngineError::RunNotStarted`] before `start_route`.
    /// - [`lastmile_core::CoreError::PendingStopExists`] while another
    ///   stop is awaiting an outcome.
    /// - [`lastmile_core::CoreError::NoFailedStops`] with nothing to
    ///   retry.
    pub fn retry_failed(&mut self) -> Result<Uuid, EngineError> {
        let run = self.run.as_ref().ok_or(EngineError::RunNotStarted)?;
        let readmitted = sequencer::retry_failed(&mut self.store, run)?;
        tracing::info!(local_id = %readmitted, "failed stop re-admitted for retry");
        Ok(readmitted)
    }

    /// Inspects any stop of the run without touching the walk.
    ///
    /// # Errors
    ///
    /// - [`EngineError::RunNotStarted`] before `start_route`.
    /// - [`lastmile_core::CoreError::NotInRun`] for a stop outside the
    ///   run.
    pub fn jump_to(&self, local_id: Uuid) -> Result<&Stop, EngineError> {
        let run = self.run.as_ref().ok_or(EngineError::RunNotStarted)?;
        Ok(sequencer::jump_to(&self.store, run, local_id)?)
    }

    /// Whether every stop of the run has an acknowledged outcome.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.run
            .as_ref()
            .is_some_and(|run| sequencer::is_finished(&self.store, run))
    }
}
