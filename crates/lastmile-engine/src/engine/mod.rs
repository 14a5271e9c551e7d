//! The delivery engine: owns the stop store and drives the
//! normalize → compute → start → confirm lifecycle against the authority.

mod execute;
mod submit;

use uuid::Uuid;

use lastmile_authority::AuthorityClient;
use lastmile_core::{
    CaptureResult, CapturedAddress, PlannedRoute, RouteRun, RunSummary, Stop, StopStore,
};

use crate::snapshot::EngineSnapshot;

pub use execute::DeliveryProgress;
pub use submit::{NormalizationOutcome, RouteOutcome, StartOutcome, UnmatchedRecord};

/// Orchestrates one delivery session: capture, submission, sequencing,
/// and execution.
///
/// The engine owns the [`StopStore`] exclusively — hosts read state
/// through [`DeliveryEngine::store`] but never mutate stop status
/// directly. Every mutating operation takes `&mut self`, so outcome
/// submissions are serialized by construction; a host that shares the
/// engine across tasks wraps it in an async mutex.
///
/// The authority client is injected at construction (and must be ready
/// before the engine is used); the engine itself holds no global state.
pub struct DeliveryEngine {
    pub(crate) client: AuthorityClient,
    pub(crate) store: StopStore,
    pub(crate) route: Option<PlannedRoute>,
    pub(crate) run: Option<RouteRun>,
}

impl DeliveryEngine {
    /// Creates an engine with an empty store.
    #[must_use]
    pub fn new(client: AuthorityClient) -> Self {
        DeliveryEngine {
            client,
            store: StopStore::new(),
            route: None,
            run: None,
        }
    }

    /// Rebuilds an engine from a persisted snapshot. Sequencer state is
    /// fully derived from the restored stop statuses; the authority is
    /// not contacted.
    #[must_use]
    pub fn restore(client: AuthorityClient, snapshot: EngineSnapshot) -> Self {
        DeliveryEngine {
            client,
            store: StopStore::from_stops(snapshot.stops),
            route: snapshot.route,
            run: snapshot.run,
        }
    }

    /// Captures a stop address. Duplicate captures of the same unit merge
    /// into the existing stop.
    pub fn capture(&mut self, address: CapturedAddress) -> CaptureResult {
        self.store.capture(address)
    }

    /// Read access to the stop store.
    #[must_use]
    pub fn store(&self) -> &StopStore {
        &self.store
    }

    /// The computed route, once `compute_route` has succeeded.
    #[must_use]
    pub fn route(&self) -> Option<&PlannedRoute> {
        self.route.as_ref()
    }

    /// The active route run, once `start_route` has succeeded.
    #[must_use]
    pub fn run(&self) -> Option<&RouteRun> {
        self.run.as_ref()
    }

    /// The stop currently awaiting an outcome, if a run is in progress.
    #[must_use]
    pub fn current_stop(&self) -> Option<&Stop> {
        let run = self.run.as_ref()?;
        lastmile_core::sequencer::current(&self.store, run)
    }

    /// The completion summary of the finished run.
    ///
    /// # Errors
    ///
    /// - [`crate::EngineError::RunNotStarted`] before `start_route`.
    /// - [`lastmile_core::CoreError::RunStillActive`] while stops remain
    ///   undecided.
    pub fn summary(&self) -> Result<RunSummary, crate::EngineError> {
        let run = self.run.as_ref().ok_or(crate::EngineError::RunNotStarted)?;
        Ok(RunSummary::build(&self.store, run, chrono::Utc::now())?)
    }

    /// Closes a finished run: builds the completion summary, then destroys
    /// the run and its route so the session can capture and route again.
    ///
    /// Per-run identity is cleared from the stops (execution id, order);
    /// their recorded outcomes stay as history, and finished stops take no
    /// part in later reconciliation.
    ///
    /// # Errors
    ///
    /// - [`crate::EngineError::RunNotStarted`] with no run to close.
    /// - [`lastmile_core::CoreError::RunStillActive`] while stops remain
    ///   undecided; the run is left in place.
    pub fn close_run(&mut self) -> Result<RunSummary, crate::EngineError> {
        let run = self.run.take().ok_or(crate::EngineError::RunNotStarted)?;
        match RunSummary::build(&self.store, &run, chrono::Utc::now()) {
            Ok(summary) => {
                for id in &run.stop_ids {
                    if let Ok(stop) = self.store.get_mut(*id) {
                        stop.execution_id = None;
                        stop.order = None;
                    }
                }
                self.route = None;
                tracing::info!(run_id = summary.run_id, stops = summary.total(), "run closed");
                Ok(summary)
            }
            Err(err) => {
                self.run = Some(run);
                Err(err.into())
            }
        }
    }

    /// Captures the engine state for persistence.
    #[must_use]
    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot::capture(&self.store, self.route.clone(), self.run.clone())
    }

    /// Ids of the run's stops in execution order.
    pub(crate) fn ordered_run_ids(&self, claimed: &[Uuid]) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self
            .store
            .iter()
            .map(|s| s.local_id)
            .filter(|id| claimed.contains(id))
            .collect();
        // Stable sort: capture order breaks ties between stops that share
        // an authority order (same building, different units).
        ids.sort_by_key(|id| {
            self.store
                .get(*id)
                .and_then(|s| s.order)
                .unwrap_or(u32::MAX)
        });
        ids
    }
}
