//! In-memory store of stop records.
//!
//! The store owns every [`Stop`] for the session and is the single place
//! where stop status changes are applied, so the lifecycle table in
//! [`StopStatus::can_transition`] is enforced uniformly. Capture order is
//! preserved; it is the tie-breaker whenever two stops share an authority
//! order (same building, different units).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;
use crate::stop::{CapturedAddress, Stop, StopStatus};

/// What happened when a capture was added to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureResult {
    /// A new stop was created.
    Created(Uuid),
    /// The capture duplicated an existing unit; its packages were merged
    /// into the existing stop instead.
    Merged { into: Uuid, package_count: u32 },
}

impl CaptureResult {
    /// The stop the capture ended up in, created or merged.
    #[must_use]
    pub fn local_id(&self) -> Uuid {
        match self {
            CaptureResult::Created(id) | CaptureResult::Merged { into: id, .. } => *id,
        }
    }
}

/// Owned collection of stops, indexed by `local_id`, iterated in capture
/// order.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct StopStore {
    stops: Vec<Stop>,
}

impl StopStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a store from a persisted stop list, preserving order.
    #[must_use]
    pub fn from_stops(stops: Vec<Stop>) -> Self {
        StopStore { stops }
    }

    /// Adds a capture. A capture whose address fingerprint matches an
    /// existing stop that has not yet entered execution is merged into it
    /// (package counts summed) rather than duplicated.
    pub fn capture(&mut self, address: CapturedAddress) -> CaptureResult {
        let candidate = Stop::capture(address);
        if let Some(existing) = self.stops.iter_mut().find(|s| {
            s.address_fingerprint == candidate.address_fingerprint && !s.status.is_terminal()
        }) {
            existing.package_count += candidate.package_count;
            tracing::debug!(
                local_id = %existing.local_id,
                package_count = existing.package_count,
                "merged duplicate capture"
            );
            return CaptureResult::Merged {
                into: existing.local_id,
                package_count: existing.package_count,
            };
        }
        let id = candidate.local_id;
        self.stops.push(candidate);
        CaptureResult::Created(id)
    }

    /// Inserts a stop synthesized from an authority record that matched no
    /// local capture.
    pub fn insert_synthesized(&mut self, stop: Stop) -> Uuid {
        let id = stop.local_id;
        self.stops.push(stop);
        id
    }

    #[must_use]
    pub fn get(&self, local_id: Uuid) -> Option<&Stop> {
        self.stops.iter().find(|s| s.local_id == local_id)
    }

    /// Mutable access for field merges (canonical id, geo key, order,
    /// execution id). Status changes must go through [`Self::transition`].
    pub fn get_mut(&mut self, local_id: Uuid) -> Result<&mut Stop, CoreError> {
        self.stops
            .iter_mut()
            .find(|s| s.local_id == local_id)
            .ok_or(CoreError::UnknownStop(local_id))
    }

    /// Applies a validated status transition.
    pub fn transition(&mut self, local_id: Uuid, to: StopStatus) -> Result<(), CoreError> {
        let stop = self.get_mut(local_id)?;
        let from = stop.status;
        if !from.can_transition(to) {
            return Err(CoreError::InvalidTransition { local_id, from, to });
        }
        stop.status = to;
        Ok(())
    }

    /// All stops, in capture order.
    pub fn iter(&self) -> impl Iterator<Item = &Stop> {
        self.stops.iter()
    }

    /// Stops currently in the given status, in capture order.
    pub fn in_status(&self, status: StopStatus) -> impl Iterator<Item = &Stop> {
        self.stops.iter().filter(move |s| s.status == status)
    }

    /// Ids of stops currently in the given status, in capture order.
    #[must_use]
    pub fn ids_in_status(&self, status: StopStatus) -> Vec<Uuid> {
        self.in_status(status).map(|s| s.local_id).collect()
    }

    /// The single stop awaiting an outcome, if any.
    #[must_use]
    pub fn pending(&self) -> Option<&Stop> {
        self.in_status(StopStatus::ExecutionPending).next()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stops.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }

    /// Consumes the store, yielding the stop list for persistence.
    #[must_use]
    pub fn into_stops(self) -> Vec<Stop> {
        self.stops
    }
}
