//! The canonical stop record and its lifecycle state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geokey;

/// A geographic position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// The coordinate-rounded reconciliation key for this position.
    #[must_use]
    pub fn key(&self) -> String {
        geokey::coordinate_key(self.latitude, self.longitude)
    }
}

/// Floor/apartment annotations for a delivery unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitDetails {
    pub floor: Option<String>,
    pub apartment: Option<String>,
}

impl UnitDetails {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.floor.is_none() && self.apartment.is_none()
    }
}

/// Lifecycle state of a stop.
///
/// Transitions are validated by [`StopStatus::can_transition`]; everything
/// else in the workspace goes through that table rather than assigning the
/// field directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopStatus {
    /// Captured locally, not yet sent to the authority.
    Captured,
    /// In flight to the authority for normalization.
    Submitted,
    /// Matched to a canonical record; carries `canonical_id`/`geo_key`.
    Normalized,
    /// Placed in the computed route; carries `order`.
    Sequenced,
    /// The current stop of a running route, awaiting an outcome.
    ExecutionPending,
    /// Delivered, acknowledged by the authority.
    Completed,
    /// Delivery attempt failed, acknowledged by the authority.
    Failed,
}

impl StopStatus {
    /// Whether `self -> next` is a legal lifecycle edge.
    ///
    /// Self-transitions are allowed as no-ops (resubmission and route
    /// recomputation revisit the same state). `Submitted -> Captured` is
    /// the rollback edge for rejected or failed normalization;
    /// `Sequenced -> Normalized` un-sequences a stop when the route is
    /// recomputed; `Failed -> ExecutionPending` is the retry edge.
    #[must_use]
    pub fn can_transition(self, next: StopStatus) -> bool {
        use StopStatus::{
            Captured, Completed, ExecutionPending, Failed, Normalized, Sequenced, Submitted,
        };
        if self == next {
            return true;
        }
        matches!(
            (self, next),
            (Captured, Submitted)
                | (Submitted, Normalized | Captured)
                | (Normalized, Sequenced)
                | (Sequenced, ExecutionPending | Normalized)
                | (ExecutionPending, Completed | Failed)
                | (Failed, ExecutionPending)
        )
    }

    /// Whether an outcome has been recorded and acknowledged.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, StopStatus::Completed | StopStatus::Failed)
    }
}

impl std::fmt::Display for StopStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StopStatus::Captured => "captured",
            StopStatus::Submitted => "submitted",
            StopStatus::Normalized => "normalized",
            StopStatus::Sequenced => "sequenced",
            StopStatus::ExecutionPending => "pending",
            StopStatus::Completed => "completed",
            StopStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A raw address as entered or autocompleted at capture time.
#[derive(Debug, Clone, Default)]
pub struct CapturedAddress {
    pub raw_address_text: String,
    pub locality: Option<String>,
    pub region: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub coordinates: Option<Coordinates>,
    pub unit: Option<UnitDetails>,
    pub package_count: u32,
}

/// A single delivery location and everything learned about it across the
/// submission, sequencing, and execution phases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stop {
    /// Capture-time identity; unique and immutable for the stop's lifetime.
    pub local_id: Uuid,
    pub raw_address_text: String,
    pub locality: Option<String>,
    pub region: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub coordinates: Option<Coordinates>,
    pub unit: Option<UnitDetails>,
    pub package_count: u32,
    /// SHA-256 over the full unit address (floor/apartment included).
    pub address_fingerprint: String,
    /// Authority identifier, set once normalization succeeds.
    pub canonical_id: Option<i64>,
    /// Location hash; derived locally at capture, overwritten by the
    /// authority-issued value on reconciliation.
    pub geo_key: Option<String>,
    /// Per-run execution identifier; set at most once per route run.
    pub execution_id: Option<i64>,
    /// Position in the authority-computed sequence.
    pub order: Option<u32>,
    pub status: StopStatus,
    pub outcome_note: Option<String>,
    pub outcome_at: Option<DateTime<Utc>>,
}

impl Stop {
    /// Creates a stop from a capture, deriving its fingerprint and local
    /// geo key.
    #[must_use]
    pub fn capture(address: CapturedAddress) -> Self {
        let unit = address.unit.filter(|u| !u.is_empty());
        let fingerprint = geokey::address_fingerprint(
            &address.raw_address_text,
            address.locality.as_deref(),
            address.region.as_deref(),
            address.country.as_deref(),
            unit.as_ref().and_then(|u| u.floor.as_deref()),
            unit.as_ref().and_then(|u| u.apartment.as_deref()),
        );
        let geo_key = geokey::geoloc_hash(
            &address.raw_address_text,
            address.locality.as_deref(),
            address.region.as_deref(),
            address.country.as_deref(),
        );
        Stop {
            local_id: Uuid::new_v4(),
            raw_address_text: address.raw_address_text,
            locality: address.locality,
            region: address.region,
            postal_code: address.postal_code,
            country: address.country,
            coordinates: address.coordinates,
            unit,
            package_count: address.package_count.max(1),
            address_fingerprint: fingerprint,
            canonical_id: None,
            geo_key: Some(geo_key),
            execution_id: None,
            order: None,
            status: StopStatus::Captured,
            outcome_note: None,
            outcome_at: None,
        }
    }

    /// The best reconciliation key currently known for this stop: the geo
    /// hash when present, otherwise the coordinate-rounded key.
    #[must_use]
    pub fn effective_geo_key(&self) -> Option<String> {
        self.geo_key
            .clone()
            .or_else(|| self.coordinates.map(|c| c.key()))
    }

    /// Clears a recorded outcome; used when a failed stop is re-admitted
    /// for another attempt.
    pub fn clear_outcome(&mut self) {
        self.outcome_note = None;
        self.outcome_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_capture() -> CapturedAddress {
        CapturedAddress {
            raw_address_text: "Av. Corrientes 1234".to_string(),
            locality: Some("CABA".to_string()),
            region: Some("Buenos Aires".to_string()),
            postal_code: Some("C1043".to_string()),
            country: Some("AR".to_string()),
            coordinates: Some(Coordinates {
                latitude: -34.6037,
                longitude: -58.3816,
            }),
            unit: Some(UnitDetails {
                floor: Some("3".to_string()),
                apartment: Some("B".to_string()),
            }),
            package_count: 2,
        }
    }

    #[test]
    fn capture_derives_keys() {
        let stop = Stop::capture(sample_capture());
        assert_eq!(stop.status, StopStatus::Captured);
        assert!(stop.geo_key.is_some());
        assert_eq!(stop.address_fingerprint.len(), 64);
        assert_eq!(stop.package_count, 2);
    }

    #[test]
    fn capture_clamps_zero_packages_to_one() {
        let stop = Stop::capture(CapturedAddress {
            package_count: 0,
            ..sample_capture()
        });
        assert_eq!(stop.package_count, 1);
    }

    #[test]
    fn effective_geo_key_falls_back_to_coordinates() {
        let mut stop = Stop::capture(sample_capture());
        stop.geo_key = None;
        assert_eq!(stop.effective_geo_key().as_deref(), Some("-34.60370,-58.38160"));
    }

    #[test]
    fn transition_table_accepts_lifecycle_path() {
        use StopStatus::{Captured, Completed, ExecutionPending, Normalized, Sequenced, Submitted};
        let path = [Captured, Submitted, Normalized, Sequenced, ExecutionPending, Completed];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn transition_table_rejects_skips_and_regressions() {
        use StopStatus::{Captured, Completed, ExecutionPending, Normalized, Sequenced};
        assert!(!Captured.can_transition(Normalized));
        assert!(!Normalized.can_transition(ExecutionPending));
        assert!(!Completed.can_transition(ExecutionPending));
        assert!(!Sequenced.can_transition(Captured));
    }

    #[test]
    fn sequenced_rolls_back_to_normalized_on_recompute() {
        assert!(StopStatus::Sequenced.can_transition(StopStatus::Normalized));
        assert!(!StopStatus::ExecutionPending.can_transition(StopStatus::Normalized));
    }

    #[test]
    fn failed_can_be_readmitted() {
        assert!(StopStatus::Failed.can_transition(StopStatus::ExecutionPending));
    }

    #[test]
    fn stop_round_trips_through_json() {
        let stop = Stop::capture(sample_capture());
        let json = serde_json::to_string(&stop).expect("serialize");
        let back: Stop = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.local_id, stop.local_id);
        assert_eq!(back.address_fingerprint, stop.address_fingerprint);
    }
}
