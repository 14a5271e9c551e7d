//! Submission phases: normalization, route computation, and run start.
//!
//! Each phase is a single authority round-trip with all-or-nothing local
//! effects: state is staged before the call, merged after a successful
//! response, and rolled back if the call fails. A transport error
//! therefore leaves the store exactly as it was, and the phase can be
//! retried in full.

use std::collections::HashSet;

use chrono::Utc;
use uuid::Uuid;

use lastmile_authority::types::{
    AddressComponents, CanonicalAddress, ComputeRouteRequest, ExecutionRecord, LatLng, RawAddress,
};
use lastmile_core::{
    sequencer, Coordinates, OriginPoint, PlannedRoute, RouteRun, Stop, StopStatus, UnitDetails,
};

use crate::engine::DeliveryEngine;
use crate::error::EngineError;
use crate::resolver::{self, RecordIdentity, Resolution};

/// Result of a normalization round-trip.
#[derive(Debug, Clone)]
pub struct NormalizationOutcome {
    /// Stops matched to a canonical record, now `Normalized`.
    pub normalized: Vec<Uuid>,
    /// Stops created from canonical records that matched no capture.
    pub synthesized: Vec<Uuid>,
    /// Inputs the authority could not normalize; the corresponding stops
    /// were rolled back to `Captured` for correction and resubmission.
    pub rejected: Vec<String>,
}

/// An authority record that could not be reconciled to any local stop.
#[derive(Debug, Clone)]
pub struct UnmatchedRecord {
    pub geo_key: Option<String>,
    pub coordinates: Option<Coordinates>,
    pub description: Option<String>,
}

/// Result of a route computation round-trip.
#[derive(Debug, Clone)]
pub struct RouteOutcome {
    pub route_id: i64,
    pub distance_meters: u64,
    pub duration_seconds: u64,
    /// Stops placed in the computed sequence, in authority order.
    pub sequenced: Vec<Uuid>,
    /// Route points that reconciled to nothing; surfaced for inspection,
    /// never silently dropped.
    pub unmatched: Vec<UnmatchedRecord>,
}

/// Result of starting a route run.
#[derive(Debug, Clone)]
pub struct StartOutcome {
    pub run_id: i64,
    /// The first stop of the walk, now awaiting an outcome.
    pub first_stop: Uuid,
    pub stop_count: usize,
    /// Stops created from execution records that reconciled to nothing,
    /// appended after the computed sequence. Reported so the driver knows
    /// the authority expects deliveries that were never captured locally.
    pub synthesized: Vec<Uuid>,
}

impl DeliveryEngine {
    /// Submits every captured stop to the authority for normalization and
    /// reconciles the canonical records back onto local stops.
    ///
    /// Canonical records that match no capture are synthesized as new
    /// stops so the authority's view and the local view agree. Captures
    /// the authority rejected (and captures its response simply omitted)
    /// are rolled back to `Captured`.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InsufficientStops`] if nothing is awaiting
    ///   submission.
    /// - [`EngineError::Authority`] on transport or API failure; every
    ///   submitted stop is rolled back to `Captured` first.
    pub async fn submit_for_normalization(
        &mut self,
    ) -> Result<NormalizationOutcome, EngineError> {
        let captured = self.store.ids_in_status(StopStatus::Captured);
        if captured.is_empty() {
            return Err(EngineError::InsufficientStops { have: 0, need: 1 });
        }

        let mut payload = Vec::with_capacity(captured.len());
        for id in &captured {
            self.store.transition(*id, StopStatus::Submitted)?;
            let stop = self.store.get_mut(*id)?;
            payload.push(raw_address(stop));
        }
        tracing::info!(stops = payload.len(), "submitting captures for normalization");

        let response = match self.client.normalize_addresses(payload).await {
            Ok(response) => response,
            Err(err) => {
                for id in &captured {
                    self.store.transition(*id, StopStatus::Captured)?;
                }
                return Err(err.into());
            }
        };

        // Records may only land on stops of the submission phase; stops
        // already sequenced or mid-walk keep their state, so they are
        // pre-claimed and invisible to this merge pass.
        let mut claimed: HashSet<Uuid> = self
            .store
            .iter()
            .filter(|s| {
                matches!(s.status, StopStatus::Sequenced | StopStatus::ExecutionPending)
            })
            .map(|s| s.local_id)
            .collect();
        let mut normalized = Vec::new();
        let mut synthesized = Vec::new();
        for record in &response.addresses {
            let identity = RecordIdentity::from(record);
            match resolver::resolve(&self.store, &identity, None, &claimed) {
                Resolution::Matched { local_id, strategy } => {
                    let stop = self.store.get_mut(local_id)?;
                    if !stop.status.can_transition(StopStatus::Normalized) {
                        // One bad record must not abort the merge of the rest.
                        tracing::warn!(
                            %local_id,
                            status = %stop.status,
                            canonical_id = record.id,
                            "matched stop cannot accept normalization; record skipped"
                        );
                        claimed.insert(local_id);
                        continue;
                    }
                    tracing::debug!(%local_id, ?strategy, canonical_id = record.id, "record matched");
                    merge_canonical(stop, record);
                    self.store.transition(local_id, StopStatus::Normalized)?;
                    claimed.insert(local_id);
                    normalized.push(local_id);
                }
                Resolution::Unmatched => {
                    let stop = synthesize(record);
                    tracing::warn!(
                        local_id = %stop.local_id,
                        canonical_id = record.id,
                        "canonical record matched no capture; synthesizing stop"
                    );
                    let id = self.store.insert_synthesized(stop);
                    claimed.insert(id);
                    synthesized.push(id);
                }
                // Normalization carries no origin; nothing to exclude.
                Resolution::Origin => {}
            }
        }

        // Anything still in flight was dropped by the authority.
        for id in self.store.ids_in_status(StopStatus::Submitted) {
            tracing::warn!(local_id = %id, "capture not normalized; rolling back");
            self.store.transition(id, StopStatus::Captured)?;
        }

        Ok(NormalizationOutcome {
            normalized,
            synthesized,
            rejected: response.errors,
        })
    }

    /// Asks the authority to compute a route over every normalized stop,
    /// with `origin` injected as the fixed starting point.
    ///
    /// Recomputation is allowed until a run starts: previously sequenced
    /// stops are reset and resequenced from the new response. The computed
    /// order lives on the stops; the route's distance, duration, and
    /// geometry are kept for display.
    ///
    /// # Errors
    ///
    /// - [`EngineError::RunAlreadyStarted`] once a run is in progress.
    /// - [`EngineError::InsufficientStops`] with no normalized stops.
    /// - [`EngineError::MissingCoordinates`] if a normalized stop lacks a
    ///   position.
    /// - [`EngineError::Authority`] on transport or API failure; the
    ///   previous sequencing is left untouched.
    pub async fn compute_route(
        &mut self,
        origin: OriginPoint,
    ) -> Result<RouteOutcome, EngineError> {
        if let Some(run) = &self.run {
            return Err(EngineError::RunAlreadyStarted(run.run_id));
        }

        let eligible: Vec<Uuid> = self
            .store
            .iter()
            .filter(|s| {
                matches!(s.status, StopStatus::Normalized | StopStatus::Sequenced)
            })
            .map(|s| s.local_id)
            .collect();
        if eligible.is_empty() {
            return Err(EngineError::InsufficientStops { have: 0, need: 1 });
        }

        let mut addresses = Vec::with_capacity(eligible.len());
        for id in &eligible {
            let stop = self.store.get_mut(*id)?;
            addresses.push(canonical_payload(stop)?);
        }

        let request = ComputeRouteRequest {
            origin: LatLng {
                latitude: origin.coordinates.latitude,
                longitude: origin.coordinates.longitude,
            },
            addresses,
        };
        tracing::info!(stops = eligible.len(), "requesting route computation");
        let response = self.client.compute_route(&request).await?;

        // New sequence replaces the old one wholesale.
        for id in self.store.ids_in_status(StopStatus::Sequenced) {
            self.store.transition(id, StopStatus::Normalized)?;
            self.store.get_mut(id)?.order = None;
        }

        let origin_key = origin.key();
        let mut claimed = HashSet::new();
        let mut sequenced = Vec::new();
        let mut unmatched = Vec::new();
        for point in &response.points {
            // A point aggregates every unit at one location; resolve the
            // units when the authority lists them, the point itself when
            // it does not.
            let identities: Vec<RecordIdentity> = if point.addresses.is_empty() {
                vec![RecordIdentity::from(point)]
            } else {
                point.addresses.iter().map(RecordIdentity::from).collect()
            };
            for identity in identities {
                match resolver::resolve(&self.store, &identity, Some(&origin_key), &claimed) {
                    Resolution::Origin => {}
                    Resolution::Matched { local_id, .. } => {
                        let stop = self.store.get_mut(local_id)?;
                        stop.order = Some(point.order);
                        self.store.transition(local_id, StopStatus::Sequenced)?;
                        claimed.insert(local_id);
                        sequenced.push(local_id);
                    }
                    Resolution::Unmatched => {
                        tracing::warn!(
                            point_id = point.point_id,
                            order = point.order,
                            "route point matched no stop"
                        );
                        unmatched.push(UnmatchedRecord {
                            geo_key: identity.geo_key.clone(),
                            coordinates: identity.coordinates,
                            description: None,
                        });
                    }
                }
            }
        }

        self.route = Some(PlannedRoute {
            route_id: response.route_id,
            distance_meters: response.distance_meters,
            duration_seconds: response.duration_seconds,
            geometry: response.geometry,
            origin,
        });

        Ok(RouteOutcome {
            route_id: response.route_id,
            distance_meters: response.distance_meters,
            duration_seconds: response.duration_seconds,
            sequenced,
            unmatched,
        })
    }

    /// Starts a run of the computed route: obtains per-stop execution
    /// identifiers from the authority, reconciles them onto local stops,
    /// and activates the first stop of the confirmation walk.
    ///
    /// Execution records that reconcile to nothing are synthesized as
    /// stops appended after the computed sequence, so every delivery the
    /// authority expects an outcome for is walkable.
    ///
    /// # Errors
    ///
    /// - [`EngineError::RouteNotComputed`] before `compute_route`.
    /// - [`EngineError::RunAlreadyStarted`] if a run is in progress.
    /// - [`EngineError::Authority`] on transport or API failure; the
    ///   sequenced stops are left untouched.
    pub async fn start_route(&mut self, driver_id: i64) -> Result<StartOutcome, EngineError> {
        if let Some(run) = &self.run {
            return Err(EngineError::RunAlreadyStarted(run.run_id));
        }
        let route = self.route.clone().ok_or(EngineError::RouteNotComputed)?;

        tracing::info!(route_id = route.route_id, driver_id, "starting route run");
        let response = self.client.start_route(route.route_id, driver_id).await?;

        let origin_key = route.origin.key();
        let mut next_order = self
            .store
            .iter()
            .filter_map(|s| s.order)
            .max()
            .map_or(0, |o| o + 1);

        let mut claimed = HashSet::new();
        let mut participants = Vec::new();
        let mut synthesized = Vec::new();
        for record in &response.deliveries {
            let identity = RecordIdentity::from(record);
            match resolver::resolve(&self.store, &identity, Some(&origin_key), &claimed) {
                Resolution::Origin => {
                    tracing::debug!(
                        execution_id = record.execution_id,
                        "execution record is the origin; excluded from the walk"
                    );
                }
                Resolution::Matched { local_id, strategy } => {
                    tracing::debug!(%local_id, ?strategy, execution_id = record.execution_id, "execution record matched");
                    let stop = self.store.get_mut(local_id)?;
                    stop.execution_id = Some(record.execution_id);
                    if stop.canonical_id.is_none() {
                        stop.canonical_id = record.canonical_id;
                    }
                    if stop.status == StopStatus::Normalized {
                        // Not part of the computed sequence; walk it last.
                        stop.order = Some(next_order);
                        next_order += 1;
                        self.store.transition(local_id, StopStatus::Sequenced)?;
                    }
                    claimed.insert(local_id);
                    participants.push(local_id);
                }
                Resolution::Unmatched => {
                    let stop = synthesize_from_execution(record, next_order);
                    next_order += 1;
                    tracing::warn!(
                        local_id = %stop.local_id,
                        execution_id = record.execution_id,
                        "execution record matched no stop; synthesizing"
                    );
                    let id = self.store.insert_synthesized(stop);
                    claimed.insert(id);
                    participants.push(id);
                    synthesized.push(id);
                }
            }
        }

        let stop_ids = self.ordered_run_ids(&participants);
        let run = RouteRun {
            run_id: response.run_id,
            driver_id,
            started_at: Utc::now(),
            stop_ids,
        };
        let first_stop = sequencer::activate_first(&mut self.store, &run)?;
        let stop_count = run.stop_ids.len();
        self.run = Some(run);

        Ok(StartOutcome {
            run_id: response.run_id,
            first_stop,
            stop_count,
            synthesized,
        })
    }
}

fn raw_address(stop: &Stop) -> RawAddress {
    RawAddress {
        formatted_address: stop.raw_address_text.clone(),
        components: AddressComponents {
            locality: stop.locality.clone(),
            administrative_area: stop.region.clone(),
            postal_code: stop.postal_code.clone(),
            country: stop.country.clone(),
        },
        location: stop.coordinates.map(|c| LatLng {
            latitude: c.latitude,
            longitude: c.longitude,
        }),
        floor: stop.unit.as_ref().and_then(|u| u.floor.clone()),
        apartment: stop.unit.as_ref().and_then(|u| u.apartment.clone()),
        packages: stop.package_count,
    }
}

/// Copies authority-issued identity onto a matched stop. The authority's
/// keys and position replace the locally derived ones; capture-time fields
/// (raw text, unit, fingerprint) stay.
fn merge_canonical(stop: &mut Stop, record: &CanonicalAddress) {
    stop.canonical_id = Some(record.id);
    stop.geo_key = Some(record.geo_key.clone());
    stop.coordinates = Some(Coordinates {
        latitude: record.latitude,
        longitude: record.longitude,
    });
    if record.package_count > 0 {
        stop.package_count = record.package_count;
    }
}

fn canonical_payload(stop: &Stop) -> Result<CanonicalAddress, EngineError> {
    let coordinates = stop
        .coordinates
        .ok_or(EngineError::MissingCoordinates(stop.local_id))?;
    Ok(CanonicalAddress {
        id: stop.canonical_id.unwrap_or_default(),
        normalized_text: stop.raw_address_text.clone(),
        latitude: coordinates.latitude,
        longitude: coordinates.longitude,
        floor: stop.unit.as_ref().and_then(|u| u.floor.clone()),
        apartment: stop.unit.as_ref().and_then(|u| u.apartment.clone()),
        address_key: stop.address_fingerprint.clone(),
        geo_key: stop.geo_key.clone().unwrap_or_else(|| coordinates.key()),
        package_count: stop.package_count,
    })
}

/// Builds a stop from a canonical record that matched no capture.
fn synthesize(record: &CanonicalAddress) -> Stop {
    let unit = UnitDetails {
        floor: record.floor.clone(),
        apartment: record.apartment.clone(),
    };
    Stop {
        local_id: Uuid::new_v4(),
        raw_address_text: record.normalized_text.clone(),
        locality: None,
        region: None,
        postal_code: None,
        country: None,
        coordinates: Some(Coordinates {
            latitude: record.latitude,
            longitude: record.longitude,
        }),
        unit: (!unit.is_empty()).then_some(unit),
        package_count: record.package_count.max(1),
        address_fingerprint: record.address_key.clone(),
        canonical_id: Some(record.id),
        geo_key: Some(record.geo_key.clone()),
        execution_id: None,
        order: None,
        status: StopStatus::Normalized,
        outcome_note: None,
        outcome_at: None,
    }
}

/// Builds a stop from an execution record that matched nothing; appended
/// after the computed sequence so the walk still covers it.
fn synthesize_from_execution(record: &ExecutionRecord, order: u32) -> Stop {
    let coordinates = match (record.latitude, record.longitude) {
        (Some(latitude), Some(longitude)) => Some(Coordinates {
            latitude,
            longitude,
        }),
        _ => None,
    };
    let text = record
        .address
        .clone()
        .unwrap_or_else(|| format!("delivery #{}", record.execution_id));
    Stop {
        local_id: Uuid::new_v4(),
        raw_address_text: text,
        locality: None,
        region: None,
        postal_code: None,
        country: None,
        coordinates,
        unit: None,
        package_count: record.package_count.unwrap_or(1).max(1),
        address_fingerprint: String::new(),
        canonical_id: record.canonical_id,
        geo_key: record.geo_key.clone(),
        execution_id: Some(record.execution_id),
        order: Some(order),
        status: StopStatus::Sequenced,
        outcome_note: None,
        outcome_at: None,
    }
}
