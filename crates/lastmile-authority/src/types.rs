//! Wire types for the routing authority API.
//!
//! Requests serialize, responses deserialize; optional fields use
//! `#[serde(default)]` so the client tolerates older authority builds that
//! omit them. Identity fields on execution records are all optional — the
//! authority guarantees *enough* identity data per record (an id, a geo
//! hash, or coordinates), not any particular field.

use serde::{Deserialize, Serialize};

/// A latitude/longitude pair on the wire.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LatLng {
    pub latitude: f64,
    pub longitude: f64,
}

// ---------------------------------------------------------------------------
// POST /api/addresses/normalize
// ---------------------------------------------------------------------------

/// Structured address components sent with a raw stop.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AddressComponents {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locality: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub administrative_area: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

/// One raw stop as captured locally.
#[derive(Debug, Clone, Serialize)]
pub struct RawAddress {
    pub formatted_address: String,
    pub components: AddressComponents,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<LatLng>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub floor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apartment: Option<String>,
    pub packages: u32,
}

#[derive(Debug, Serialize)]
pub struct NormalizeRequest {
    pub addresses: Vec<RawAddress>,
}

/// A normalized address with authority-issued identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalAddress {
    /// Authority identifier for this address record.
    pub id: i64,
    pub normalized_text: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub floor: Option<String>,
    #[serde(default)]
    pub apartment: Option<String>,
    /// Hash of the full unit address (floor/apartment included).
    pub address_key: String,
    /// Hash of the location without unit details.
    pub geo_key: String,
    #[serde(default)]
    pub package_count: u32,
}

/// Normalization response. `errors` lists inputs the authority could not
/// geocode; the valid subset is returned regardless.
#[derive(Debug, Deserialize)]
pub struct NormalizeResponse {
    pub addresses: Vec<CanonicalAddress>,
    #[serde(default)]
    pub errors: Vec<String>,
}

// ---------------------------------------------------------------------------
// POST /api/routes/compute
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ComputeRouteRequest {
    /// Injected route origin; always the first element of the submission.
    pub origin: LatLng,
    pub addresses: Vec<CanonicalAddress>,
}

/// One point of the computed sequence. Points aggregate every canonical
/// address at the same location (the authority merges by geo key), so a
/// single point may carry several delivery units.
#[derive(Debug, Clone, Deserialize)]
pub struct RoutePoint {
    pub point_id: i64,
    pub order: u32,
    pub geo_key: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub addresses: Vec<CanonicalAddress>,
}

#[derive(Debug, Deserialize)]
pub struct ComputeRouteResponse {
    pub route_id: i64,
    pub distance_meters: u64,
    pub duration_seconds: u64,
    /// Encoded polyline; opaque to the engine.
    #[serde(default)]
    pub geometry: String,
    pub points: Vec<RoutePoint>,
}

// ---------------------------------------------------------------------------
// POST /api/routes/start
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct StartRouteRequest {
    pub route_id: i64,
    pub driver_id: i64,
}

/// Per-stop execution identity issued when a route run starts. Carries at
/// least one of `canonical_id`, `geo_key`, or coordinates.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionRecord {
    pub execution_id: i64,
    #[serde(default)]
    pub canonical_id: Option<i64>,
    #[serde(default)]
    pub geo_key: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub package_count: Option<u32>,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StartRouteResponse {
    pub run_id: i64,
    #[serde(default)]
    pub geometry: String,
    #[serde(default)]
    pub distance_meters: u64,
    #[serde(default)]
    pub duration_seconds: u64,
    pub deliveries: Vec<ExecutionRecord>,
}

// ---------------------------------------------------------------------------
// POST /api/deliveries/outcome
// ---------------------------------------------------------------------------

/// A delivery outcome as understood by the authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Completed,
    Failed,
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutcomeKind::Completed => f.write_str("completed"),
            OutcomeKind::Failed => f.write_str("failed"),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OutcomeRequest {
    pub execution_id: i64,
    pub outcome: OutcomeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Driver GPS position at confirmation time, when available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<LatLng>,
}

/// Outcome acknowledgement. When the authority already holds an outcome
/// for the execution id it echoes it in `previous_outcome` instead of
/// acknowledging; an identical previous outcome is an idempotent replay,
/// a different one is a conflict.
#[derive(Debug, Deserialize)]
pub struct OutcomeResponse {
    pub acknowledged: bool,
    #[serde(default)]
    pub run_status: String,
    #[serde(default)]
    pub previous_outcome: Option<OutcomeKind>,
}
