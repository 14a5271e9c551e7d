//! Route metadata: the computed route and one execution of it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geokey;
use crate::stop::Coordinates;

/// The fixed route origin. Injected as the first element of every route
/// computation; never a delivery stop and never part of any summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginPoint {
    pub coordinates: Coordinates,
    pub label: Option<String>,
}

impl OriginPoint {
    #[must_use]
    pub fn new(latitude: f64, longitude: f64) -> Self {
        OriginPoint {
            coordinates: Coordinates {
                latitude,
                longitude,
            },
            label: None,
        }
    }

    /// Coordinate key used to recognise the origin when the authority
    /// echoes it back as a route point or execution record.
    #[must_use]
    pub fn key(&self) -> String {
        geokey::coordinate_key(self.coordinates.latitude, self.coordinates.longitude)
    }
}

/// A route computed by the authority, not yet started.
///
/// Distance, duration, and geometry are opaque to the engine beyond
/// display; the per-stop ordering lives on the stops themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedRoute {
    pub route_id: i64,
    pub distance_meters: u64,
    pub duration_seconds: u64,
    pub geometry: String,
    pub origin: OriginPoint,
}

/// One execution of a planned route, created when the authority issues a
/// run id and per-stop execution identifiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRun {
    pub run_id: i64,
    pub driver_id: i64,
    pub started_at: DateTime<Utc>,
    /// Participating stops in authority order (origin excluded). Only
    /// stops that received an execution identifier take part.
    pub stop_ids: Vec<Uuid>,
}
