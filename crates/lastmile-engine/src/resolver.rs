//! Reconciliation key resolver: decides whether an authority record and a
//! local stop refer to the same physical stop.
//!
//! The matching strategies are tried in strict preference order:
//!
//! 1. explicit identifier (`canonical_id`)
//! 2. authority geo-hash string equality
//! 3. coordinate-rounded key equality (5 decimals per axis)
//!
//! before any of which the record is tested against the injected origin —
//! the origin must never be matched into a deliverable stop. A record that
//! matches nothing is `Unmatched`; what that means (synthesize a stop,
//! report a reconciliation failure) depends on the phase and is the
//! coordinator's call.
//!
//! Every record claims at most one stop per merge pass: callers thread a
//! `claimed` set through consecutive resolutions so two records cannot
//! land on the same stop, and ties between stops sharing a geo key (same
//! building, different units) are broken by address fingerprint, then by
//! capture order.
//!
//! Stops with a recorded outcome are never candidates: a delivered stop
//! keeps its keys, and a later capture of the same address (next-day
//! redelivery, a second package) must resolve to the new stop, not the
//! finished one.

use std::collections::HashSet;

use uuid::Uuid;

use lastmile_authority::types::{CanonicalAddress, ExecutionRecord, RoutePoint};
use lastmile_core::{Coordinates, Stop, StopStore};

/// Identity data extracted from an authority record. No field is
/// guaranteed; the resolver works with whatever is present.
#[derive(Debug, Clone, Default)]
pub struct RecordIdentity {
    pub canonical_id: Option<i64>,
    pub geo_key: Option<String>,
    pub coordinates: Option<Coordinates>,
    /// Hash of the exact delivery unit, used as a tie-breaker among stops
    /// sharing a geo key.
    pub address_key: Option<String>,
    pub package_count: Option<u32>,
}

impl From<&CanonicalAddress> for RecordIdentity {
    fn from(record: &CanonicalAddress) -> Self {
        RecordIdentity {
            canonical_id: Some(record.id),
            geo_key: Some(record.geo_key.clone()),
            coordinates: Some(Coordinates {
                latitude: record.latitude,
                longitude: record.longitude,
            }),
            address_key: Some(record.address_key.clone()),
            package_count: Some(record.package_count),
        }
    }
}

impl From<&ExecutionRecord> for RecordIdentity {
    fn from(record: &ExecutionRecord) -> Self {
        let coordinates = match (record.latitude, record.longitude) {
            (Some(latitude), Some(longitude)) => Some(Coordinates {
                latitude,
                longitude,
            }),
            _ => None,
        };
        RecordIdentity {
            canonical_id: record.canonical_id,
            geo_key: record.geo_key.clone(),
            coordinates,
            address_key: None,
            package_count: record.package_count,
        }
    }
}

impl From<&RoutePoint> for RecordIdentity {
    fn from(point: &RoutePoint) -> Self {
        RecordIdentity {
            canonical_id: None,
            geo_key: Some(point.geo_key.clone()),
            coordinates: Some(Coordinates {
                latitude: point.latitude,
                longitude: point.longitude,
            }),
            address_key: None,
            package_count: None,
        }
    }
}

/// Which strategy produced a match; recorded for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    CanonicalId,
    GeoKey,
    CoordinateKey,
}

/// The resolver's verdict for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The record is the injected route origin; exclude it from delivery
    /// counts and the confirmation flow.
    Origin,
    Matched {
        local_id: Uuid,
        strategy: MatchStrategy,
    },
    /// No local stop corresponds to this record.
    Unmatched,
}

/// Resolves one authority record against the store.
///
/// `origin_key` is the coordinate key of the injected origin, when the
/// current phase has one. Stops listed in `claimed` are skipped.
#[must_use]
pub fn resolve(
    store: &StopStore,
    identity: &RecordIdentity,
    origin_key: Option<&str>,
    claimed: &HashSet<Uuid>,
) -> Resolution {
    if is_origin(identity, origin_key) {
        return Resolution::Origin;
    }

    if let Some(canonical_id) = identity.canonical_id {
        if let Some(stop) = candidates(store, claimed)
            .find(|s| s.canonical_id == Some(canonical_id))
        {
            return Resolution::Matched {
                local_id: stop.local_id,
                strategy: MatchStrategy::CanonicalId,
            };
        }
    }

    if let Some(geo_key) = identity.geo_key.as_deref() {
        let matches: Vec<&Stop> = candidates(store, claimed)
            .filter(|s| s.geo_key.as_deref() == Some(geo_key))
            .collect();
        if let Some(stop) = pick(&matches, identity.address_key.as_deref()) {
            return Resolution::Matched {
                local_id: stop.local_id,
                strategy: MatchStrategy::GeoKey,
            };
        }
    }

    if let Some(coordinates) = identity.coordinates {
        let key = coordinates.key();
        let matches: Vec<&Stop> = candidates(store, claimed)
            .filter(|s| s.coordinates.is_some_and(|c| c.key() == key))
            .collect();
        if let Some(stop) = pick(&matches, identity.address_key.as_deref()) {
            return Resolution::Matched {
                local_id: stop.local_id,
                strategy: MatchStrategy::CoordinateKey,
            };
        }
    }

    Resolution::Unmatched
}

/// The origin sentinel: a zero package count, or a location key equal to
/// the injected origin's.
fn is_origin(identity: &RecordIdentity, origin_key: Option<&str>) -> bool {
    if identity.package_count == Some(0) {
        return true;
    }
    let Some(origin_key) = origin_key else {
        return false;
    };
    if identity.geo_key.as_deref() == Some(origin_key) {
        return true;
    }
    identity
        .coordinates
        .is_some_and(|c| c.key() == origin_key)
}

fn candidates<'a>(
    store: &'a StopStore,
    claimed: &'a HashSet<Uuid>,
) -> impl Iterator<Item = &'a Stop> {
    store
        .iter()
        .filter(move |s| !s.status.is_terminal() && !claimed.contains(&s.local_id))
}

/// Tie-break among same-key candidates: exact unit fingerprint first, then
/// capture order.
fn pick<'a>(matches: &[&'a Stop], address_key: Option<&str>) -> Option<&'a Stop> {
    if let Some(key) = address_key {
        if let Some(exact) = matches.iter().find(|s| s.address_fingerprint == key) {
            return Some(exact);
        }
    }
    matches.first().copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lastmile_core::{CapturedAddress, UnitDetails};

    fn store_with(
        entries: &[(&str, Option<(f64, f64)>, Option<&str>)],
    ) -> (StopStore, Vec<Uuid>) {
        let mut store = StopStore::new();
        let mut ids = Vec::new();
        for (street, coords, floor) in entries {
            let id = store
                .capture(CapturedAddress {
                    raw_address_text: (*street).to_string(),
                    locality: Some("CABA".to_string()),
                    country: Some("AR".to_string()),
                    coordinates: coords.map(|(latitude, longitude)| Coordinates {
                        latitude,
                        longitude,
                    }),
                    unit: floor.map(|f| UnitDetails {
                        floor: Some(f.to_string()),
                        apartment: None,
                    }),
                    package_count: 1,
                    ..CapturedAddress::default()
                })
                .local_id();
            ids.push(id);
        }
        (store, ids)
    }

    fn matched_id(resolution: &Resolution) -> Uuid {
        match resolution {
            Resolution::Matched { local_id, .. } => *local_id,
            other => panic!("expected a match, got {other:?}"),
        }
    }

    #[test]
    fn canonical_id_wins_over_geo_key() {
        let (mut store, ids) = store_with(&[
            ("Lavalle 500", Some((-34.60, -58.40)), None),
            ("Lavalle 600", Some((-34.61, -58.41)), None),
        ]);
        // Both stops carry the record's geo key, but only the second
        // carries its canonical id.
        for id in &ids {
            store.get_mut(*id).unwrap().geo_key = Some("shared-key".to_string());
        }
        store.get_mut(ids[1]).unwrap().canonical_id = Some(42);

        let identity = RecordIdentity {
            canonical_id: Some(42),
            geo_key: Some("shared-key".to_string()),
            ..RecordIdentity::default()
        };
        let resolution = resolve(&store, &identity, None, &HashSet::new());
        assert_eq!(matched_id(&resolution), ids[1]);
        assert!(matches!(
            resolution,
            Resolution::Matched {
                strategy: MatchStrategy::CanonicalId,
                ..
            }
        ));
    }

    #[test]
    fn geo_key_matches_by_exact_string_equality() {
        let (mut store, ids) = store_with(&[("Lavalle 500", None, None)]);
        store.get_mut(ids[0]).unwrap().geo_key = Some("abc123".to_string());

        let hit = RecordIdentity {
            geo_key: Some("abc123".to_string()),
            ..RecordIdentity::default()
        };
        assert_eq!(matched_id(&resolve(&store, &hit, None, &HashSet::new())), ids[0]);

        let miss = RecordIdentity {
            geo_key: Some("abc124".to_string()),
            ..RecordIdentity::default()
        };
        assert_eq!(resolve(&store, &miss, None, &HashSet::new()), Resolution::Unmatched);
    }

    #[test]
    fn coordinates_match_within_the_rounding_band() {
        let (mut store, ids) = store_with(&[("Lavalle 500", Some((-34.596_50, -58.404_20)), None)]);
        // Strip the derived geo key so only coordinates remain.
        store.get_mut(ids[0]).unwrap().geo_key = None;

        let identity = RecordIdentity {
            coordinates: Some(Coordinates {
                latitude: -34.596_498,
                longitude: -58.404_199,
            }),
            ..RecordIdentity::default()
        };
        let resolution = resolve(&store, &identity, None, &HashSet::new());
        assert_eq!(matched_id(&resolution), ids[0]);
        assert!(matches!(
            resolution,
            Resolution::Matched {
                strategy: MatchStrategy::CoordinateKey,
                ..
            }
        ));
    }

    #[test]
    fn coordinates_outside_the_band_do_not_match() {
        let (mut store, ids) = store_with(&[("Lavalle 500", Some((-34.596_50, -58.404_20)), None)]);
        store.get_mut(ids[0]).unwrap().geo_key = None;

        let identity = RecordIdentity {
            coordinates: Some(Coordinates {
                latitude: -34.596_70,
                longitude: -58.404_20,
            }),
            ..RecordIdentity::default()
        };
        assert_eq!(resolve(&store, &identity, None, &HashSet::new()), Resolution::Unmatched);
    }

    #[test]
    fn address_key_breaks_ties_between_units_of_one_building() {
        let (mut store, ids) = store_with(&[
            ("Lavalle 500", None, Some("2")),
            ("Lavalle 500", None, Some("3")),
        ]);
        let second_fingerprint = store.get(ids[1]).unwrap().address_fingerprint.clone();
        let shared_key = store.get(ids[0]).unwrap().geo_key.clone();
        assert_eq!(shared_key, store.get(ids[1]).unwrap().geo_key.clone());

        let identity = RecordIdentity {
            geo_key: shared_key,
            address_key: Some(second_fingerprint),
            ..RecordIdentity::default()
        };
        assert_eq!(matched_id(&resolve(&store, &identity, None, &HashSet::new())), ids[1]);
    }

    #[test]
    fn claimed_stops_are_skipped() {
        let (store, ids) = store_with(&[
            ("Lavalle 500", None, Some("2")),
            ("Lavalle 500", None, Some("3")),
        ]);
        let shared_key = store.get(ids[0]).unwrap().geo_key.clone();
        let identity = RecordIdentity {
            geo_key: shared_key,
            ..RecordIdentity::default()
        };

        let mut claimed = HashSet::new();
        assert_eq!(matched_id(&resolve(&store, &identity, None, &claimed)), ids[0]);
        claimed.insert(ids[0]);
        assert_eq!(matched_id(&resolve(&store, &identity, None, &claimed)), ids[1]);
        claimed.insert(ids[1]);
        assert_eq!(resolve(&store, &identity, None, &claimed), Resolution::Unmatched);
    }

    #[test]
    fn zero_package_count_is_the_origin_sentinel() {
        let (store, _) = store_with(&[("Lavalle 500", Some((-34.60, -58.40)), None)]);
        let identity = RecordIdentity {
            coordinates: Some(Coordinates {
                latitude: -34.60,
                longitude: -58.40,
            }),
            package_count: Some(0),
            ..RecordIdentity::default()
        };
        // Even though the coordinates would match a stop, the sentinel wins.
        assert_eq!(resolve(&store, &identity, None, &HashSet::new()), Resolution::Origin);
    }

    #[test]
    fn origin_coordinates_are_recognised() {
        let (store, _) = store_with(&[("Lavalle 500", Some((-34.60, -58.40)), None)]);
        let origin_key = Coordinates {
            latitude: -34.70,
            longitude: -58.50,
        }
        .key();
        let identity = RecordIdentity {
            coordinates: Some(Coordinates {
                latitude: -34.700_002,
                longitude: -58.499_998,
            }),
            ..RecordIdentity::default()
        };
        assert_eq!(
            resolve(&store, &identity, Some(&origin_key), &HashSet::new()),
            Resolution::Origin
        );
    }

    #[test]
    fn terminal_stops_are_never_candidates() {
        use lastmile_core::StopStatus;

        let (mut store, ids) = store_with(&[("Lavalle 500", Some((-34.60, -58.40)), None)]);
        store.get_mut(ids[0]).unwrap().canonical_id = Some(42);
        for status in [
            StopStatus::Submitted,
            StopStatus::Normalized,
            StopStatus::Sequenced,
            StopStatus::ExecutionPending,
            StopStatus::Completed,
        ] {
            store.transition(ids[0], status).unwrap();
        }

        // Same address captured again after delivery: the old stop's keys
        // must not absorb the record meant for the new capture.
        let new_id = store
            .capture(CapturedAddress {
                raw_address_text: "Lavalle 500".to_string(),
                locality: Some("CABA".to_string()),
                country: Some("AR".to_string()),
                coordinates: Some(Coordinates {
                    latitude: -34.60,
                    longitude: -58.40,
                }),
                package_count: 1,
                ..CapturedAddress::default()
            })
            .local_id();
        assert_ne!(new_id, ids[0], "terminal stops do not merge captures");

        let by_geo = RecordIdentity {
            geo_key: store.get(new_id).unwrap().geo_key.clone(),
            ..RecordIdentity::default()
        };
        assert_eq!(matched_id(&resolve(&store, &by_geo, None, &HashSet::new())), new_id);

        // Even the delivered stop's canonical id no longer resolves to it.
        let by_id = RecordIdentity {
            canonical_id: Some(42),
            ..RecordIdentity::default()
        };
        let resolution = resolve(&store, &by_id, None, &HashSet::new());
        assert!(
            !matches!(resolution, Resolution::Matched { local_id, .. } if local_id == ids[0]),
            "completed stop must not match"
        );
    }

    #[test]
    fn record_with_no_identity_data_is_unmatched() {
        let (store, _) = store_with(&[("Lavalle 500", Some((-34.60, -58.40)), None)]);
        let identity = RecordIdentity::default();
        assert_eq!(resolve(&store, &identity, None, &HashSet::new()), Resolution::Unmatched);
    }
}
