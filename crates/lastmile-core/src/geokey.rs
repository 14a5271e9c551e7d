//! Derived location keys used for reconciliation.
//!
//! Two independent producers (the local capture flow and the routing
//! authority) must be able to agree on "same physical place" without
//! exchanging identifiers first. Both derive keys from the same inputs:
//!
//! - [`geoloc_hash`] — SHA-256 over the address *without* unit details,
//!   identifying the building/plot.
//! - [`address_fingerprint`] — SHA-256 over the address *including* floor
//!   and apartment, identifying the exact delivery unit. Used to merge
//!   duplicate captures and to disambiguate stops that share a geo key.
//! - [`coordinate_key`] — the fallback when only raw coordinates are
//!   available on one side.

use sha2::{Digest, Sha256};

/// Decimal digits kept per axis when deriving a coordinate key.
///
/// Five digits is roughly a 1.1 m band at the equator; coordinates produced
/// by independent geocoding runs of the same address drift well below that,
/// so ties within the band are treated as the same location.
pub const COORDINATE_PRECISION: u32 = 5;

fn sha256_hex(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Builds the base string hashed by both [`geoloc_hash`] and
/// [`address_fingerprint`]: comma-joined non-empty fields, trimmed and
/// lowercased so formatting differences between producers cancel out.
fn joined_lower(fields: &[Option<&str>]) -> String {
    fields
        .iter()
        .filter_map(|f| f.map(str::trim).filter(|s| !s.is_empty()))
        .collect::<Vec<_>>()
        .join(", ")
        .to_lowercase()
}

/// Location hash identifying a physical building or plot.
///
/// Unit details (floor, apartment) are deliberately excluded so that
/// several stops in the same building share one key and can be grouped
/// into a single route point by the authority.
#[must_use]
pub fn geoloc_hash(
    street: &str,
    locality: Option<&str>,
    region: Option<&str>,
    country: Option<&str>,
) -> String {
    sha256_hex(&joined_lower(&[Some(street), locality, region, country]))
}

/// Fingerprint identifying one exact delivery unit.
///
/// Includes floor and apartment, so two packages for different units of the
/// same building get distinct fingerprints while repeated captures of the
/// same unit collide (and are merged by the store).
#[must_use]
pub fn address_fingerprint(
    street: &str,
    locality: Option<&str>,
    region: Option<&str>,
    country: Option<&str>,
    floor: Option<&str>,
    apartment: Option<&str>,
) -> String {
    sha256_hex(&joined_lower(&[
        Some(street),
        locality,
        region,
        country,
        floor,
        apartment,
    ]))
}

/// Coordinate-rounded key: each axis independently rounded to
/// [`COORDINATE_PRECISION`] decimals, then concatenated.
///
/// The rounding is done on the decimal representation rather than on the
/// float itself so that `-34.596498` and `-34.59650` produce the identical
/// string `-34.59650`.
#[must_use]
pub fn coordinate_key(latitude: f64, longitude: f64) -> String {
    let p = COORDINATE_PRECISION as usize;
    format!("{latitude:.p$},{longitude:.p$}")
}
