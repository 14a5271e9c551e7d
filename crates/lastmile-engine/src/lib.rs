//! The delivery route execution engine.
//!
//! Ties the pure domain model of `lastmile-core` to the routing authority
//! client of `lastmile-authority`: submission and reconciliation of
//! captured stops, route computation with an injected origin, and the
//! acknowledgement-gated confirmation walk, with JSON snapshots for
//! session persistence.

pub mod engine;
pub mod error;
pub mod resolver;
pub mod snapshot;

pub use engine::{
    DeliveryEngine, DeliveryProgress, NormalizationOutcome, RouteOutcome, StartOutcome,
    UnmatchedRecord,
};
pub use error::EngineError;
pub use lastmile_core::sequencer::StopOutcome;
pub use snapshot::{EngineSnapshot, SnapshotError};
