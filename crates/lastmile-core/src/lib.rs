//! Domain types and pure state machines for last-mile delivery routes:
//! stop records, derived reconciliation keys, the execution sequencer, and
//! the completion summary. No I/O lives here; network and persistence are
//! the engine's concern.

pub mod error;
pub mod geokey;
pub mod run;
pub mod sequencer;
pub mod stop;
pub mod store;
pub mod summary;

pub use error::CoreError;
pub use run::{OriginPoint, PlannedRoute, RouteRun};
pub use stop::{CapturedAddress, Coordinates, Stop, StopStatus, UnitDetails};
pub use store::{CaptureResult, StopStore};
pub use summary::RunSummary;
