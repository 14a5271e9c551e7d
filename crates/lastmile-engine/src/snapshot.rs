//! JSON snapshot persistence.
//!
//! The snapshot is the full externalized engine state: the stop list with
//! statuses, the computed route, and the active run. Everything else
//! (the current stop, remaining counts) is derived on restore. Writes go
//! through a temp file and rename so an interrupted save never corrupts
//! the previous snapshot.

use std::fs;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use lastmile_core::{PlannedRoute, RouteRun, Stop, StopStore};

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot encoding failed: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Persistable engine state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub saved_at: DateTime<Utc>,
    pub stops: Vec<Stop>,
    #[serde(default)]
    pub route: Option<PlannedRoute>,
    #[serde(default)]
    pub run: Option<RouteRun>,
}

impl EngineSnapshot {
    #[must_use]
    pub(crate) fn capture(
        store: &StopStore,
        route: Option<PlannedRoute>,
        run: Option<RouteRun>,
    ) -> Self {
        EngineSnapshot {
            saved_at: Utc::now(),
            stops: store.iter().cloned().collect(),
            route,
            run,
        }
    }

    /// Writes the snapshot atomically: temp file in the same directory,
    /// then rename over the target.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError`] on filesystem or encoding failure.
    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        let json = serde_json::to_vec_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        tracing::debug!(path = %path.display(), stops = self.stops.len(), "snapshot saved");
        Ok(())
    }

    /// Reads a snapshot back.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError`] if the file is missing or malformed.
    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
