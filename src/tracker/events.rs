//! Transition event types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geofence::GeofenceRef;
use crate::geometry::Coordinate;
use crate::vehicle::VehicleId;

/// Direction of a membership change.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    Entry,
    Exit,
}

impl TransitionKind {
    /// The wire name of the kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Entry => "entry",
            Self::Exit => "exit",
        }
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A detected entry into or exit from one geofence.
///
/// Produced once per transition by the membership tracker and consumed by the
/// alert matcher.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub vehicle_id: VehicleId,
    pub geofence: GeofenceRef,
    pub kind: TransitionKind,
    pub location: Coordinate,
    pub timestamp: DateTime<Utc>,
}
