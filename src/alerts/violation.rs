//! Persisted records of actionable transitions.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geofence::{wide_prefixed_id, GeofenceId};
use crate::tracker::{TransitionEvent, TransitionKind};
use crate::vehicle::VehicleId;

/// Stable violation identifier (`viol_` followed by 32 hex chars).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViolationId(String);

impl ViolationId {
    /// Generates a fresh identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(wide_prefixed_id("viol"))
    }
}

impl fmt::Display for ViolationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Append-only record of one actionable transition.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub id: ViolationId,
    pub vehicle_id: VehicleId,
    pub geofence_id: GeofenceId,
    pub event_type: TransitionKind,
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
}

impl Violation {
    /// Builds the violation for a transition.
    #[must_use]
    pub fn from_event(event: &TransitionEvent) -> Self {
        Self {
            id: ViolationId::generate(),
            vehicle_id: event.vehicle_id.clone(),
            geofence_id: event.geofence.id.clone(),
            event_type: event.kind,
            latitude: event.location.latitude,
            longitude: event.location.longitude,
            timestamp: event.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn generated_ids_are_wide_and_distinct() {
        let id = ViolationId::generate();
        assert!(id.to_string().starts_with("viol_"));
        assert_eq!(id.to_string().len(), "viol_".len() + 32);

        let ids: HashSet<_> = (0..300_000).map(|_| ViolationId::generate()).collect();
        assert_eq!(ids.len(), 300_000);
    }
}
