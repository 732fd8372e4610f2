//! Real-time notification records.
//!
//! A notification is built from a matched transition plus vehicle enrichment
//! and is only ever delivered live; the core does not persist it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geofence::{wide_prefixed_id, GeofenceRef};
use crate::geometry::Coordinate;
use crate::tracker::{TransitionEvent, TransitionKind};
use crate::vehicle::{Vehicle, VehicleId};

/// Vehicle display data carried in a notification.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleSummary {
    pub vehicle_id: VehicleId,
    pub vehicle_number: String,
    pub driver_name: String,
}

impl VehicleSummary {
    /// Summary for a registered vehicle.
    #[must_use]
    pub fn from_vehicle(vehicle: &Vehicle) -> Self {
        Self {
            vehicle_id: vehicle.id.clone(),
            vehicle_number: vehicle.vehicle_number.clone(),
            driver_name: vehicle.driver_name.clone(),
        }
    }

    /// Summary for a vehicle with no registration data.
    #[must_use]
    pub fn unregistered(vehicle_id: VehicleId) -> Self {
        Self {
            vehicle_id,
            vehicle_number: String::new(),
            driver_name: String::new(),
        }
    }
}

/// A live alert pushed to observers.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub event_id: String,
    pub event_type: TransitionKind,
    pub timestamp: DateTime<Utc>,
    pub vehicle: VehicleSummary,
    pub geofence: GeofenceRef,
    pub location: Coordinate,
}

impl Notification {
    /// Builds the notification for a matched transition.
    #[must_use]
    pub fn new(event: &TransitionEvent, vehicle: VehicleSummary) -> Self {
        Self {
            event_id: wide_prefixed_id("evt"),
            event_type: event.kind,
            timestamp: event.timestamp,
            vehicle,
            geofence: event.geofence.clone(),
            location: event.location,
        }
    }

    /// Serializes the notification for an observer connection.
    ///
    /// # Errors
    ///
    /// Propagates `serde_json` failures.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
