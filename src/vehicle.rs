//! Vehicle identity, enrichment data and location pings.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::geofence::prefixed_id;
use crate::geometry::Coordinate;

/// Stable vehicle identifier (`veh_xxxxxxxx` when generated).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VehicleId(String);

impl VehicleId {
    /// Generates a fresh identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(prefixed_id("veh"))
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VehicleId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for VehicleId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleStatus {
    #[default]
    Active,
    Inactive,
}

impl FromStr for VehicleStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            other => Err(ValidationError::InvalidVehicleStatus {
                value: other.to_string(),
            }),
        }
    }
}

/// A registered vehicle. The core only uses it for notification enrichment.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: VehicleId,
    pub vehicle_number: String,
    pub driver_name: String,
    pub vehicle_type: String,
    pub phone: String,
    pub status: VehicleStatus,
    pub created_at: DateTime<Utc>,
}

impl Vehicle {
    /// Builds an active vehicle with a generated id.
    ///
    /// # Errors
    ///
    /// Returns `MissingField` naming the first empty field.
    pub fn new(
        vehicle_number: impl Into<String>,
        driver_name: impl Into<String>,
        vehicle_type: impl Into<String>,
        phone: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let vehicle = Self {
            id: VehicleId::generate(),
            vehicle_number: vehicle_number.into(),
            driver_name: driver_name.into(),
            vehicle_type: vehicle_type.into(),
            phone: phone.into(),
            status: VehicleStatus::Active,
            created_at: Utc::now(),
        };

        for (field, value) in [
            ("vehicle_number", &vehicle.vehicle_number),
            ("driver_name", &vehicle.driver_name),
            ("vehicle_type", &vehicle.vehicle_type),
            ("phone", &vehicle.phone),
        ] {
            if value.trim().is_empty() {
                return Err(ValidationError::MissingField {
                    field: field.to_string(),
                });
            }
        }

        Ok(vehicle)
    }
}

/// A single GPS fix for a vehicle.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationPing {
    pub vehicle_id: VehicleId,
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
}

impl LocationPing {
    #[allow(missing_docs)]
    #[must_use]
    pub fn new(
        vehicle_id: impl Into<VehicleId>,
        latitude: f64,
        longitude: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            vehicle_id: vehicle_id.into(),
            latitude,
            longitude,
            timestamp,
        }
    }

    /// The ping position as a coordinate.
    #[must_use]
    pub const fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}
