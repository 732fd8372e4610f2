//! Geofence types.
//!
//! A geofence is a named closed polygon used as a monitoring boundary. Once
//! registered it is immutable from the core's point of view.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::geometry::{self, BoundingBox, Coordinate, Polygon};

/// Stable geofence identifier (`geo_xxxxxxxx`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GeofenceId(String);

impl GeofenceId {
    /// Generates a fresh identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(prefixed_id("geo"))
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GeofenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GeofenceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for GeofenceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Builds `<prefix>_<first 8 hex chars of a v4 uuid>`.
///
/// Used for operator-created records, where volumes stay small.
pub(crate) fn prefixed_id(prefix: &str) -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!("{prefix}_{}", &uuid[..8])
}

/// Builds `<prefix>_<32 hex chars of a v4 uuid>` for high-volume records.
pub(crate) fn wide_prefixed_id(prefix: &str) -> String {
    format!("{prefix}_{}", Uuid::new_v4().simple())
}

/// Closed set of geofence categories.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeofenceCategory {
    DeliveryZone,
    RestrictedZone,
    TollZone,
    CustomerArea,
}

impl GeofenceCategory {
    /// All categories, in declaration order.
    pub const ALL: [Self; 4] = [
        Self::DeliveryZone,
        Self::RestrictedZone,
        Self::TollZone,
        Self::CustomerArea,
    ];

    /// The wire name of the category.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::DeliveryZone => "delivery_zone",
            Self::RestrictedZone => "restricted_zone",
            Self::TollZone => "toll_zone",
            Self::CustomerArea => "customer_area",
        }
    }
}

impl fmt::Display for GeofenceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GeofenceCategory {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ValidationError::InvalidCategory {
                value: s.to_string(),
            })
    }
}

/// A registered geofence.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geofence {
    pub id: GeofenceId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub category: GeofenceCategory,
    #[serde(rename = "coordinates")]
    pub polygon: Polygon,
    pub created_at: DateTime<Utc>,
}

impl Geofence {
    /// Validates the polygon and builds a geofence with a generated id.
    ///
    /// # Errors
    ///
    /// Returns `MissingField` for an empty name, or the polygon's validation error.
    pub fn new(
        name: impl Into<String>,
        category: GeofenceCategory,
        polygon: Polygon,
    ) -> Result<Self, ValidationError> {
        Self::with_id(GeofenceId::generate(), name, category, polygon)
    }

    /// Like [`Geofence::new`] with a caller-supplied identifier.
    ///
    /// # Errors
    ///
    /// Same as [`Geofence::new`].
    pub fn with_id(
        id: GeofenceId,
        name: impl Into<String>,
        category: GeofenceCategory,
        polygon: Polygon,
    ) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "name".to_string(),
            });
        }
        geometry::validate(&polygon)?;
        Ok(Self {
            id,
            name,
            description: None,
            category,
            polygon,
            created_at: Utc::now(),
        })
    }

    /// Attaches a free-form description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Point containment, boundary inclusive.
    #[must_use]
    pub fn contains(&self, point: Coordinate) -> bool {
        self.polygon.contains(point)
    }

    /// Bounds of the polygon. Validated geofences always have one.
    #[must_use]
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        self.polygon.bounding_box()
    }

    /// Lightweight reference used in query results and transition events.
    #[must_use]
    pub fn to_ref(&self) -> GeofenceRef {
        GeofenceRef {
            id: self.id.clone(),
            name: self.name.clone(),
            category: self.category,
        }
    }
}

/// Identifier plus display data of a geofence.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GeofenceRef {
    #[serde(rename = "geofence_id")]
    pub id: GeofenceId,
    #[serde(rename = "geofence_name")]
    pub name: String,
    pub category: GeofenceCategory,
}
