//! Abstract storage traits for GeoWatch.
//!
//! Persistence is an external collaborator. The core talks to it only through
//! these narrow traits, which lets the same engine run against the in-memory
//! backends (embedded use, tests) or a database-backed implementation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::alerts::{AlertRule, AlertRuleId, RuleStatus, Violation};
use crate::geofence::{Geofence, GeofenceCategory, GeofenceId};
use crate::vehicle::{LocationPing, Vehicle, VehicleId};

/// Default number of violations returned by [`ViolationStore::query`].
pub const DEFAULT_VIOLATION_LIMIT: usize = 50;

/// Hard cap on the number of violations returned by [`ViolationStore::query`].
pub const MAX_VIOLATION_LIMIT: usize = 500;

/// Errors that can occur during storage operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Key already exists.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// Record not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Backend error.
    #[error("Storage backend error: {0}")]
    BackendError(String),

    /// Serialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Connection failed.
    #[error("Connection error: {0}")]
    ConnectionError(String),
}

/// Storage trait for geofences.
pub trait GeofenceStore: Send + Sync {
    /// Insert a new geofence. Returns error if the ID already exists.
    fn insert(&self, geofence: Geofence) -> Result<(), StorageError>;

    /// Get a geofence by ID.
    fn get(&self, id: &GeofenceId) -> Result<Option<Geofence>, StorageError>;

    /// List geofences, newest first, optionally restricted to one category.
    fn list(&self, category: Option<GeofenceCategory>) -> Result<Vec<Geofence>, StorageError>;
}

/// Storage trait for vehicles.
pub trait VehicleStore: Send + Sync {
    /// Insert a new vehicle. Returns error if the ID already exists.
    fn insert(&self, vehicle: Vehicle) -> Result<(), StorageError>;

    /// Get a vehicle by ID.
    fn get(&self, id: &VehicleId) -> Result<Option<Vehicle>, StorageError>;

    /// List all vehicles, newest first.
    fn list(&self) -> Result<Vec<Vehicle>, StorageError>;
}

/// Storage trait for alert rules.
///
/// The core only reads rules; creation and status changes come from the
/// configuration side.
pub trait AlertRuleStore: Send + Sync {
    /// Insert a new rule. Returns error if the ID already exists.
    fn insert(&self, rule: AlertRule) -> Result<(), StorageError>;

    /// Get a rule by ID.
    fn get(&self, id: &AlertRuleId) -> Result<Option<AlertRule>, StorageError>;

    /// All active rules attached to a geofence.
    fn active_for_geofence(&self, geofence_id: &GeofenceId) -> Result<Vec<AlertRule>, StorageError>;

    /// List rules, newest first, with optional exact-match filters.
    fn list(
        &self,
        geofence_id: Option<&GeofenceId>,
        vehicle_id: Option<&VehicleId>,
    ) -> Result<Vec<AlertRule>, StorageError>;

    /// Change a rule's status. Returns `NotFound` for an unknown rule.
    fn set_status(&self, id: &AlertRuleId, status: RuleStatus) -> Result<AlertRule, StorageError>;
}

/// Filters for [`ViolationStore::query`].
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViolationQuery {
    pub vehicle_id: Option<VehicleId>,
    pub geofence_id: Option<GeofenceId>,
    /// Inclusive lower bound on the violation timestamp.
    pub start: Option<DateTime<Utc>>,
    /// Inclusive upper bound on the violation timestamp.
    pub end: Option<DateTime<Utc>>,
    /// Defaults to [`DEFAULT_VIOLATION_LIMIT`], clamped to [`MAX_VIOLATION_LIMIT`].
    pub limit: Option<usize>,
}

impl ViolationQuery {
    /// The effective result limit.
    #[must_use]
    pub fn effective_limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_VIOLATION_LIMIT)
            .min(MAX_VIOLATION_LIMIT)
    }

    /// Returns true if the violation passes every filter.
    #[must_use]
    pub fn matches(&self, v: &Violation) -> bool {
        self.vehicle_id.as_ref().map_or(true, |id| *id == v.vehicle_id)
            && self.geofence_id.as_ref().map_or(true, |id| *id == v.geofence_id)
            && self.start.map_or(true, |s| v.timestamp >= s)
            && self.end.map_or(true, |e| v.timestamp <= e)
    }
}

/// Result of a violation query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViolationPage {
    /// Matching violations, newest first, truncated to the limit.
    pub violations: Vec<Violation>,
    /// Number of matching violations before the limit was applied.
    pub total_count: usize,
}

/// Append-only storage for violations.
pub trait ViolationStore: Send + Sync {
    /// Append a violation. Returns error if the ID already exists.
    fn append(&self, violation: Violation) -> Result<(), StorageError>;

    /// Query violations.
    fn query(&self, query: &ViolationQuery) -> Result<ViolationPage, StorageError>;
}

/// Append-only storage for the positional time series.
pub trait LocationStore: Send + Sync {
    /// Append a processed ping.
    fn append(&self, ping: LocationPing) -> Result<(), StorageError>;

    /// The most recently appended ping for a vehicle.
    fn latest(&self, vehicle_id: &VehicleId) -> Result<Option<LocationPing>, StorageError>;
}
