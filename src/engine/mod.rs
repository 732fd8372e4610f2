//! GeoWatch engine facade.
//!
//! This module wires the geofence index, the membership tracker, the alert
//! matcher and the notification hub to a set of pluggable stores. Registration
//! operations live here; the ping ingestion path lives in `ingest`.

mod ingest;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::alerts::{AlertMatcher, AlertRule, AlertRuleId, EventTypeFilter, RuleStatus};
use crate::config::EngineConfig;
use crate::error::{ExecutionError, GeoResult};
use crate::geofence::{Geofence, GeofenceCategory, GeofenceId};
use crate::geometry::Polygon;
use crate::hub::{NotificationHub, ObserverHandle};
use crate::index::GeofenceIndex;
use crate::storage::{
    AlertRuleStore, GeofenceStore, InMemoryStores, LocationStore, VehicleStore, ViolationPage,
    ViolationQuery, ViolationStore,
};
use crate::tracker::MembershipTracker;
use crate::vehicle::{Vehicle, VehicleId};

pub use ingest::{LocationUpdate, VehicleLocation};

/// The set of stores an engine runs against.
#[allow(missing_docs)]
#[derive(Clone)]
pub struct GeoStores {
    pub geofences: Arc<dyn GeofenceStore>,
    pub vehicles: Arc<dyn VehicleStore>,
    pub alerts: Arc<dyn AlertRuleStore>,
    pub violations: Arc<dyn ViolationStore>,
    pub locations: Arc<dyn LocationStore>,
}

impl std::fmt::Debug for GeoStores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeoStores").finish_non_exhaustive()
    }
}

impl From<InMemoryStores> for GeoStores {
    fn from(stores: InMemoryStores) -> Self {
        Self {
            geofences: stores.geofences,
            vehicles: stores.vehicles,
            alerts: stores.alerts,
            violations: stores.violations,
            locations: stores.locations,
        }
    }
}

/// Input for [`GeoEngine::add_geofence`].
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewGeofence {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Category name, validated on use.
    pub category: String,
    pub coordinates: Polygon,
}

/// Input for [`GeoEngine::register_vehicle`].
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewVehicle {
    pub vehicle_number: String,
    pub driver_name: String,
    pub vehicle_type: String,
    pub phone: String,
}

/// Input for [`GeoEngine::configure_alert`].
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAlertRule {
    pub geofence_id: GeofenceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_id: Option<VehicleId>,
    /// `entry`, `exit` or `both`.
    pub event_type: String,
}

/// GeoWatch engine.
#[derive(Clone)]
pub struct GeoEngine {
    cfg: EngineConfig,
    stores: GeoStores,
    index: Arc<GeofenceIndex>,
    tracker: Arc<MembershipTracker>,
    matcher: Arc<AlertMatcher>,
    hub: NotificationHub,
}

impl std::fmt::Debug for GeoEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeoEngine")
            .field("cfg", &self.cfg)
            .field("geofences", &self.index.len())
            .field("observers", &self.hub.observer_count())
            .finish_non_exhaustive()
    }
}

impl GeoEngine {
    /// Create an engine with an empty geofence index.
    #[must_use]
    pub fn new(cfg: EngineConfig, stores: impl Into<GeoStores>) -> Self {
        Self::with_index(cfg, stores.into(), GeofenceIndex::new())
    }

    /// Create an engine whose index is populated from the geofence store.
    ///
    /// # Errors
    ///
    /// Returns a storage error if listing fails, or a validation error if a
    /// stored polygon is malformed.
    pub fn load(cfg: EngineConfig, stores: impl Into<GeoStores>) -> GeoResult<Self> {
        let stores = stores.into();
        let mut geofences = stores.geofences.list(None)?;
        // Listing is newest first; the index keeps registration order.
        geofences.reverse();
        let count = geofences.len();
        let index = GeofenceIndex::from_geofences(geofences)?;
        tracing::info!(geofences = count, "geofence index loaded");
        Ok(Self::with_index(cfg, stores, index))
    }

    fn with_index(cfg: EngineConfig, stores: GeoStores, index: GeofenceIndex) -> Self {
        let index = Arc::new(index);
        let tracker = Arc::new(MembershipTracker::new(
            Arc::clone(&index),
            cfg.tracker.clone(),
        ));
        let matcher = Arc::new(AlertMatcher::new(
            Arc::clone(&stores.alerts),
            Arc::clone(&stores.vehicles),
            Arc::clone(&stores.violations),
        ));
        let hub = NotificationHub::new(cfg.hub.clone());
        Self {
            cfg,
            stores,
            index,
            tracker,
            matcher,
            hub,
        }
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    /// The stores backing this engine.
    #[must_use]
    pub const fn stores(&self) -> &GeoStores {
        &self.stores
    }

    /// The geofence index.
    #[must_use]
    pub fn index(&self) -> &Arc<GeofenceIndex> {
        &self.index
    }

    /// The membership tracker.
    #[must_use]
    pub fn tracker(&self) -> &Arc<MembershipTracker> {
        &self.tracker
    }

    /// The notification hub.
    #[must_use]
    pub const fn hub(&self) -> &NotificationHub {
        &self.hub
    }

    /// Registers a live observer.
    #[must_use]
    pub fn subscribe(&self) -> ObserverHandle {
        self.hub.subscribe()
    }

    /// Validates, persists and indexes a new geofence.
    ///
    /// # Errors
    ///
    /// - `Validation` for an empty name, unknown category or malformed polygon
    /// - `Storage` if the store rejects the geofence
    pub fn add_geofence(&self, input: NewGeofence) -> GeoResult<Geofence> {
        let category: GeofenceCategory = input.category.parse()?;
        let mut geofence = Geofence::new(input.name, category, input.coordinates)?;
        if let Some(description) = input.description {
            geofence = geofence.with_description(description);
        }

        self.stores.geofences.insert(geofence.clone())?;
        self.index.insert(geofence.clone())?;

        tracing::info!(
            geofence_id = %geofence.id,
            name = %geofence.name,
            category = %geofence.category,
            "geofence registered"
        );
        Ok(geofence)
    }

    /// Lists geofences, newest first.
    ///
    /// # Errors
    ///
    /// Returns the store's error.
    pub fn list_geofences(&self, category: Option<GeofenceCategory>) -> GeoResult<Vec<Geofence>> {
        Ok(self.stores.geofences.list(category)?)
    }

    /// Registers a vehicle with a generated id.
    ///
    /// # Errors
    ///
    /// Returns `MissingField` for an empty field, or the store's error.
    pub fn register_vehicle(&self, input: NewVehicle) -> GeoResult<Vehicle> {
        let vehicle = Vehicle::new(
            input.vehicle_number,
            input.driver_name,
            input.vehicle_type,
            input.phone,
        )?;
        self.stores.vehicles.insert(vehicle.clone())?;
        tracing::info!(vehicle_id = %vehicle.id, "vehicle registered");
        Ok(vehicle)
    }

    /// Fetches a vehicle.
    ///
    /// # Errors
    ///
    /// Returns `VehicleNotFound` for an unknown id.
    pub fn get_vehicle(&self, id: &VehicleId) -> GeoResult<Vehicle> {
        self.stores
            .vehicles
            .get(id)?
            .ok_or_else(|| ExecutionError::VehicleNotFound { id: id.clone() }.into())
    }

    /// Lists vehicles, newest first.
    ///
    /// # Errors
    ///
    /// Returns the store's error.
    pub fn list_vehicles(&self) -> GeoResult<Vec<Vehicle>> {
        Ok(self.stores.vehicles.list()?)
    }

    /// Creates an active alert rule.
    ///
    /// # Errors
    ///
    /// - `InvalidEventType` for an unknown event type
    /// - `GeofenceNotFound` / `VehicleNotFound` for unknown references
    pub fn configure_alert(&self, input: NewAlertRule) -> GeoResult<AlertRule> {
        let event_type: EventTypeFilter = input.event_type.parse()?;

        if self.stores.geofences.get(&input.geofence_id)?.is_none() {
            return Err(ExecutionError::GeofenceNotFound {
                id: input.geofence_id,
            }
            .into());
        }
        if let Some(vehicle_id) = &input.vehicle_id {
            if self.stores.vehicles.get(vehicle_id)?.is_none() {
                return Err(ExecutionError::VehicleNotFound {
                    id: vehicle_id.clone(),
                }
                .into());
            }
        }

        let rule = AlertRule::new(input.geofence_id, input.vehicle_id, event_type);
        self.stores.alerts.insert(rule.clone())?;
        tracing::info!(
            alert_id = %rule.id,
            geofence_id = %rule.geofence_id,
            event_type = rule.event_type.as_str(),
            "alert rule configured"
        );
        Ok(rule)
    }

    /// Lists alert rules, newest first.
    ///
    /// # Errors
    ///
    /// Returns the store's error.
    pub fn list_alerts(
        &self,
        geofence_id: Option<&GeofenceId>,
        vehicle_id: Option<&VehicleId>,
    ) -> GeoResult<Vec<AlertRule>> {
        Ok(self.stores.alerts.list(geofence_id, vehicle_id)?)
    }

    /// Activates or deactivates a rule.
    ///
    /// # Errors
    ///
    /// Returns `Storage(NotFound)` for an unknown rule.
    pub fn set_alert_status(&self, id: &AlertRuleId, status: RuleStatus) -> GeoResult<AlertRule> {
        let rule = self.stores.alerts.set_status(id, status)?;
        tracing::info!(alert_id = %rule.id, status = ?rule.status, "alert rule status changed");
        Ok(rule)
    }

    /// Queries recorded violations.
    ///
    /// # Errors
    ///
    /// Returns the store's error.
    pub fn violations(&self, query: &ViolationQuery) -> GeoResult<ViolationPage> {
        Ok(self.stores.violations.query(query)?)
    }
}
