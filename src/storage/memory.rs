//! In-memory storage backend.
//!
//! This module provides thread-safe in-memory implementations of the storage traits.
//! It is intended for embedded usage, tests, and as a reference implementation.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use crate::alerts::{AlertRule, AlertRuleId, RuleStatus, Violation, ViolationId};
use crate::geofence::{Geofence, GeofenceCategory, GeofenceId};
use crate::storage::traits::{
    AlertRuleStore, GeofenceStore, LocationStore, StorageError, VehicleStore, ViolationPage,
    ViolationQuery, ViolationStore,
};
use crate::vehicle::{LocationPing, Vehicle, VehicleId};

fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

/// Thread-safe in-memory geofence store.
#[derive(Debug, Default)]
pub struct InMemoryGeofenceStore {
    state: RwLock<HashMap<GeofenceId, Geofence>>,
}

impl InMemoryGeofenceStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl GeofenceStore for InMemoryGeofenceStore {
    fn insert(&self, geofence: Geofence) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("geofence.insert"))?;
        if state.contains_key(&geofence.id) {
            return Err(StorageError::DuplicateKey(geofence.id.to_string()));
        }
        state.insert(geofence.id.clone(), geofence);
        Ok(())
    }

    fn get(&self, id: &GeofenceId) -> Result<Option<Geofence>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("geofence.get"))?;
        Ok(state.get(id).cloned())
    }

    fn list(&self, category: Option<GeofenceCategory>) -> Result<Vec<Geofence>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("geofence.list"))?;
        let mut out: Vec<Geofence> = state
            .values()
            .filter(|g| category.map_or(true, |c| g.category == c))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }
}

/// Thread-safe in-memory vehicle store.
#[derive(Debug, Default)]
pub struct InMemoryVehicleStore {
    state: RwLock<HashMap<VehicleId, Vehicle>>,
}

impl InMemoryVehicleStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl VehicleStore for InMemoryVehicleStore {
    fn insert(&self, vehicle: Vehicle) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("vehicle.insert"))?;
        if state.contains_key(&vehicle.id) {
            return Err(StorageError::DuplicateKey(vehicle.id.to_string()));
        }
        state.insert(vehicle.id.clone(), vehicle);
        Ok(())
    }

    fn get(&self, id: &VehicleId) -> Result<Option<Vehicle>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("vehicle.get"))?;
        Ok(state.get(id).cloned())
    }

    fn list(&self) -> Result<Vec<Vehicle>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("vehicle.list"))?;
        let mut out: Vec<Vehicle> = state.values().cloned().collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }
}

#[derive(Debug, Default)]
struct AlertState {
    by_id: HashMap<AlertRuleId, AlertRule>,
    by_geofence: HashMap<GeofenceId, Vec<AlertRuleId>>,
}

/// Thread-safe in-memory alert rule store with a per-geofence index.
#[derive(Debug, Default)]
pub struct InMemoryAlertRuleStore {
    state: RwLock<AlertState>,
}

impl InMemoryAlertRuleStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl AlertRuleStore for InMemoryAlertRuleStore {
    fn insert(&self, rule: AlertRule) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("alert.insert"))?;
        if state.by_id.contains_key(&rule.id) {
            return Err(StorageError::DuplicateKey(rule.id.to_string()));
        }
        state
            .by_geofence
            .entry(rule.geofence_id.clone())
            .or_default()
            .push(rule.id.clone());
        state.by_id.insert(rule.id.clone(), rule);
        Ok(())
    }

    fn get(&self, id: &AlertRuleId) -> Result<Option<AlertRule>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("alert.get"))?;
        Ok(state.by_id.get(id).cloned())
    }

    fn active_for_geofence(&self, geofence_id: &GeofenceId) -> Result<Vec<AlertRule>, StorageError> {
        let state = self
            .state
            .read()
            .map_err(|_| lock_err("alert.active_for_geofence"))?;
        let Some(ids) = state.by_geofence.get(geofence_id) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| state.by_id.get(id))
            .filter(|r| r.is_active())
            .cloned()
            .collect())
    }

    fn list(
        &self,
        geofence_id: Option<&GeofenceId>,
        vehicle_id: Option<&VehicleId>,
    ) -> Result<Vec<AlertRule>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("alert.list"))?;
        let mut out: Vec<AlertRule> = state
            .by_id
            .values()
            .filter(|r| geofence_id.map_or(true, |g| r.geofence_id == *g))
            .filter(|r| vehicle_id.map_or(true, |v| r.vehicle_id.as_ref() == Some(v)))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }

    fn set_status(&self, id: &AlertRuleId, status: RuleStatus) -> Result<AlertRule, StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("alert.set_status"))?;
        let rule = state
            .by_id
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        rule.status = status;
        Ok(rule.clone())
    }
}

#[derive(Debug, Default)]
struct ViolationLog {
    entries: Vec<Violation>,
    ids: HashSet<ViolationId>,
}

/// Thread-safe, append-only in-memory violation log.
#[derive(Debug, Default)]
pub struct InMemoryViolationStore {
    state: RwLock<ViolationLog>,
}

impl InMemoryViolationStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ViolationStore for InMemoryViolationStore {
    fn append(&self, violation: Violation) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("violation.append"))?;
        if !state.ids.insert(violation.id.clone()) {
            return Err(StorageError::DuplicateKey(violation.id.to_string()));
        }
        state.entries.push(violation);
        Ok(())
    }

    fn query(&self, query: &ViolationQuery) -> Result<ViolationPage, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("violation.query"))?;
        let mut matching: Vec<Violation> = state
            .entries
            .iter()
            .filter(|v| query.matches(v))
            .cloned()
            .collect();
        drop(state);

        // Stable sort keeps append order among equal timestamps, newest append first.
        matching.reverse();
        matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        let total_count = matching.len();
        matching.truncate(query.effective_limit());
        Ok(ViolationPage {
            violations: matching,
            total_count,
        })
    }
}

/// Thread-safe in-memory location history.
#[derive(Debug, Default)]
pub struct InMemoryLocationStore {
    state: RwLock<HashMap<VehicleId, Vec<LocationPing>>>,
}

impl InMemoryLocationStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pings recorded for a vehicle.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` on a poisoned lock.
    pub fn count(&self, vehicle_id: &VehicleId) -> Result<usize, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("location.count"))?;
        Ok(state.get(vehicle_id).map_or(0, Vec::len))
    }
}

impl LocationStore for InMemoryLocationStore {
    fn append(&self, ping: LocationPing) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("location.append"))?;
        state.entry(ping.vehicle_id.clone()).or_default().push(ping);
        Ok(())
    }

    fn latest(&self, vehicle_id: &VehicleId) -> Result<Option<LocationPing>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("location.latest"))?;
        Ok(state.get(vehicle_id).and_then(|h| h.last()).cloned())
    }
}

/// Convenience bundle of in-memory stores.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStores {
    /// Geofence store.
    pub geofences: Arc<InMemoryGeofenceStore>,
    /// Vehicle store.
    pub vehicles: Arc<InMemoryVehicleStore>,
    /// Alert rule store.
    pub alerts: Arc<InMemoryAlertRuleStore>,
    /// Violation log.
    pub violations: Arc<InMemoryViolationStore>,
    /// Location history.
    pub locations: Arc<InMemoryLocationStore>,
}

impl InMemoryStores {
    /// Create a new bundle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}
