//! Ping ingestion path.
//!
//! A ping is applied under the vehicle's tracker lock. Transitions are matched
//! first, then the location is appended and the violations recorded.
//! Notifications are published once every write has succeeded, still under
//! the vehicle lock, so each observer sees one vehicle's notifications in
//! commit order.

use serde::{Deserialize, Serialize};

use crate::alerts::{AlertMatch, MatchResult, Violation};
use crate::error::{ExecutionError, GeoResult};
use crate::geofence::GeofenceRef;
use crate::tracker::{TransitionEvent, UpdateOutcome};
use crate::vehicle::{LocationPing, VehicleId};

use super::GeoEngine;

/// Result of [`GeoEngine::update_location`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationUpdate {
    /// Vehicle the ping belonged to.
    pub vehicle_id: VehicleId,
    /// Geofences containing the vehicle after the update.
    pub current_geofences: Vec<GeofenceRef>,
    /// Transitions detected by this ping.
    pub events: Vec<TransitionEvent>,
    /// Violations recorded for those transitions.
    pub violations: Vec<Violation>,
    /// True if the ping was ignored as older than the stored state.
    #[serde(default)]
    pub stale: bool,
}

/// Result of [`GeoEngine::vehicle_location`].
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleLocation {
    pub vehicle_id: VehicleId,
    pub vehicle_number: String,
    /// Most recent persisted ping, if any.
    pub latest: Option<LocationPing>,
    pub current_geofences: Vec<GeofenceRef>,
}

impl GeoEngine {
    /// Processes one location ping end to end.
    ///
    /// The ping is all-or-nothing: if persisting the location or any violation
    /// fails, the vehicle's membership is left as it was and nothing is
    /// published. Notifications for one vehicle are published in the order
    /// its pings commit.
    ///
    /// # Errors
    ///
    /// - `OutOfRange` for invalid coordinates
    /// - `Storage` if persistence fails
    #[tracing::instrument(
        level = "debug",
        skip(self, ping),
        fields(vehicle_id = %ping.vehicle_id)
    )]
    pub fn update_location(&self, ping: LocationPing) -> GeoResult<LocationUpdate> {
        let vehicle_id = ping.vehicle_id.clone();
        let point = ping.coordinate();
        let timestamp = ping.timestamp;

        let outcome = self.tracker.update_with(&vehicle_id, point, timestamp, |events| {
            let matches = self.persist(ping, events)?;
            let violations: Vec<Violation> = matches
                .into_iter()
                .map(|matched| {
                    self.hub.publish(matched.notification);
                    matched.violation
                })
                .collect();
            Ok(violations)
        });

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(err) => {
                if err.is_storage() {
                    tracing::error!(error = %err, "ping persistence failed; membership unchanged");
                }
                return Err(err);
            }
        };

        match outcome {
            UpdateOutcome::Stale { stored } => Ok(LocationUpdate {
                vehicle_id,
                current_geofences: stored.geofences(),
                events: Vec::new(),
                violations: Vec::new(),
                stale: true,
            }),
            UpdateOutcome::Applied(update) => Ok(LocationUpdate {
                vehicle_id,
                current_geofences: update.current,
                events: update.events,
                violations: update.output,
                stale: false,
            }),
        }
    }

    /// Commit step run under the vehicle lock.
    fn persist(&self, ping: LocationPing, events: &[TransitionEvent]) -> GeoResult<Vec<AlertMatch>> {
        // Evaluate everything before the first write so a lookup failure
        // leaves no partial records behind.
        let mut matches = Vec::new();
        for event in events {
            if let MatchResult::Match(matched) = self.matcher.evaluate(event)? {
                matches.push(matched);
            }
        }

        self.stores.locations.append(ping)?;
        for matched in &matches {
            self.matcher.record(matched)?;
        }
        Ok(matches)
    }

    /// Current position and membership of a registered vehicle.
    ///
    /// # Errors
    ///
    /// Returns `VehicleNotFound` for an unregistered vehicle.
    pub fn vehicle_location(&self, vehicle_id: &VehicleId) -> GeoResult<VehicleLocation> {
        let vehicle = self
            .stores
            .vehicles
            .get(vehicle_id)?
            .ok_or_else(|| ExecutionError::VehicleNotFound {
                id: vehicle_id.clone(),
            })?;
        let latest = self.stores.locations.latest(vehicle_id)?;
        let current_geofences = self
            .tracker
            .state(vehicle_id)
            .map(|state| state.geofences())
            .unwrap_or_default();

        Ok(VehicleLocation {
            vehicle_id: vehicle.id,
            vehicle_number: vehicle.vehicle_number,
            latest,
            current_geofences,
        })
    }
}
