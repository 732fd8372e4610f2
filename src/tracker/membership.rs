//! Per-vehicle membership state and transition detection.
//!
//! Each known vehicle owns a slot guarded by its own mutex. An update runs the
//! whole read-diff-write sequence while holding that vehicle's lock, so two
//! concurrent pings for the same vehicle are serialized and can never diff
//! against the same previous set. The slot table itself sits behind a
//! `RwLock` that is only write-locked the first time a vehicle is seen;
//! updates for different vehicles take it shared and proceed in parallel.
//!
//! The stored state is replaced only after the caller's commit step (the
//! persistence of the ping and its violations) has succeeded, which makes
//! every ping all-or-nothing with respect to membership.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GeoResult, ValidationError};
use crate::geofence::{GeofenceId, GeofenceRef};
use crate::geometry::Coordinate;
use crate::index::GeofenceIndex;
use crate::vehicle::VehicleId;

use super::events::{TransitionEvent, TransitionKind};

/// How pings older than the stored state are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StalePingPolicy {
    /// Apply pings in arrival order regardless of their timestamps.
    #[default]
    ArrivalOrder,
    /// Ignore pings whose timestamp is strictly older than the stored state.
    RejectStale,
}

impl StalePingPolicy {
    /// The configuration name of the policy.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ArrivalOrder => "arrival_order",
            Self::RejectStale => "reject_stale",
        }
    }
}

impl FromStr for StalePingPolicy {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "arrival_order" => Ok(Self::ArrivalOrder),
            "reject_stale" => Ok(Self::RejectStale),
            other => Err(ValidationError::InvalidConfig {
                reason: format!(
                    "unknown stale ping policy '{other}': must be arrival_order or reject_stale"
                ),
            }),
        }
    }
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub stale_ping_policy: StalePingPolicy,
}

/// The geofences containing a vehicle as of its latest processed ping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MembershipState {
    geofences: Vec<GeofenceRef>,
    location: Coordinate,
    timestamp: DateTime<Utc>,
}

impl MembershipState {
    fn new(current: &[GeofenceRef], location: Coordinate, timestamp: DateTime<Utc>) -> Self {
        Self {
            geofences: current.to_vec(),
            location,
            timestamp,
        }
    }

    /// Returns true if the geofence contains the vehicle.
    #[must_use]
    pub fn contains(&self, id: &GeofenceId) -> bool {
        self.geofences.iter().any(|g| &g.id == id)
    }

    /// Ids of the containing geofences, in registration order.
    pub fn geofence_ids(&self) -> impl Iterator<Item = &GeofenceId> + '_ {
        self.geofences.iter().map(|g| &g.id)
    }

    /// The containing geofences, in registration order.
    #[must_use]
    pub fn geofences(&self) -> Vec<GeofenceRef> {
        self.geofences.clone()
    }

    /// Number of containing geofences.
    #[must_use]
    pub fn len(&self) -> usize {
        self.geofences.len()
    }

    /// Returns true if no geofence contains the vehicle.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.geofences.is_empty()
    }

    /// Position of the ping that produced this state.
    #[must_use]
    pub const fn location(&self) -> Coordinate {
        self.location
    }

    /// Timestamp of the ping that produced this state.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// A committed membership change.
#[derive(Debug, Clone, PartialEq)]
pub struct MembershipUpdate<T = ()> {
    /// Geofences containing the new position, in index order.
    pub current: Vec<GeofenceRef>,
    /// Entries first, then exits.
    pub events: Vec<TransitionEvent>,
    /// Whatever the commit step returned.
    pub output: T,
}

/// Result of feeding one ping to the tracker.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome<T = ()> {
    /// The ping was applied and the state replaced.
    Applied(MembershipUpdate<T>),
    /// The ping was older than the stored state and ignored.
    Stale {
        /// The unchanged stored state.
        stored: MembershipState,
    },
}

impl<T> UpdateOutcome<T> {
    /// Events emitted by the update (none for a stale ping).
    #[must_use]
    pub fn events(&self) -> &[TransitionEvent] {
        match self {
            Self::Applied(update) => &update.events,
            Self::Stale { .. } => &[],
        }
    }

    /// Returns true if the ping was ignored as stale.
    #[must_use]
    pub const fn is_stale(&self) -> bool {
        matches!(self, Self::Stale { .. })
    }
}

type Slot = Arc<Mutex<Option<MembershipState>>>;

/// Tracks which geofences contain each vehicle and emits transitions.
#[derive(Debug)]
pub struct MembershipTracker {
    index: Arc<GeofenceIndex>,
    cfg: TrackerConfig,
    slots: RwLock<HashMap<VehicleId, Slot>>,
}

impl MembershipTracker {
    #[allow(missing_docs)]
    #[must_use]
    pub fn new(index: Arc<GeofenceIndex>, cfg: TrackerConfig) -> Self {
        Self {
            index,
            cfg,
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &TrackerConfig {
        &self.cfg
    }

    /// Applies a ping and returns the transitions it caused.
    ///
    /// A stale ping rejected by [`StalePingPolicy::RejectStale`] yields no events.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` for an invalid coordinate.
    pub fn update(
        &self,
        vehicle_id: &VehicleId,
        point: Coordinate,
        timestamp: DateTime<Utc>,
    ) -> GeoResult<Vec<TransitionEvent>> {
        let outcome = self.update_with(vehicle_id, point, timestamp, |_| Ok(()))?;
        Ok(match outcome {
            UpdateOutcome::Applied(update) => update.events,
            UpdateOutcome::Stale { .. } => Vec::new(),
        })
    }

    /// Applies a ping, running `commit` on the detected transitions before the
    /// new state is stored.
    ///
    /// `commit` runs while the vehicle's lock is held. If it fails, the stored
    /// state is left untouched and its error is returned.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` for an invalid coordinate, or the commit error.
    pub fn update_with<T, F>(
        &self,
        vehicle_id: &VehicleId,
        point: Coordinate,
        timestamp: DateTime<Utc>,
        commit: F,
    ) -> GeoResult<UpdateOutcome<T>>
    where
        F: FnOnce(&[TransitionEvent]) -> GeoResult<T>,
    {
        point.validate()?;

        let slot = self.slot(vehicle_id);
        // A panicking commit never reaches the state write below, so a poisoned
        // slot still holds the last committed state.
        let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(stored) = guard.as_ref() {
            if self.cfg.stale_ping_policy == StalePingPolicy::RejectStale
                && timestamp < stored.timestamp
            {
                tracing::warn!(
                    vehicle_id = %vehicle_id,
                    ping_timestamp = %timestamp,
                    stored_timestamp = %stored.timestamp,
                    "ignoring stale ping"
                );
                return Ok(UpdateOutcome::Stale {
                    stored: stored.clone(),
                });
            }
        }

        // Read under the lock so a vehicle never applies an older index
        // snapshot after a newer one.
        let current = self.index.containing(point);
        let events = diff(vehicle_id, guard.as_ref(), &current, point, timestamp);
        let output = commit(&events)?;

        *guard = Some(MembershipState::new(&current, point, timestamp));
        drop(guard);

        for event in &events {
            tracing::debug!(
                vehicle_id = %event.vehicle_id,
                geofence_id = %event.geofence.id,
                kind = %event.kind,
                "geofence transition"
            );
        }

        Ok(UpdateOutcome::Applied(MembershipUpdate {
            current,
            events,
            output,
        }))
    }

    /// The committed state of a vehicle, or `None` if it has never been seen.
    #[must_use]
    pub fn state(&self, vehicle_id: &VehicleId) -> Option<MembershipState> {
        let slot = {
            let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
            let found = slots.get(vehicle_id).cloned();
            found
        }?;
        let guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        guard.clone()
    }

    /// Number of vehicles with a slot.
    #[must_use]
    pub fn vehicle_count(&self) -> usize {
        self.slots.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn slot(&self, vehicle_id: &VehicleId) -> Slot {
        {
            let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(slot) = slots.get(vehicle_id) {
                return Arc::clone(slot);
            }
        }

        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(vehicle_id.clone()).or_default())
    }
}

fn diff(
    vehicle_id: &VehicleId,
    previous: Option<&MembershipState>,
    current: &[GeofenceRef],
    location: Coordinate,
    timestamp: DateTime<Utc>,
) -> Vec<TransitionEvent> {
    let event = |geofence: &GeofenceRef, kind| TransitionEvent {
        vehicle_id: vehicle_id.clone(),
        geofence: geofence.clone(),
        kind,
        location,
        timestamp,
    };

    let was_inside = |id: &GeofenceId| previous.is_some_and(|p| p.contains(id));

    let mut events: Vec<TransitionEvent> = current
        .iter()
        .filter(|g| !was_inside(&g.id))
        .map(|g| event(g, TransitionKind::Entry))
        .collect();

    if let Some(previous) = previous {
        events.extend(
            previous
                .geofences
                .iter()
                .filter(|g| !current.iter().any(|c| c.id == g.id))
                .map(|g| event(g, TransitionKind::Exit)),
        );
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Duration;

    use crate::error::{ExecutionError, GeoError, ValidationError};
    use crate::geofence::{Geofence, GeofenceCategory};
    use crate::geometry::Polygon;
    use crate::storage::StorageError;

    fn square(id: &str, lat0: f64, lon0: f64, size: f64) -> Geofence {
        Geofence::with_id(
            GeofenceId::from(id),
            format!("Zone {id}"),
            GeofenceCategory::DeliveryZone,
            Polygon::from_pairs(&[
                (lat0, lon0),
                (lat0, lon0 + size),
                (lat0 + size, lon0 + size),
                (lat0 + size, lon0),
                (lat0, lon0),
            ]),
        )
        .unwrap()
    }

    fn tracker(policy: StalePingPolicy) -> MembershipTracker {
        let index = GeofenceIndex::from_geofences([
            square("a", 0.0, 0.0, 10.0),
            square("h", 20.0, 20.0, 10.0),
        ])
        .unwrap();
        MembershipTracker::new(
            Arc::new(index),
            TrackerConfig {
                stale_ping_policy: policy,
            },
        )
    }

    fn kinds(events: &[TransitionEvent]) -> Vec<(String, TransitionKind)> {
        events
            .iter()
            .map(|e| (e.geofence.id.to_string(), e.kind))
            .collect()
    }

    #[test]
    fn first_ping_inside_emits_single_entry() {
        let t = tracker(StalePingPolicy::ArrivalOrder);
        let v = VehicleId::from("v");
        let events = t.update(&v, Coordinate::new(5.0, 5.0), Utc::now()).unwrap();
        assert_eq!(kinds(&events), vec![("a".to_string(), TransitionKind::Entry)]);
        assert_eq!(events[0].geofence.name, "Zone a");
    }

    #[test]
    fn first_ping_outside_emits_nothing_but_records_state() {
        let t = tracker(StalePingPolicy::ArrivalOrder);
        let v = VehicleId::from("v");
        assert!(t.update(&v, Coordinate::new(-1.0, -1.0), Utc::now()).unwrap().is_empty());
        let state = t.state(&v).unwrap();
        assert!(state.is_empty());
        assert_eq!(t.vehicle_count(), 1);
    }

    #[test]
    fn zone_a_example_entry_on_second_ping() {
        let t = tracker(StalePingPolicy::ArrivalOrder);
        let v = VehicleId::from("v");
        let t0 = Utc::now();
        assert!(t.update(&v, Coordinate::new(-1.0, -1.0), t0).unwrap().is_empty());
        let events = t
            .update(&v, Coordinate::new(5.0, 5.0), t0 + Duration::seconds(1))
            .unwrap();
        assert_eq!(kinds(&events), vec![("a".to_string(), TransitionKind::Entry)]);
    }

    #[test]
    fn staying_inside_emits_nothing() {
        let t = tracker(StalePingPolicy::ArrivalOrder);
        let v = VehicleId::from("v");
        let t0 = Utc::now();
        t.update(&v, Coordinate::new(5.0, 5.0), t0).unwrap();
        let events = t
            .update(&v, Coordinate::new(6.0, 6.0), t0 + Duration::seconds(1))
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn duplicate_ping_is_idempotent() {
        let t = tracker(StalePingPolicy::ArrivalOrder);
        let v = VehicleId::from("v");
        let t0 = Utc::now();
        assert_eq!(t.update(&v, Coordinate::new(5.0, 5.0), t0).unwrap().len(), 1);
        assert!(t.update(&v, Coordinate::new(5.0, 5.0), t0).unwrap().is_empty());
    }

    #[test]
    fn moving_between_zones_emits_exit_and_entry_once() {
        let t = tracker(StalePingPolicy::ArrivalOrder);
        let v = VehicleId::from("v");
        let t0 = Utc::now();
        t.update(&v, Coordinate::new(5.0, 5.0), t0).unwrap();
        let events = t
            .update(&v, Coordinate::new(25.0, 25.0), t0 + Duration::seconds(1))
            .unwrap();

        let mut got = kinds(&events);
        got.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(
            got,
            vec![
                ("a".to_string(), TransitionKind::Exit),
                ("h".to_string(), TransitionKind::Entry),
            ]
        );
        let exit = events.iter().find(|e| e.kind == TransitionKind::Exit).unwrap();
        assert_eq!(exit.geofence.name, "Zone a");
        assert_eq!(exit.location, Coordinate::new(25.0, 25.0));
    }

    #[test]
    fn out_of_range_point_is_rejected_without_state() {
        let t = tracker(StalePingPolicy::ArrivalOrder);
        let v = VehicleId::from("v");
        let err = t.update(&v, Coordinate::new(95.0, 0.0), Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            GeoError::Validation(ValidationError::OutOfRange { .. })
        ));
        assert!(t.state(&v).is_none());
    }

    #[test]
    fn arrival_order_applies_older_timestamps() {
        let t = tracker(StalePingPolicy::ArrivalOrder);
        let v = VehicleId::from("v");
        let t0 = Utc::now();
        t.update(&v, Coordinate::new(5.0, 5.0), t0).unwrap();

        let events = t
            .update(&v, Coordinate::new(-1.0, -1.0), t0 - Duration::seconds(30))
            .unwrap();
        assert_eq!(kinds(&events), vec![("a".to_string(), TransitionKind::Exit)]);
        assert_eq!(t.state(&v).unwrap().timestamp(), t0 - Duration::seconds(30));
    }

    #[test]
    fn reject_stale_ignores_older_timestamps() {
        let t = tracker(StalePingPolicy::RejectStale);
        let v = VehicleId::from("v");
        let t0 = Utc::now();
        t.update(&v, Coordinate::new(5.0, 5.0), t0).unwrap();

        let outcome = t
            .update_with(&v, Coordinate::new(-1.0, -1.0), t0 - Duration::seconds(30), |_| Ok(()))
            .unwrap();
        assert!(outcome.is_stale());
        assert!(outcome.events().is_empty());

        let state = t.state(&v).unwrap();
        assert!(state.contains(&GeofenceId::from("a")));
        assert_eq!(state.timestamp(), t0);

        // Equal timestamps are not stale.
        let events = t.update(&v, Coordinate::new(-1.0, -1.0), t0).unwrap();
        assert_eq!(kinds(&events), vec![("a".to_string(), TransitionKind::Exit)]);
    }

    #[test]
    fn failed_commit_leaves_state_untouched() {
        let t = tracker(StalePingPolicy::ArrivalOrder);
        let v = VehicleId::from("v");
        let t0 = Utc::now();

        let err = t
            .update_with(&v, Coordinate::new(5.0, 5.0), t0, |events| -> GeoResult<()> {
                assert_eq!(events.len(), 1);
                Err(StorageError::BackendError("disk full".to_string()).into())
            })
            .unwrap_err();
        assert!(matches!(
            err,
            GeoError::Execution(ExecutionError::Storage(StorageError::BackendError(_)))
        ));
        assert!(t.state(&v).map_or(true, |s| s.is_empty()));

        // The retry sees the same previous state and emits the entry again.
        let events = t.update(&v, Coordinate::new(5.0, 5.0), t0).unwrap();
        assert_eq!(kinds(&events), vec![("a".to_string(), TransitionKind::Entry)]);
    }

    #[test]
    fn commit_output_is_returned() {
        let t = tracker(StalePingPolicy::ArrivalOrder);
        let v = VehicleId::from("v");
        let outcome = t
            .update_with(&v, Coordinate::new(5.0, 5.0), Utc::now(), |events| Ok(events.len() * 10))
            .unwrap();
        let UpdateOutcome::Applied(update) = outcome else {
            panic!("expected applied update");
        };
        assert_eq!(update.output, 10);
        assert_eq!(update.current.len(), 1);
    }

    #[test]
    fn new_geofence_is_seen_on_next_ping() {
        let index = Arc::new(GeofenceIndex::new());
        let t = MembershipTracker::new(Arc::clone(&index), TrackerConfig::default());
        let v = VehicleId::from("v");
        let t0 = Utc::now();
        assert!(t.update(&v, Coordinate::new(5.0, 5.0), t0).unwrap().is_empty());

        index.insert(square("late", 0.0, 0.0, 10.0)).unwrap();
        let events = t
            .update(&v, Coordinate::new(5.0, 5.0), t0 + Duration::seconds(1))
            .unwrap();
        assert_eq!(kinds(&events), vec![("late".to_string(), TransitionKind::Entry)]);
    }

    #[test]
    fn stored_state_keeps_registration_order() {
        // Ids sort opposite to registration order.
        let index = GeofenceIndex::from_geofences([
            square("z", 0.0, 0.0, 10.0),
            square("m", 0.0, 0.0, 10.0),
            square("b", 0.0, 0.0, 10.0),
        ])
        .unwrap();
        let t = MembershipTracker::new(Arc::new(index), TrackerConfig::default());
        let v = VehicleId::from("v");

        let outcome = t
            .update_with(&v, Coordinate::new(5.0, 5.0), Utc::now(), |_| Ok(()))
            .unwrap();
        let UpdateOutcome::Applied(update) = outcome else {
            panic!("ping should apply");
        };
        let state = t.state(&v).unwrap();
        assert_eq!(state.geofences(), update.current);
        let ids: Vec<_> = state.geofence_ids().map(ToString::to_string).collect();
        assert_eq!(ids, vec!["z", "m", "b"]);
    }

    #[test]
    fn membership_is_read_after_taking_the_vehicle_lock() {
        use std::thread;

        let index = Arc::new(GeofenceIndex::from_geofences([square("a", 0.0, 0.0, 10.0)]).unwrap());
        let t = Arc::new(MembershipTracker::new(Arc::clone(&index), TrackerConfig::default()));
        let v = VehicleId::from("v");
        let t0 = Utc::now();

        let (holding_tx, holding_rx) = crossbeam_channel::bounded::<()>(0);
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);

        let first = {
            let t = Arc::clone(&t);
            let v = v.clone();
            thread::spawn(move || {
                t.update_with(&v, Coordinate::new(5.0, 5.0), t0, move |_| {
                    holding_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                    Ok(())
                })
                .unwrap()
            })
        };
        holding_rx.recv().unwrap();

        // Queued behind the first ping's lock while the index changes.
        let second = {
            let t = Arc::clone(&t);
            let v = v.clone();
            thread::spawn(move || {
                t.update(&v, Coordinate::new(5.0, 5.0), t0 + Duration::seconds(1))
                    .unwrap()
            })
        };
        thread::sleep(std::time::Duration::from_millis(50));
        index.insert(square("n", 0.0, 0.0, 10.0)).unwrap();
        release_tx.send(()).unwrap();

        assert_eq!(kinds(first.join().unwrap().events()), vec![("a".to_string(), TransitionKind::Entry)]);
        assert_eq!(kinds(&second.join().unwrap()), vec![("n".to_string(), TransitionKind::Entry)]);

        // A later ping sees no spurious exit.
        assert!(t
            .update(&v, Coordinate::new(5.0, 5.0), t0 + Duration::seconds(2))
            .unwrap()
            .is_empty());
        assert_eq!(t.state(&v).unwrap().len(), 2);
    }
}
