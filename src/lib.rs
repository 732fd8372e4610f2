//! # GeoWatch - Geofence Membership and Alert Dispatch
//!
//! GeoWatch ingests GPS pings from tracked vehicles, works out which geofences
//! each vehicle occupies, detects entry and exit transitions, matches them
//! against operator-configured alert rules, records violations and pushes
//! live notifications to connected observers.
//!
//! ## Core Concepts
//!
//! - **Geofence**: A named, closed polygon with a category
//! - **MembershipState**: The set of geofences containing a vehicle as of its latest ping
//! - **TransitionEvent**: An entry into or exit from a geofence
//! - **AlertRule**: Selects which transitions are actionable
//! - **NotificationHub**: Fans notifications out to live observers without blocking
//!
//! ## Usage
//!
//! ```rust,ignore
//! use geowatch::{EngineConfig, GeoEngine, InMemoryStores, LocationPing, NewAlertRule, NewGeofence};
//!
//! let engine = GeoEngine::new(EngineConfig::default(), InMemoryStores::new());
//! let zone = engine.add_geofence(NewGeofence { /* ... */ })?;
//! engine.configure_alert(NewAlertRule {
//!     geofence_id: zone.id.clone(),
//!     vehicle_id: None,
//!     event_type: "both".to_string(),
//! })?;
//!
//! let observer = engine.subscribe();
//! let update = engine.update_location(LocationPing::new("veh_1", 5.0, 5.0, chrono::Utc::now()))?;
//! let notification = observer.recv()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod error;
pub mod geofence;
pub mod geometry;
pub mod notification;
pub mod vehicle;

// Detection and matching
pub mod alerts;
pub mod index;
pub mod tracker;

// Delivery, persistence and wiring
pub mod config;
pub mod engine;
pub mod hub;
pub mod storage;

// Re-export primary types at crate root for convenience
pub use alerts::{
    AlertMatch, AlertMatcher, AlertRule, AlertRuleId, EventTypeFilter, MatchResult, RuleStatus,
    Violation, ViolationId,
};
pub use config::EngineConfig;
pub use engine::{
    GeoEngine, GeoStores, LocationUpdate, NewAlertRule, NewGeofence, NewVehicle, VehicleLocation,
};
pub use error::{ExecutionError, GeoError, GeoResult, ValidationError};
pub use geofence::{Geofence, GeofenceCategory, GeofenceId, GeofenceRef};
pub use geometry::{BoundingBox, Coordinate, Polygon};
pub use hub::{HubConfig, NotificationHub, ObserverHandle, ObserverId};
pub use index::{GeofenceIndex, IndexSnapshot};
pub use notification::{Notification, VehicleSummary};
pub use storage::{
    AlertRuleStore, GeofenceStore, InMemoryStores, LocationStore, StorageError, VehicleStore,
    ViolationPage, ViolationQuery, ViolationStore,
};
pub use tracker::{
    MembershipState, MembershipTracker, StalePingPolicy, TrackerConfig, TransitionEvent,
    TransitionKind, UpdateOutcome,
};
pub use vehicle::{LocationPing, Vehicle, VehicleId, VehicleStatus};
