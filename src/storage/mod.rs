//! Storage traits and the in-memory backend.
//!
//! The traits define the narrow persistence interface the core calls; any
//! database-backed implementation lives outside this crate.

mod memory;
mod traits;

pub use memory::{
    InMemoryAlertRuleStore, InMemoryGeofenceStore, InMemoryLocationStore, InMemoryStores,
    InMemoryVehicleStore, InMemoryViolationStore,
};
pub use traits::{
    AlertRuleStore, GeofenceStore, LocationStore, StorageError, VehicleStore, ViolationPage,
    ViolationQuery, ViolationStore, DEFAULT_VIOLATION_LIMIT, MAX_VIOLATION_LIMIT,
};
