//! Membership tracking.
//!
//! The tracker keeps, per vehicle, the set of geofences that contained its
//! latest processed ping, and turns each new ping into entry/exit transitions
//! by diffing the freshly computed set against the stored one.

/// Transition event types.
pub mod events;
/// Per-vehicle state and the guarded update path.
pub mod membership;

pub use events::{TransitionEvent, TransitionKind};
pub use membership::{
    MembershipState, MembershipTracker, MembershipUpdate, StalePingPolicy, TrackerConfig,
    UpdateOutcome,
};
