//! Alert rule definitions.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::geofence::{prefixed_id, GeofenceId};
use crate::tracker::{TransitionEvent, TransitionKind};
use crate::vehicle::VehicleId;

/// Stable rule identifier (`alert_xxxxxxxx`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertRuleId(String);

impl AlertRuleId {
    /// Generates a fresh identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(prefixed_id("alert"))
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AlertRuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AlertRuleId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Which transition kinds a rule reacts to.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventTypeFilter {
    Entry,
    Exit,
    Both,
}

impl EventTypeFilter {
    /// Returns true if the filter selects `kind`.
    #[must_use]
    pub const fn matches(&self, kind: TransitionKind) -> bool {
        matches!(
            (self, kind),
            (Self::Both, _)
                | (Self::Entry, TransitionKind::Entry)
                | (Self::Exit, TransitionKind::Exit)
        )
    }

    /// The wire name of the filter.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Entry => "entry",
            Self::Exit => "exit",
            Self::Both => "both",
        }
    }
}

impl FromStr for EventTypeFilter {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "entry" => Ok(Self::Entry),
            "exit" => Ok(Self::Exit),
            "both" => Ok(Self::Both),
            other => Err(ValidationError::InvalidEventType {
                value: other.to_string(),
            }),
        }
    }
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    #[default]
    Active,
    Inactive,
}

/// Operator-configured filter selecting actionable transitions.
///
/// A rule without a vehicle applies to every vehicle on its geofence.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRule {
    #[serde(rename = "alert_id")]
    pub id: AlertRuleId,
    pub geofence_id: GeofenceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_id: Option<VehicleId>,
    pub event_type: EventTypeFilter,
    pub status: RuleStatus,
    pub created_at: DateTime<Utc>,
}

impl AlertRule {
    /// Creates an active rule with a generated id.
    #[must_use]
    pub fn new(
        geofence_id: GeofenceId,
        vehicle_id: Option<VehicleId>,
        event_type: EventTypeFilter,
    ) -> Self {
        Self {
            id: AlertRuleId::generate(),
            geofence_id,
            vehicle_id,
            event_type,
            status: RuleStatus::Active,
            created_at: Utc::now(),
        }
    }

    /// Returns true if the rule is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == RuleStatus::Active
    }

    /// Returns true if this rule makes `event` actionable.
    #[must_use]
    pub fn applies_to(&self, event: &TransitionEvent) -> bool {
        self.is_active()
            && self.geofence_id == event.geofence.id
            && self
                .vehicle_id
                .as_ref()
                .map_or(true, |v| *v == event.vehicle_id)
            && self.event_type.matches(event.kind)
    }
}
