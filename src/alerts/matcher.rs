//! Alert matching.
//!
//! The matcher decides whether a transition is actionable under the active
//! rules of its geofence and, if so, builds the violation and the enriched
//! notification. Recording the violation is a separate step so the caller
//! can run it inside the tracker's commit.

use std::sync::Arc;

use crate::error::GeoResult;
use crate::notification::{Notification, VehicleSummary};
use crate::storage::{AlertRuleStore, VehicleStore, ViolationStore};
use crate::tracker::TransitionEvent;

use super::rule::AlertRuleId;
use super::violation::Violation;

/// An actionable transition.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub struct AlertMatch {
    /// Every rule that selected the event. One violation is recorded regardless of count.
    pub rules: Vec<AlertRuleId>,
    pub violation: Violation,
    pub notification: Notification,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult {
    /// No active rule selects the event.
    NoMatch,
    Match(AlertMatch),
}

impl MatchResult {
    /// Returns true if at least one rule matched.
    #[must_use]
    pub const fn is_match(&self) -> bool {
        matches!(self, Self::Match(_))
    }
}

/// Evaluates transitions against alert rules.
pub struct AlertMatcher {
    rules: Arc<dyn AlertRuleStore>,
    vehicles: Arc<dyn VehicleStore>,
    violations: Arc<dyn ViolationStore>,
}

impl std::fmt::Debug for AlertMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertMatcher").finish_non_exhaustive()
    }
}

impl AlertMatcher {
    #[allow(missing_docs)]
    #[must_use]
    pub fn new(
        rules: Arc<dyn AlertRuleStore>,
        vehicles: Arc<dyn VehicleStore>,
        violations: Arc<dyn ViolationStore>,
    ) -> Self {
        Self {
            rules,
            vehicles,
            violations,
        }
    }

    /// Decides whether `event` is actionable. Does not write anything.
    ///
    /// Unregistered vehicles are enriched with blank display data.
    ///
    /// # Errors
    ///
    /// Returns a storage error if a rule or vehicle lookup fails.
    pub fn evaluate(&self, event: &TransitionEvent) -> GeoResult<MatchResult> {
        let rules: Vec<AlertRuleId> = self
            .rules
            .active_for_geofence(&event.geofence.id)?
            .into_iter()
            .filter(|r| r.applies_to(event))
            .map(|r| r.id)
            .collect();

        if rules.is_empty() {
            return Ok(MatchResult::NoMatch);
        }

        let vehicle = match self.vehicles.get(&event.vehicle_id)? {
            Some(v) => VehicleSummary::from_vehicle(&v),
            None => VehicleSummary::unregistered(event.vehicle_id.clone()),
        };

        Ok(MatchResult::Match(AlertMatch {
            rules,
            violation: Violation::from_event(event),
            notification: Notification::new(event, vehicle),
        }))
    }

    /// Appends the match's violation to the violation store.
    ///
    /// # Errors
    ///
    /// Returns the store's error.
    pub fn record(&self, matched: &AlertMatch) -> GeoResult<()> {
        self.violations.append(matched.violation.clone())?;
        tracing::info!(
            violation_id = %matched.violation.id,
            vehicle_id = %matched.violation.vehicle_id,
            geofence_id = %matched.violation.geofence_id,
            event_type = %matched.violation.event_type,
            rules = matched.rules.len(),
            "violation recorded"
        );
        Ok(())
    }

    /// Evaluates and, on a match, records the violation.
    ///
    /// # Errors
    ///
    /// See [`AlertMatcher::evaluate`] and [`AlertMatcher::record`].
    pub fn process(&self, event: &TransitionEvent) -> GeoResult<MatchResult> {
        let result = self.evaluate(event)?;
        if let MatchResult::Match(matched) = &result {
            self.record(matched)?;
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Utc;

    use crate::alerts::{AlertRule, EventTypeFilter, RuleStatus};
    use crate::geofence::{GeofenceCategory, GeofenceId, GeofenceRef};
    use crate::geometry::Coordinate;
    use crate::storage::{InMemoryStores, ViolationQuery};
    use crate::tracker::TransitionKind;
    use crate::vehicle::{Vehicle, VehicleId};

    struct Fixture {
        stores: InMemoryStores,
        matcher: AlertMatcher,
    }

    fn fixture() -> Fixture {
        let stores = InMemoryStores::new();
        let matcher = AlertMatcher::new(
            Arc::clone(&stores.alerts) as Arc<dyn AlertRuleStore>,
            Arc::clone(&stores.vehicles) as Arc<dyn VehicleStore>,
            Arc::clone(&stores.violations) as Arc<dyn ViolationStore>,
        );
        Fixture { stores, matcher }
    }

    fn event(vehicle: &VehicleId, geofence: &str, kind: TransitionKind) -> TransitionEvent {
        TransitionEvent {
            vehicle_id: vehicle.clone(),
            geofence: GeofenceRef {
                id: GeofenceId::from(geofence),
                name: "Zone A".to_string(),
                category: GeofenceCategory::RestrictedZone,
            },
            kind,
            location: Coordinate::new(5.0, 5.0),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn no_rule_means_no_match() {
        let f = fixture();
        let v = VehicleId::from("v");
        let result = f.matcher.process(&event(&v, "g", TransitionKind::Entry)).unwrap();
        assert_eq!(result, MatchResult::NoMatch);
        assert_eq!(f.stores.violations.query(&ViolationQuery::default()).unwrap().total_count, 0);
    }

    #[test]
    fn matching_rule_records_one_violation_and_enriches_notification() {
        let f = fixture();
        let vehicle = Vehicle::new("KA-01", "Asha", "van", "555").unwrap();
        let vid = vehicle.id.clone();
        f.stores.vehicles.insert(vehicle).unwrap();
        f.stores
            .alerts
            .insert(AlertRule::new(GeofenceId::from("g"), None, EventTypeFilter::Entry))
            .unwrap();

        let MatchResult::Match(m) = f.matcher.process(&event(&vid, "g", TransitionKind::Entry)).unwrap() else {
            panic!("expected a match");
        };
        assert_eq!(m.notification.vehicle.vehicle_number, "KA-01");
        assert_eq!(m.notification.vehicle.driver_name, "Asha");
        assert_eq!(m.notification.geofence.name, "Zone A");
        assert_eq!(m.violation.event_type, TransitionKind::Entry);

        let page = f.stores.violations.query(&ViolationQuery::default()).unwrap();
        assert_eq!(page.total_count, 1);
        assert_eq!(page.violations[0].id, m.violation.id);
    }

    #[test]
    fn several_matching_rules_still_produce_one_violation() {
        let f = fixture();
        let v = VehicleId::from("v");
        f.stores
            .alerts
            .insert(AlertRule::new(GeofenceId::from("g"), None, EventTypeFilter::Both))
            .unwrap();
        f.stores
            .alerts
            .insert(AlertRule::new(GeofenceId::from("g"), Some(v.clone()), EventTypeFilter::Exit))
            .unwrap();

        let MatchResult::Match(m) = f.matcher.process(&event(&v, "g", TransitionKind::Exit)).unwrap() else {
            panic!("expected a match");
        };
        assert_eq!(m.rules.len(), 2);
        assert_eq!(f.stores.violations.query(&ViolationQuery::default()).unwrap().total_count, 1);
    }

    #[test]
    fn inactive_and_mismatched_rules_are_ignored() {
        let f = fixture();
        let v = VehicleId::from("v");
        let rule = AlertRule::new(GeofenceId::from("g"), None, EventTypeFilter::Both);
        let rule_id = rule.id.clone();
        f.stores.alerts.insert(rule).unwrap();
        f.stores.alerts.set_status(&rule_id, RuleStatus::Inactive).unwrap();
        f.stores
            .alerts
            .insert(AlertRule::new(
                GeofenceId::from("g"),
                Some(VehicleId::from("someone-else")),
                EventTypeFilter::Both,
            ))
            .unwrap();
        f.stores
            .alerts
            .insert(AlertRule::new(GeofenceId::from("g"), None, EventTypeFilter::Exit))
            .unwrap();

        let result = f.matcher.evaluate(&event(&v, "g", TransitionKind::Entry)).unwrap();
        assert!(!result.is_match());
    }

    #[test]
    fn unregistered_vehicle_gets_blank_enrichment() {
        let f = fixture();
        let v = VehicleId::from("ghost");
        f.stores
            .alerts
            .insert(AlertRule::new(GeofenceId::from("g"), None, EventTypeFilter::Both))
            .unwrap();
        let MatchResult::Match(m) = f.matcher.evaluate(&event(&v, "g", TransitionKind::Entry)).unwrap() else {
            panic!("expected a match");
        };
        assert_eq!(m.notification.vehicle.vehicle_id, v);
        assert!(m.notification.vehicle.vehicle_number.is_empty());
    }
}
