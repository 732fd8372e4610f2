//! Alert rules, violations and the matcher that connects them to transitions.

/// Rule matching and enrichment.
pub mod matcher;
/// Rule definitions.
pub mod rule;
/// Violation records.
pub mod violation;

pub use matcher::{AlertMatch, AlertMatcher, MatchResult};
pub use rule::{AlertRule, AlertRuleId, EventTypeFilter, RuleStatus};
pub use violation::{Violation, ViolationId};
