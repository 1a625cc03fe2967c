//! Constraint violations emitted by Verify and consumed by Repair

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Classes of constraint violation
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    BudgetExceeded,
    TimingInfeasible,
    VenueClosed,
    WeatherUnsuitable,
    PrefViolated,
}

impl ViolationKind {
    /// Repair priority; lower repairs first
    pub fn priority(&self) -> u8 {
        match self {
            ViolationKind::BudgetExceeded => 0,
            ViolationKind::TimingInfeasible => 1,
            ViolationKind::VenueClosed => 2,
            ViolationKind::WeatherUnsuitable => 3,
            ViolationKind::PrefViolated => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::BudgetExceeded => "budget_exceeded",
            ViolationKind::TimingInfeasible => "timing_infeasible",
            ViolationKind::VenueClosed => "venue_closed",
            ViolationKind::WeatherUnsuitable => "weather_unsuitable",
            ViolationKind::PrefViolated => "pref_violated",
        }
    }
}

impl Display for ViolationKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// A single constraint violation. Blocking violations must be repaired or
/// the run terminates `unrepairable`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub blocking: bool,

    /// Opaque detail map; keys are verifier-specific
    #[serde(default)]
    pub details: BTreeMap<String, Value>,

    /// Stable reference to the offending node, e.g. "d1/s3"
    pub node_ref: String,
}

impl Violation {
    pub fn new(kind: ViolationKind, blocking: bool, node_ref: &str) -> Self {
        Violation {
            kind,
            blocking,
            details: BTreeMap::new(),
            node_ref: node_ref.to_string(),
        }
    }

    pub fn with_detail(mut self, key: &str, value: Value) -> Self {
        self.details.insert(key.to_string(), value);
        self
    }

    /// Overage in cents for budget violations; 0 otherwise
    pub fn overage_cents(&self) -> i64 {
        self.details
            .get("overage_cents")
            .and_then(Value::as_i64)
            .unwrap_or(0)
    }

    /// Day/slot indices parsed back out of the node reference
    pub fn slot_indices(&self) -> Option<(usize, usize)> {
        let (day, slot) = self.node_ref.split_once('/')?;
        let day = day.strip_prefix('d')?.parse().ok()?;
        let slot = slot.strip_prefix('s')?.parse().ok()?;
        Some((day, slot))
    }
}

/// Sort blocking violations into repair order: budget overages (largest
/// first), then timing by slot index, then closures, weather, preferences.
pub fn repair_order(violations: &[Violation]) -> Vec<&Violation> {
    let mut blocking: Vec<&Violation> = violations.iter().filter(|v| v.blocking).collect();
    blocking.sort_by(|a, b| {
        a.kind
            .priority()
            .cmp(&b.kind.priority())
            .then_with(|| match a.kind {
                ViolationKind::BudgetExceeded => b.overage_cents().cmp(&a.overage_cents()),
                _ => a
                    .slot_indices()
                    .unwrap_or((usize::MAX, usize::MAX))
                    .cmp(&b.slot_indices().unwrap_or((usize::MAX, usize::MAX))),
            })
    });

    blocking
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_repair_order() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_repair_order) Start.");

        let violations = vec![
            Violation::new(ViolationKind::WeatherUnsuitable, true, "d2/s1"),
            Violation::new(ViolationKind::BudgetExceeded, true, "plan")
                .with_detail("overage_cents", json!(5_000)),
            Violation::new(ViolationKind::TimingInfeasible, true, "d1/s3"),
            Violation::new(ViolationKind::TimingInfeasible, true, "d0/s2"),
            Violation::new(ViolationKind::PrefViolated, false, "d0/s0"),
        ];

        let ordered = repair_order(&violations);
        assert_eq!(ordered.len(), 4); // non-blocking filtered out
        assert_eq!(ordered[0].kind, ViolationKind::BudgetExceeded);
        assert_eq!(ordered[1].node_ref, "d0/s2");
        assert_eq!(ordered[2].node_ref, "d1/s3");
        assert_eq!(ordered[3].kind, ViolationKind::WeatherUnsuitable);

        ut_info!("(test_repair_order) Success.");
    }

    #[tokio::test]
    async fn test_slot_indices() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_slot_indices) Start.");

        let v = Violation::new(ViolationKind::VenueClosed, true, "d3/s4");
        assert_eq!(v.slot_indices(), Some((3, 4)));

        let plan_wide = Violation::new(ViolationKind::BudgetExceeded, true, "plan");
        assert_eq!(plan_wide.slot_indices(), None);

        ut_info!("(test_slot_indices) Success.");
    }
}
