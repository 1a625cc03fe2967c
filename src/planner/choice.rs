//! The atomic planning unit: an abstract choice, its features, and the
//! provenance of every datum behind it

use crate::planner::request::Cents;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// What a choice books or schedules
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChoiceKind {
    Flight,
    Lodging,
    Attraction,
    Transit,
    Meal,
}

impl ChoiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChoiceKind::Flight => "flight",
            ChoiceKind::Lodging => "lodging",
            ChoiceKind::Attraction => "attraction",
            ChoiceKind::Transit => "transit",
            ChoiceKind::Meal => "meal",
        }
    }
}

impl Display for ChoiceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// Price/quality band of an option
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Budget,
    Mid,
    Luxury,
}

impl Tier {
    /// One-step tier downgrade (luxury -> mid -> budget)
    pub fn downgraded(&self) -> Option<Tier> {
        match self {
            Tier::Luxury => Some(Tier::Mid),
            Tier::Mid => Some(Tier::Budget),
            Tier::Budget => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Budget => "budget",
            Tier::Mid => "mid",
            Tier::Luxury => "luxury",
        }
    }
}

impl Display for Tier {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// Three-valued attribute distinguishing "no" from "not known".
/// `Unknown` propagates to advisory (non-blocking) verifier output.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriState {
    Yes,
    No,
    #[default]
    Unknown,
}

impl TriState {
    pub fn is_yes(&self) -> bool {
        matches!(self, TriState::Yes)
    }

    pub fn is_no(&self) -> bool {
        matches!(self, TriState::No)
    }

    pub fn from_opt(value: Option<bool>) -> Self {
        match value {
            Some(true) => TriState::Yes,
            Some(false) => TriState::No,
            None => TriState::Unknown,
        }
    }
}

/// Where a datum came from
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvenanceSource {
    Tool,
    Rag,
    Fixture,
    User,
    Derived,
    /// A knowledge-base hint bound to a live tool result
    #[serde(rename = "rag+tool")]
    RagTool,
}

/// Structured record of where a datum came from, sufficient to reproduce or
/// cite it. Every Choice carries one; a Choice without provenance is invalid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub source: ProvenanceSource,
    pub ref_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    pub fetched_at: DateTime<Utc>,
    pub response_digest: String,
    #[serde(default)]
    pub cache_hit: bool,
}

impl Provenance {
    /// Provenance for values computed by the engine itself
    pub fn derived(ref_id: &str, fetched_at: DateTime<Utc>) -> Self {
        Provenance {
            source: ProvenanceSource::Derived,
            ref_id: ref_id.to_string(),
            source_url: None,
            fetched_at,
            response_digest: String::new(),
            cache_hit: false,
        }
    }

    /// Provenance for user-pinned content (locked slots)
    pub fn user(ref_id: &str, fetched_at: DateTime<Utc>) -> Self {
        Provenance {
            source: ProvenanceSource::User,
            ref_id: ref_id.to_string(),
            source_url: None,
            fetched_at,
            response_digest: String::new(),
            cache_hit: false,
        }
    }
}

/// The feature view of a choice consumed by selection and verification.
/// Raw adapter fields never reach these paths; the feature mapper produces
/// this struct.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChoiceFeatures {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_cents: Option<Cents>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub travel_time_s: Option<i64>,

    #[serde(default)]
    pub indoor: TriState,

    #[serde(default)]
    pub kid_friendly: TriState,

    #[serde(default)]
    pub themes: BTreeSet<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,
}

/// The atomic unit of a plan. Abstract until Resolve binds `option_ref` to a
/// concrete tool result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub kind: ChoiceKind,
    pub name: String,
    pub features: ChoiceFeatures,

    /// Stable identifier of the concrete tool result; None pre-resolve
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub option_ref: Option<String>,

    /// Score assigned by Select
    #[serde(default)]
    pub score: f64,

    pub provenance: Provenance,
}

impl Choice {
    pub fn cost_cents(&self) -> Cents {
        self.features.cost_cents.unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_tier_downgrade_chain() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_tier_downgrade_chain) Start.");

        assert_eq!(Tier::Luxury.downgraded(), Some(Tier::Mid));
        assert_eq!(Tier::Mid.downgraded(), Some(Tier::Budget));
        assert_eq!(Tier::Budget.downgraded(), None);

        ut_info!("(test_tier_downgrade_chain) Success.");
    }

    #[tokio::test]
    async fn test_tri_state_roundtrip() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_tri_state_roundtrip) Start.");

        assert_eq!(TriState::from_opt(Some(true)), TriState::Yes);
        assert_eq!(TriState::from_opt(Some(false)), TriState::No);
        assert_eq!(TriState::from_opt(None), TriState::Unknown);
        assert!(TriState::Yes.is_yes());
        assert!(!TriState::Unknown.is_no());

        ut_info!("(test_tri_state_roundtrip) Success.");
    }

    #[tokio::test]
    async fn test_provenance_source_serde() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_provenance_source_serde) Start.");

        let merged = serde_json::to_string(&ProvenanceSource::RagTool).unwrap();
        assert_eq!(merged, "\"rag+tool\"");

        let provenance = Provenance {
            source: ProvenanceSource::Tool,
            ref_id: "flight:AF-CDG-1".to_string(),
            source_url: None,
            fetched_at: Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
            response_digest: "abc123".to_string(),
            cache_hit: true,
        };
        let json = serde_json::to_string(&provenance).unwrap();
        let back: Provenance = serde_json::from_str(&json).unwrap();
        assert_eq!(back, provenance);

        ut_info!("(test_provenance_source_serde) Success.");
    }
}
