//! Final itinerary output: activities, cost breakdown, decisions, citations

use crate::calendar_utils::Timeslot;
use crate::planner::choice::{ChoiceKind, Provenance};
use crate::planner::request::Cents;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A point on the globe; latitude/longitude in degrees
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPosition {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPosition {
    pub fn to_point(self) -> geo::Point<f64> {
        geo::Point::new(self.lon, self.lat)
    }
}

/// One scheduled activity in the final itinerary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub window: Timeslot,
    pub kind: ChoiceKind,
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo: Option<GeoPosition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    pub cost_cents: Cents,
}

/// One day of the final itinerary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayItinerary {
    pub date: NaiveDate,
    pub activities: Vec<Activity>,
}

/// Cost totals per category plus the discretionary allowance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub by_category: BTreeMap<String, Cents>,
    pub daily_spend_cents: Cents,
    pub total_cents: Cents,
    pub currency: String,

    /// Present only when a non-USD price entered the breakdown; names the
    /// FX fetch time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency_disclaimer: Option<String>,
}

/// A non-obvious choice the engine made, with its rationale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub node_ref: String,
    pub claim: String,
    pub rationale: String,
}

/// A material claim in the itinerary and where it came from.
/// No evidence, no claim: an attribute without provenance is omitted from
/// the itinerary rather than cited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub claim: String,
    pub node_ref: String,
    pub provenance: Provenance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItineraryMetadata {
    pub trace_id: String,
    pub created_at: DateTime<Utc>,
}

/// The final product of a completed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Itinerary {
    pub days: Vec<DayItinerary>,
    pub cost_breakdown: CostBreakdown,
    pub decisions: Vec<Decision>,
    pub citations: Vec<Citation>,
    pub metadata: ItineraryMetadata,
}

impl Itinerary {
    pub fn activity_count(&self) -> usize {
        self.days.iter().map(|d| d.activities.len()).sum()
    }

    /// Activities of a given kind across all days
    pub fn activities_of_kind(&self, kind: ChoiceKind) -> Vec<&Activity> {
        self.days
            .iter()
            .flat_map(|d| d.activities.iter())
            .filter(|a| a.kind == kind)
            .collect()
    }
}
