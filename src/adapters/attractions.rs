//! Attraction catalog adapter types

use crate::calendar_utils::Calendar;
use crate::planner::choice::TriState;
use crate::planner::itinerary::GeoPosition;
use crate::planner::request::Cents;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;

/// Canonicalized attraction lookup input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttractionsInput {
    pub city: String,
    pub themes: BTreeSet<String>,

    /// Venue names surfaced by retrieval, looked up explicitly
    pub names: Vec<String>,
}

/// One venue returned by the adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttractionOption {
    pub id: String,
    pub name: String,
    pub category: String,
    pub indoor: TriState,
    pub kid_friendly: TriState,
    pub admission_cents: Cents,
    pub themes: BTreeSet<String>,
    pub geo: GeoPosition,

    /// Opening hours as a multiline RRULE calendar; None when unknown
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opening_hours: Option<String>,
}

impl AttractionOption {
    /// Parsed opening-hours calendar; None when hours are unknown or
    /// unparseable (both degrade to advisory verification)
    pub fn calendar(&self) -> Option<Calendar> {
        let hours = self.opening_hours.as_deref()?;
        match Calendar::from_str(hours) {
            Ok(calendar) => Some(calendar),
            Err(e) => {
                adapter_warn!(
                    "(calendar) invalid opening hours for {}: {}.",
                    self.name,
                    e
                );
                None
            }
        }
    }
}
