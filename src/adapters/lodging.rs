//! Lodging search adapter types

use crate::planner::choice::{Tier, TriState};
use crate::planner::request::Cents;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Canonicalized lodging search input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LodgingInput {
    pub city: String,
    pub check_in: NaiveDate,
    pub nights: u32,
}

/// One bookable stay returned by the adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LodgingOption {
    pub id: String,
    pub name: String,
    pub tier: Tier,
    pub nightly_cents: Cents,
    pub kid_friendly: TriState,
}

impl LodgingOption {
    pub fn total_cents(&self, nights: u32) -> Cents {
        self.nightly_cents * nights as Cents
    }
}
