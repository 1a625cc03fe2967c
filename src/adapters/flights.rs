//! Flight search adapter types

use crate::planner::choice::Tier;
use crate::planner::request::Cents;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Which way the traveler is moving relative to the destination
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlightLeg {
    /// Into the destination on the first trip day
    Arrival,
    /// Out of the destination on the last trip day
    Return,
}

/// Canonicalized flight search input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightsInput {
    pub city: String,
    pub airports: Vec<String>,
    pub arrive_date: NaiveDate,
    pub return_date: NaiveDate,
}

/// One bookable flight returned by the adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightOption {
    pub id: String,
    pub airline: String,
    pub origin: String,
    pub dest: String,
    pub leg: FlightLeg,
    pub date: NaiveDate,
    pub price_cents: Cents,
    pub duration_s: i64,
    pub tier: Tier,
}

impl FlightOption {
    /// The destination-side airport for either leg
    pub fn airport(&self) -> &str {
        match self.leg {
            FlightLeg::Arrival => &self.dest,
            FlightLeg::Return => &self.origin,
        }
    }
}
