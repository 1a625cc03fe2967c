//! Trip request model and validation

use crate::calendar_utils::Timeslot;
use crate::planner::choice::ChoiceKind;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Monetary amounts are integer cents throughout the engine
pub type Cents = i64;

/// Longest trip the engine will plan, in days
pub const MAX_TRIP_DAYS: usize = 7;

/// Reasons a request is rejected at intake
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RequestError {
    EmptyCity,
    InvalidWindow,
    WindowTooLong,
    NonPositiveBudget,
    NoAirports,
    InvalidAirport,
    DuplicateAirport,
    InvalidLockedSlot,
}

impl Display for RequestError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            RequestError::EmptyCity => write!(f, "City must not be empty"),
            RequestError::InvalidWindow => write!(f, "Window end must be after start"),
            RequestError::WindowTooLong => write!(f, "Window must cover 1 to 7 days"),
            RequestError::NonPositiveBudget => write!(f, "Budget must be positive"),
            RequestError::NoAirports => write!(f, "At least one airport is required"),
            RequestError::InvalidAirport => write!(f, "Airport codes must be IATA (3 letters)"),
            RequestError::DuplicateAirport => write!(f, "Airport codes must be unique"),
            RequestError::InvalidLockedSlot => write!(f, "Locked slot outside window or overlapping"),
        }
    }
}

/// The trip's absolute window plus the destination's IANA zone for all
/// wall-clock reasoning
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TripWindow {
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
    pub tz: Tz,
}

impl TripWindow {
    /// Local calendar dates covered by the window, in order
    pub fn dates(&self) -> Vec<NaiveDate> {
        let first = self.start_utc.with_timezone(&self.tz).date_naive();
        let last = self.end_utc.with_timezone(&self.tz).date_naive();

        let mut dates = vec![];
        let mut date = first;
        while date <= last && dates.len() <= MAX_TRIP_DAYS {
            dates.push(date);
            date += Duration::days(1);
        }

        dates
    }

    /// Number of trip days (local dates covered)
    pub fn day_count(&self) -> usize {
        self.dates().len()
    }

    /// Number of lodging nights
    pub fn night_count(&self) -> usize {
        self.day_count().saturating_sub(1)
    }

    pub fn timeslot(&self) -> Timeslot {
        Timeslot::new(self.start_utc, self.end_utc)
    }
}

/// A user-pinned slot that must appear in the itinerary byte-identically
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockedSlot {
    pub window: Timeslot,
    pub kind: ChoiceKind,
    pub name: String,
}

/// Trip preferences
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub kid_friendly: bool,

    #[serde(default)]
    pub themes: BTreeSet<String>,

    #[serde(default)]
    pub avoid_overnight: bool,

    #[serde(default)]
    pub locked_slots: Vec<LockedSlot>,
}

/// Immutable planning input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub city: String,
    pub window: TripWindow,
    pub budget_cents: Cents,
    pub airports: Vec<String>,
    #[serde(default)]
    pub prefs: Preferences,
}

impl Request {
    /// Validate the request against the intake constraints.
    /// Any failure rejects the run with `invalid_request`.
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.city.trim().is_empty() {
            planner_warn!("(validate) empty city.");
            return Err(RequestError::EmptyCity);
        }

        if self.window.end_utc <= self.window.start_utc {
            planner_warn!(
                "(validate) window end {} not after start {}.",
                self.window.end_utc,
                self.window.start_utc
            );
            return Err(RequestError::InvalidWindow);
        }

        let days = self.window.day_count();
        if days == 0 || days > MAX_TRIP_DAYS {
            planner_warn!("(validate) window covers {} days.", days);
            return Err(RequestError::WindowTooLong);
        }

        if self.budget_cents <= 0 {
            planner_warn!("(validate) non-positive budget: {}.", self.budget_cents);
            return Err(RequestError::NonPositiveBudget);
        }

        if self.airports.is_empty() {
            planner_warn!("(validate) no airports provided.");
            return Err(RequestError::NoAirports);
        }

        let mut seen = BTreeSet::new();
        for airport in &self.airports {
            if airport.len() != 3 || !airport.chars().all(|c| c.is_ascii_uppercase()) {
                planner_warn!("(validate) invalid airport code: {}.", airport);
                return Err(RequestError::InvalidAirport);
            }

            if !seen.insert(airport.clone()) {
                planner_warn!("(validate) duplicate airport code: {}.", airport);
                return Err(RequestError::DuplicateAirport);
            }
        }

        let trip = self.window.timeslot();
        for (i, lock) in self.prefs.locked_slots.iter().enumerate() {
            if lock.window.time_start >= lock.window.time_end || !trip.contains(&lock.window) {
                planner_warn!("(validate) locked slot {} outside window.", i);
                return Err(RequestError::InvalidLockedSlot);
            }

            for other in &self.prefs.locked_slots[i + 1..] {
                if lock.window.overlaps(&other.window) {
                    planner_warn!("(validate) locked slots overlap.");
                    return Err(RequestError::InvalidLockedSlot);
                }
            }
        }

        Ok(())
    }
}
