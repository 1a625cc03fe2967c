//! Candidate plan structure: days of non-overlapping slots holding ranked
//! choices

use crate::calendar_utils::{TimeBand, Timeslot};
use crate::planner::choice::{Choice, ChoiceKind};
use crate::planner::request::Cents;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A time window holding ranked choices. The first choice is the planned
/// one; alternatives are kept up to the fan-out cap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub window: Timeslot,

    /// The band this slot was materialized from; None for injected or locked
    /// slots
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub band: Option<TimeBand>,

    pub choices: Vec<Choice>,

    #[serde(default)]
    pub locked: bool,
}

impl Slot {
    /// The planned choice for this slot
    pub fn primary(&self) -> Option<&Choice> {
        self.choices.first()
    }

    pub fn primary_mut(&mut self) -> Option<&mut Choice> {
        self.choices.first_mut()
    }

    pub fn kind(&self) -> Option<ChoiceKind> {
        self.primary().map(|c| c.kind)
    }

    /// Canonical serialized form, used for byte-identity comparisons
    /// (locked-slot preservation, reuse ratio)
    pub fn canonical_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }
}

/// One day of the plan; slots are sorted by start and pairwise
/// non-overlapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayPlan {
    pub date: NaiveDate,
    pub slots: Vec<Slot>,
}

/// Plan-wide assumptions carried into verification and synthesis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assumptions {
    pub daily_spend_cents: Cents,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fx_rate: Option<f64>,

    pub airport_buffer_min: i64,
    pub transit_buffer_min: i64,
}

/// A candidate (or selected) plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Candidate identifier; the budget profile slug
    pub id: String,
    pub days: Vec<DayPlan>,
    pub assumptions: Assumptions,
}

impl Plan {
    pub fn slot_count(&self) -> usize {
        self.days.iter().map(|d| d.slots.len()).sum()
    }

    /// Iterate (day index, slot index, slot)
    pub fn iter_slots(&self) -> impl Iterator<Item = (usize, usize, &Slot)> {
        self.days.iter().enumerate().flat_map(|(di, day)| {
            day.slots
                .iter()
                .enumerate()
                .map(move |(si, slot)| (di, si, slot))
        })
    }

    /// Stable reference to a slot, used in violations and citations
    pub fn node_ref(day_index: usize, slot_index: usize) -> String {
        format!("d{}/s{}", day_index, slot_index)
    }

    pub fn slot_at(&self, day_index: usize, slot_index: usize) -> Option<&Slot> {
        self.days.get(day_index)?.slots.get(slot_index)
    }

    /// Total planned cost: primary choice costs plus daily discretionary
    /// spend across the trip
    pub fn total_cost_cents(&self) -> Cents {
        let choices: Cents = self
            .iter_slots()
            .filter_map(|(_, _, slot)| slot.primary())
            .map(|c| c.cost_cents())
            .sum();

        choices + self.assumptions.daily_spend_cents * self.days.len() as Cents
    }

    /// Primary-choice cost per category
    pub fn category_totals(&self) -> BTreeMap<String, Cents> {
        let mut totals: BTreeMap<String, Cents> = BTreeMap::new();
        for (_, _, slot) in self.iter_slots() {
            let Some(choice) = slot.primary() else {
                continue;
            };

            *totals.entry(choice.kind.as_str().to_string()).or_insert(0) +=
                choice.cost_cents();
        }

        totals
    }

    /// Checks that within every day the slot windows are pairwise
    /// non-overlapping and strictly increasing in start
    pub fn validate_day_ordering(&self) -> Result<(), String> {
        for (di, day) in self.days.iter().enumerate() {
            for pair in day.slots.windows(2) {
                if pair[0].window.time_start >= pair[1].window.time_start {
                    return Err(format!(
                        "day {} slots not strictly increasing at {}",
                        di, pair[1].window.time_start
                    ));
                }

                if pair[0].window.overlaps(&pair[1].window) {
                    return Err(format!(
                        "day {} slots overlap at {}",
                        di, pair[1].window.time_start
                    ));
                }
            }
        }

        Ok(())
    }

    /// Fraction of slots byte-identical between two plans, measured against
    /// the larger slot count. Bounds how disruptive a repair cycle may be.
    pub fn reuse_ratio(before: &Plan, after: &Plan) -> f64 {
        let before_slots: Vec<Vec<u8>> = before
            .iter_slots()
            .map(|(_, _, s)| s.canonical_bytes())
            .collect();
        let after_slots: Vec<Vec<u8>> = after
            .iter_slots()
            .map(|(_, _, s)| s.canonical_bytes())
            .collect();

        let denominator = before_slots.len().max(after_slots.len());
        if denominator == 0 {
            return 1.0;
        }

        let mut remaining = before_slots;
        let mut identical = 0usize;
        for slot in &after_slots {
            if let Some(pos) = remaining.iter().position(|other| other == slot) {
                remaining.swap_remove(pos);
                identical += 1;
            }
        }

        identical as f64 / denominator as f64
    }
}
