//! Generate: produce candidate plans, one per budget profile.
//!
//! Activity slots are populated only from structured hints; when hints run
//! out, fewer slots are emitted rather than fabricated. Flight, lodging, and
//! transit slots hold abstract choices bound to concrete results in Resolve.

use crate::adapters::transit::{estimated_distance_km, leg_duration_s, mode_for_distance};
use crate::calendar_utils::{local_window, TimeBand, Timeslot};
use crate::config::Config;
use crate::planner::choice::{Choice, ChoiceFeatures, ChoiceKind, Provenance, Tier, TriState};
use crate::planner::plan::{Assumptions, DayPlan, Plan, Slot};
use crate::planner::request::{Cents, Request};
use crate::planner::state::PlanState;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Local wall-clock window blocked for the arrival flight and transfer
const FLIGHT_ARRIVAL_WALL: ((u32, u32), (u32, u32)) = ((7, 0), (10, 0));
/// Local wall-clock window blocked for the return flight and transfer
const FLIGHT_RETURN_WALL: ((u32, u32), (u32, u32)) = ((19, 30), (22, 30));
/// Local wall-clock window for lodging check-in on the first night
const LODGING_CHECKIN_WALL: ((u32, u32), (u32, u32)) = ((22, 0), (22, 30));

/// Fragments shorter than this are dropped when reshaping around a lock
const MIN_RESHAPED_SLOT_MINUTES: i64 = 30;

/// Budget-shaping templates, each producing one candidate
#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetProfile {
    CostConscious,
    Convenience,
    Experience,
    Relaxed,
}

impl BudgetProfile {
    pub const ALL: [BudgetProfile; 4] = [
        BudgetProfile::CostConscious,
        BudgetProfile::Convenience,
        BudgetProfile::Experience,
        BudgetProfile::Relaxed,
    ];

    pub fn slug(&self) -> &'static str {
        match self {
            BudgetProfile::CostConscious => "cost_conscious",
            BudgetProfile::Convenience => "convenience",
            BudgetProfile::Experience => "experience",
            BudgetProfile::Relaxed => "relaxed",
        }
    }

    /// The profile behind a candidate id
    pub fn from_slug(slug: &str) -> Option<BudgetProfile> {
        Self::ALL.into_iter().find(|p| p.slug() == slug)
    }

    /// Target-spend multiplier in permille of the budget. Experience aims
    /// for 1.2x but is capped at 1.1x of the actual budget.
    pub fn multiplier_permille(&self) -> i64 {
        match self {
            BudgetProfile::CostConscious => 700,
            BudgetProfile::Convenience => 1_000,
            BudgetProfile::Experience => 1_100,
            BudgetProfile::Relaxed => 900,
        }
    }

    /// Which profiles run for a given request
    pub fn included(&self, budget_cents: Cents, has_themes: bool) -> bool {
        match self {
            BudgetProfile::CostConscious => true,
            BudgetProfile::Convenience => budget_cents >= 100_000,
            BudgetProfile::Experience => budget_cents >= 200_000,
            BudgetProfile::Relaxed => budget_cents >= 200_000 && has_themes,
        }
    }

    /// The tier abstract flight/lodging choices target under this profile
    pub fn tier(&self) -> Tier {
        match self {
            BudgetProfile::CostConscious => Tier::Budget,
            BudgetProfile::Convenience | BudgetProfile::Relaxed => Tier::Mid,
            BudgetProfile::Experience => Tier::Luxury,
        }
    }
}

impl Display for BudgetProfile {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.slug())
    }
}

/// Deterministic budget split for one profile.
/// Shares sit inside their target ranges: flights 30%, lodging 35%,
/// discretionary 7.5%, activities the remainder of the target spend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Allocations {
    pub target_spend_cents: Cents,
    pub flights_cents: Cents,
    pub lodging_cents: Cents,
    pub discretionary_cents: Cents,
    pub activities_cents: Cents,
    pub daily_spend_cents: Cents,
}

pub fn allocations(budget_cents: Cents, profile: BudgetProfile, days: usize) -> Allocations {
    let target = budget_cents * profile.multiplier_permille() / 1_000;
    let flights = target * 300 / 1_000;
    let lodging = target * 350 / 1_000;
    let discretionary = target * 75 / 1_000;

    Allocations {
        target_spend_cents: target,
        flights_cents: flights,
        lodging_cents: lodging,
        discretionary_cents: discretionary,
        activities_cents: target - flights - lodging - discretionary,
        daily_spend_cents: discretionary / days.max(1) as Cents,
    }
}

fn derived(slug: &str, tag: &str, fetched_at: DateTime<Utc>) -> Provenance {
    Provenance::derived(&format!("gen:{}:{}", slug, tag), fetched_at)
}

fn flight_slot(
    date: NaiveDate,
    tz: Tz,
    arrival: bool,
    target_cents: Cents,
    tier: Tier,
    slug: &str,
    fetched_at: DateTime<Utc>,
) -> Slot {
    let (wall, tag, name) = if arrival {
        (FLIGHT_ARRIVAL_WALL, "flight-arrival", "Arrival flight")
    } else {
        (FLIGHT_RETURN_WALL, "flight-return", "Return flight")
    };

    Slot {
        window: local_window(date, tz, wall.0, wall.1),
        band: None,
        choices: vec![Choice {
            kind: ChoiceKind::Flight,
            name: name.to_string(),
            features: ChoiceFeatures {
                cost_cents: Some(target_cents),
                travel_time_s: Some(3 * 3_600),
                indoor: TriState::Unknown,
                kid_friendly: TriState::Unknown,
                themes: BTreeSet::new(),
                tier: Some(tier),
            },
            option_ref: None,
            score: 0.0,
            provenance: derived(slug, tag, fetched_at),
        }],
        locked: false,
    }
}

fn lodging_slot(
    date: NaiveDate,
    tz: Tz,
    total_cents: Cents,
    tier: Tier,
    nights: usize,
    slug: &str,
    fetched_at: DateTime<Utc>,
) -> Slot {
    Slot {
        window: local_window(date, tz, LODGING_CHECKIN_WALL.0, LODGING_CHECKIN_WALL.1),
        band: None,
        choices: vec![Choice {
            kind: ChoiceKind::Lodging,
            name: format!("Stay ({} nights)", nights),
            features: ChoiceFeatures {
                cost_cents: Some(total_cents),
                travel_time_s: None,
                indoor: TriState::Yes,
                kid_friendly: TriState::Unknown,
                themes: BTreeSet::new(),
                tier: Some(tier),
            },
            option_ref: None,
            score: 0.0,
            provenance: derived(slug, "lodging", fetched_at),
        }],
        locked: false,
    }
}

fn meal_slot(
    date: NaiveDate,
    tz: Tz,
    band: TimeBand,
    slug: &str,
    day_index: usize,
    fetched_at: DateTime<Utc>,
) -> Slot {
    let name = if band == TimeBand::Midday {
        "Lunch"
    } else {
        "Dinner"
    };

    Slot {
        window: band.window(date, tz),
        band: Some(band),
        choices: vec![Choice {
            kind: ChoiceKind::Meal,
            name: name.to_string(),
            // covered by the daily discretionary allowance
            features: ChoiceFeatures::default(),
            option_ref: None,
            score: 0.0,
            provenance: derived(
                slug,
                &format!("meal:d{}:{}", day_index, name.to_lowercase()),
                fetched_at,
            ),
        }],
        locked: false,
    }
}

/// Reshape a day's slots around a locked window. Non-locked overlapping
/// slots are trimmed and pulled back by the inter-slot buffer; fragments too
/// small to be useful are dropped. A flight overlap cannot be reshaped and
/// fails the candidate.
fn overlay_lock(slots: &mut Vec<Slot>, lock: &Slot, buffer_min: i64) -> Result<(), ()> {
    let buffer = Duration::minutes(buffer_min);
    let mut reshaped: Vec<Slot> = vec![];
    for slot in slots.drain(..) {
        if !slot.window.overlaps(&lock.window) {
            reshaped.push(slot);
            continue;
        }

        if slot.kind() == Some(ChoiceKind::Flight) {
            planner_warn!("(overlay_lock) lock overlaps a flight slot; candidate dropped.");
            return Err(());
        }

        for mut fragment in slot.window - lock.window {
            // keep the buffer clear on whichever side touches the lock
            if fragment.time_end == lock.window.time_start {
                fragment.time_end = fragment.time_end - buffer;
            }
            if fragment.time_start == lock.window.time_end {
                fragment.time_start = fragment.time_start + buffer;
            }

            if fragment.time_start < fragment.time_end
                && fragment.duration() >= Duration::minutes(MIN_RESHAPED_SLOT_MINUTES)
            {
                let mut piece = slot.clone();
                piece.window = fragment;
                reshaped.push(piece);
            }
        }
    }

    reshaped.push(lock.clone());
    reshaped.sort_by_key(|s| s.window.time_start);
    *slots = reshaped;
    Ok(())
}

/// Inject transit slots between consecutive attractions within a day.
/// The leg sits immediately before the later attraction; mode follows the
/// walking-time rule over the estimated distance.
fn inject_transit(
    slots: &mut Vec<Slot>,
    state: &PlanState,
    slug: &str,
    day_index: usize,
    fetched_at: DateTime<Utc>,
) {
    let attraction_indices: Vec<usize> = slots
        .iter()
        .enumerate()
        .filter(|(_, s)| s.kind() == Some(ChoiceKind::Attraction))
        .map(|(i, _)| i)
        .collect();

    let mut legs: Vec<Slot> = vec![];
    for pair in attraction_indices.windows(2) {
        let (from, to) = (&slots[pair[0]], &slots[pair[1]]);
        let (Some(from_choice), Some(to_choice)) = (from.primary(), to.primary()) else {
            continue;
        };
        if from_choice.name == to_choice.name {
            continue;
        }

        let distance_km = estimated_distance_km(&from_choice.name, &to_choice.name);
        let mode = mode_for_distance(distance_km);
        let duration = Duration::seconds(leg_duration_s(mode, distance_km));

        let window = Timeslot {
            time_start: to.window.time_start - duration,
            time_end: to.window.time_start,
        };
        // the leg must fit the gap without touching any scheduled slot
        if slots.iter().any(|s| s.window.overlaps(&window)) {
            continue;
        }

        let unit_cost = state
            .structured_hints
            .transit
            .iter()
            .find(|t| t.mode == mode.as_str())
            .and_then(|t| t.unit_cost_cents);

        legs.push(Slot {
            window,
            band: None,
            choices: vec![Choice {
                kind: ChoiceKind::Transit,
                name: format!("{} to {}", mode.as_str(), to_choice.name),
                features: ChoiceFeatures {
                    cost_cents: unit_cost,
                    travel_time_s: Some(duration.num_seconds()),
                    indoor: TriState::Unknown,
                    kid_friendly: TriState::Unknown,
                    themes: BTreeSet::new(),
                    tier: None,
                },
                option_ref: None,
                score: 0.0,
                provenance: derived(
                    slug,
                    &format!("transit:{}:d{}", mode.as_str(), day_index),
                    fetched_at,
                ),
            }],
            locked: false,
        });
    }

    slots.extend(legs);
    slots.sort_by_key(|s| s.window.time_start);
}

/// Build one candidate for a profile. Returns None when the profile cannot
/// honor the request (a lock that cannot be overlaid without overlap).
pub fn build_candidate(
    profile: BudgetProfile,
    state: &PlanState,
    config: &Config,
    fetched_at: DateTime<Utc>,
) -> Option<Plan> {
    let request: &Request = &state.request;
    let tz = request.window.tz;
    let dates = request.window.dates();
    let days = dates.len();
    let nights = request.window.night_count();
    let slug = profile.slug();
    let alloc = allocations(request.budget_cents, profile, days);

    let mut hint_index = 0usize;
    let hints = &state.structured_hints.attractions;

    // venues pinned by a lock are already scheduled; their hints are spent
    let locked_names: BTreeSet<String> = request
        .prefs
        .locked_slots
        .iter()
        .map(|l| l.name.to_lowercase())
        .collect();

    let mut day_plans: Vec<DayPlan> = vec![];
    for (di, date) in dates.iter().enumerate() {
        let is_first = di == 0;
        let is_last = di == days - 1;
        let mut slots: Vec<Slot> = vec![];

        if is_first {
            slots.push(flight_slot(
                *date,
                tz,
                true,
                alloc.flights_cents / 2,
                profile.tier(),
                slug,
                fetched_at,
            ));
        }

        for band in TimeBand::ALL {
            match band {
                TimeBand::Morning | TimeBand::Afternoon => {
                    if band == TimeBand::Morning && is_first {
                        continue;
                    }

                    // only from hints; short hints mean fewer slots
                    let hint = loop {
                        match hints.get(hint_index) {
                            None => break None,
                            Some(hint) => {
                                hint_index += 1;
                                if locked_names.contains(&hint.name.to_lowercase()) {
                                    continue;
                                }
                                break Some(hint);
                            }
                        }
                    };
                    let Some(hint) = hint else {
                        continue;
                    };

                    slots.push(Slot {
                        window: band.window(*date, tz),
                        band: Some(band),
                        choices: vec![Choice {
                            kind: ChoiceKind::Attraction,
                            name: hint.name.clone(),
                            features: ChoiceFeatures {
                                cost_cents: hint.est_cost_cents,
                                travel_time_s: None,
                                indoor: hint.indoor,
                                kid_friendly: TriState::Unknown,
                                themes: hint.themes.clone(),
                                tier: None,
                            },
                            option_ref: None,
                            score: 0.0,
                            provenance: Provenance {
                                source: crate::planner::choice::ProvenanceSource::Rag,
                                ref_id: format!(
                                    "chunk:{}",
                                    &hint.chunk_digest[..12.min(hint.chunk_digest.len())]
                                ),
                                source_url: None,
                                fetched_at,
                                response_digest: hint.chunk_digest.clone(),
                                cache_hit: false,
                            },
                        }],
                        locked: false,
                    });
                }
                TimeBand::Midday => {
                    slots.push(meal_slot(*date, tz, band, slug, di, fetched_at));
                }
                TimeBand::Evening => {
                    if is_last {
                        continue;
                    }
                    slots.push(meal_slot(*date, tz, band, slug, di, fetched_at));
                }
            }
        }

        if is_last {
            slots.push(flight_slot(
                *date,
                tz,
                false,
                alloc.flights_cents / 2,
                profile.tier(),
                slug,
                fetched_at,
            ));
        }

        if is_first && nights > 0 {
            slots.push(lodging_slot(
                *date,
                tz,
                alloc.lodging_cents,
                profile.tier(),
                nights,
                slug,
                fetched_at,
            ));
        }

        slots.sort_by_key(|s| s.window.time_start);
        day_plans.push(DayPlan { date: *date, slots });
    }

    // Overlay locked slots verbatim; surrounding slots reshape around them
    for lock in &request.prefs.locked_slots {
        let lock_date = lock.window.time_start.with_timezone(&tz).date_naive();
        let Some(day) = day_plans.iter_mut().find(|d| d.date == lock_date) else {
            planner_warn!("(build_candidate) lock date {} outside plan.", lock_date);
            return None;
        };

        let locked_slot = Slot {
            window: lock.window,
            band: None,
            choices: vec![Choice {
                kind: lock.kind,
                name: lock.name.clone(),
                features: ChoiceFeatures::default(),
                option_ref: None,
                score: 0.0,
                provenance: Provenance::user(&format!("locked:{}", lock.name), fetched_at),
            }],
            locked: true,
        };

        if overlay_lock(&mut day.slots, &locked_slot, config.transit_buffer_min).is_err() {
            return None;
        }
    }

    for (di, day) in day_plans.iter_mut().enumerate() {
        inject_transit(&mut day.slots, state, slug, di, fetched_at);

        // bounded fan-out within any slot
        for slot in &mut day.slots {
            slot.choices.truncate(config.fanout_cap as usize);
        }
    }

    let plan = Plan {
        id: slug.to_string(),
        days: day_plans,
        assumptions: Assumptions {
            daily_spend_cents: alloc.daily_spend_cents,
            fx_rate: None,
            airport_buffer_min: config.airport_buffer_min,
            transit_buffer_min: config.transit_buffer_min,
        },
    };

    if let Err(e) = plan.validate_day_ordering() {
        planner_warn!("(build_candidate) candidate {} dropped: {}.", slug, e);
        return None;
    }

    Some(plan)
}

pub fn run(state: &mut PlanState, config: &Config, fetched_at: DateTime<Utc>) {
    let budget = state.request.budget_cents;
    let has_themes = !state.request.prefs.themes.is_empty();

    let mut candidates: Vec<Plan> = vec![];
    for profile in BudgetProfile::ALL {
        if !profile.included(budget, has_themes) {
            continue;
        }

        if candidates.len() >= config.max_candidates as usize {
            break;
        }

        if let Some(plan) = build_candidate(profile, state, config, fetched_at) {
            candidates.push(plan);
        }
    }

    planner_info!("(run) generated {} candidates.", candidates.len());
    state.candidates = candidates;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::request::LockedSlot;
    use crate::test_util::{paris_state_with_hints, fetched_at};
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_profiles_included_by_budget() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_profiles_included_by_budget) Start.");

        // under $1,000: only cost-conscious
        assert!(BudgetProfile::CostConscious.included(80_000, true));
        assert!(!BudgetProfile::Convenience.included(80_000, true));

        // $1,000 to $2,000: plus convenience
        assert!(BudgetProfile::Convenience.included(180_000, true));
        assert!(!BudgetProfile::Experience.included(180_000, true));

        // $2,000 up: experience, and relaxed only with themes
        assert!(BudgetProfile::Experience.included(250_000, false));
        assert!(BudgetProfile::Relaxed.included(250_000, true));
        assert!(!BudgetProfile::Relaxed.included(250_000, false));

        ut_info!("(test_profiles_included_by_budget) Success.");
    }

    #[tokio::test]
    async fn test_allocations_within_ranges() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_allocations_within_ranges) Start.");

        let alloc = allocations(250_000, BudgetProfile::Convenience, 5);
        assert_eq!(alloc.target_spend_cents, 250_000);
        // flights 25-35%, lodging 30-40%, discretionary 5-10%
        assert_eq!(alloc.flights_cents, 75_000);
        assert_eq!(alloc.lodging_cents, 87_500);
        assert_eq!(alloc.discretionary_cents, 18_750);
        assert_eq!(
            alloc.activities_cents,
            250_000 - 75_000 - 87_500 - 18_750
        );
        assert_eq!(alloc.daily_spend_cents, 3_750);

        // experience is capped at 1.1x of the actual budget
        let exp = allocations(250_000, BudgetProfile::Experience, 5);
        assert_eq!(exp.target_spend_cents, 275_000);

        ut_info!("(test_allocations_within_ranges) Success.");
    }

    #[tokio::test]
    async fn test_candidate_structure() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_candidate_structure) Start.");

        let state = paris_state_with_hints(250_000).await;
        let config = crate::config::Config::new();
        let plan = build_candidate(BudgetProfile::Convenience, &state, &config, fetched_at())
            .expect("candidate");

        assert_eq!(plan.days.len(), 5);
        assert!(plan.validate_day_ordering().is_ok());

        // both flights, one lodging check-in, attractions only from hints
        let kinds: Vec<ChoiceKind> = plan
            .iter_slots()
            .filter_map(|(_, _, s)| s.kind())
            .collect();
        assert_eq!(
            kinds.iter().filter(|k| **k == ChoiceKind::Flight).count(),
            2
        );
        assert_eq!(
            kinds.iter().filter(|k| **k == ChoiceKind::Lodging).count(),
            1
        );
        let attraction_count = kinds
            .iter()
            .filter(|k| **k == ChoiceKind::Attraction)
            .count();
        assert_eq!(attraction_count, state.structured_hints.attractions.len());

        // transit injected between consecutive attractions
        assert!(kinds.iter().any(|k| *k == ChoiceKind::Transit));

        // every choice carries provenance
        for (_, _, slot) in plan.iter_slots() {
            for choice in &slot.choices {
                assert!(!choice.provenance.ref_id.is_empty());
            }
        }

        ut_info!("(test_candidate_structure) Success.");
    }

    #[tokio::test]
    async fn test_one_day_trip_has_both_flights_no_lodging() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_one_day_trip_has_both_flights_no_lodging) Start.");

        let mut state = paris_state_with_hints(250_000).await;
        state.request.window.end_utc =
            Utc.with_ymd_and_hms(2025, 6, 1, 21, 0, 0).unwrap();

        let config = crate::config::Config::new();
        let plan = build_candidate(BudgetProfile::Convenience, &state, &config, fetched_at())
            .expect("candidate");

        assert_eq!(plan.days.len(), 1);
        let kinds: Vec<ChoiceKind> = plan
            .iter_slots()
            .filter_map(|(_, _, s)| s.kind())
            .collect();
        assert_eq!(
            kinds.iter().filter(|k| **k == ChoiceKind::Flight).count(),
            2
        );
        assert!(!kinds.iter().any(|k| *k == ChoiceKind::Lodging));

        ut_info!("(test_one_day_trip_has_both_flights_no_lodging) Success.");
    }

    #[tokio::test]
    async fn test_seven_day_window_yields_seven_days() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_seven_day_window_yields_seven_days) Start.");

        let mut state = paris_state_with_hints(250_000).await;
        state.request.window.end_utc =
            Utc.with_ymd_and_hms(2025, 6, 7, 21, 0, 0).unwrap();
        assert_eq!(state.request.window.day_count(), 7);

        let config = crate::config::Config::new();
        let plan = build_candidate(BudgetProfile::Convenience, &state, &config, fetched_at())
            .expect("candidate");
        assert_eq!(plan.days.len(), 7);
        assert!(plan.validate_day_ordering().is_ok());

        ut_info!("(test_seven_day_window_yields_seven_days) Success.");
    }

    #[tokio::test]
    async fn test_empty_hints_mean_fewer_slots() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_empty_hints_mean_fewer_slots) Start.");

        let mut state = paris_state_with_hints(250_000).await;
        state.structured_hints = Default::default();

        let config = crate::config::Config::new();
        let plan = build_candidate(BudgetProfile::Convenience, &state, &config, fetched_at())
            .expect("candidate");

        let has_attraction = plan
            .iter_slots()
            .any(|(_, _, s)| s.kind() == Some(ChoiceKind::Attraction));
        assert!(!has_attraction);

        ut_info!("(test_empty_hints_mean_fewer_slots) Success.");
    }

    #[tokio::test]
    async fn test_lock_overlay_is_verbatim() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_lock_overlay_is_verbatim) Start.");

        let mut state = paris_state_with_hints(250_000).await;
        let lock_window = Timeslot {
            time_start: Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap(),
            time_end: Utc.with_ymd_and_hms(2025, 6, 2, 14, 0, 0).unwrap(),
        };
        state.request.prefs.locked_slots.push(LockedSlot {
            window: lock_window,
            kind: ChoiceKind::Attraction,
            name: "Louvre".to_string(),
        });

        let config = crate::config::Config::new();
        let plan = build_candidate(BudgetProfile::Convenience, &state, &config, fetched_at())
            .expect("candidate");

        let locked: Vec<&Slot> = plan
            .iter_slots()
            .filter(|(_, _, s)| s.locked)
            .map(|(_, _, s)| s)
            .collect();
        assert_eq!(locked.len(), 1);
        assert_eq!(locked[0].window, lock_window);
        assert_eq!(locked[0].primary().unwrap().name, "Louvre");
        assert!(plan.validate_day_ordering().is_ok());

        ut_info!("(test_lock_overlay_is_verbatim) Success.");
    }
}
