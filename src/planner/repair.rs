//! Repair: bounded deterministic plan surgery.
//!
//! At most two moves per cycle and three cycles; the full plan is
//! re-verified after every cycle. Repair never calls adapters and only
//! draws on the option pool already in state. Locked slots are never
//! touched.

use crate::adapters::features;
use crate::config::Config;
use crate::planner::choice::{Choice, ChoiceKind, Provenance, ProvenanceSource};
use crate::planner::plan::Plan;
use crate::planner::state::{PlanState, RepairAction, RepairMove};
use crate::planner::verify;
use crate::planner::violation::{repair_order, Violation, ViolationKind};
use chrono::Duration;
use std::collections::BTreeSet;

/// The result of running repair to completion
#[derive(Debug, Clone)]
pub struct RepairOutcome {
    pub plan: Plan,
    pub violations: Vec<Violation>,
    pub cycles_run: u32,
    pub moves_applied: u32,
    pub log: Vec<RepairAction>,
    pub reuse_ratio: Option<f64>,

    /// True when no blocking violations remain
    pub repaired: bool,
}

fn used_refs(plan: &Plan, kind: ChoiceKind) -> BTreeSet<String> {
    plan.iter_slots()
        .filter_map(|(_, _, s)| s.primary())
        .filter(|c| c.kind == kind)
        .filter_map(|c| c.option_ref.clone())
        .collect()
}

fn rebind(choice: &mut Choice, option_ref: String, name: String, base: Option<&Provenance>) {
    let provenance = match base {
        Some(p) => Provenance {
            source: ProvenanceSource::Tool,
            ref_id: option_ref.clone(),
            source_url: p.source_url.clone(),
            fetched_at: p.fetched_at,
            response_digest: p.response_digest.clone(),
            cache_hit: p.cache_hit,
        },
        None => Provenance::derived(&option_ref, choice.provenance.fetched_at),
    };

    choice.option_ref = Some(option_ref);
    choice.name = name;
    choice.provenance = provenance;
}

/// budget_exceeded: one-step tier downgrade of the single choice with the
/// largest savings
fn downgrade_tier(state: &mut PlanState, cycle: u32) -> Option<RepairAction> {
    let plan = state.plan.as_ref()?;
    let nights = state.request.window.night_count().max(1);
    let kid_required = state.request.prefs.kid_friendly;

    let flight_used = used_refs(plan, ChoiceKind::Flight);
    let lodging_used = used_refs(plan, ChoiceKind::Lodging);

    // (savings, node, new option id)
    let mut best: Option<(i64, usize, usize, String)> = None;

    for (di, si, slot) in plan.iter_slots() {
        if slot.locked {
            continue;
        }

        let Some(choice) = slot.primary() else {
            continue;
        };
        let Some(current_ref) = choice.option_ref.as_deref() else {
            continue;
        };
        let Some(lower) = choice.features.tier.and_then(|t| t.downgraded()) else {
            continue;
        };

        let candidate: Option<(i64, String)> = match choice.kind {
            ChoiceKind::Flight => {
                let current = state.flights_by_id.get(current_ref)?;
                state
                    .flights_by_id
                    .values()
                    .filter(|f| f.leg == current.leg && f.tier == lower)
                    .filter(|f| state.request.airports.iter().any(|a| a == f.airport()))
                    .filter(|f| !flight_used.contains(&f.id))
                    .min_by_key(|f| (f.price_cents, f.id.clone()))
                    .map(|f| (current.price_cents - f.price_cents, f.id.clone()))
            }
            ChoiceKind::Lodging => {
                let current = state.lodgings_by_id.get(current_ref)?;
                state
                    .lodgings_by_id
                    .values()
                    .filter(|l| l.tier == lower)
                    .filter(|l| !kid_required || !l.kid_friendly.is_no())
                    .filter(|l| !lodging_used.contains(&l.id))
                    .min_by_key(|l| (l.nightly_cents, l.id.clone()))
                    .map(|l| {
                        (
                            (current.nightly_cents - l.nightly_cents) * nights as i64,
                            l.id.clone(),
                        )
                    })
            }
            _ => None,
        };

        let Some((savings, new_ref)) = candidate else {
            continue;
        };
        if savings <= 0 {
            continue;
        }

        let better = match &best {
            None => true,
            Some((best_savings, ..)) => savings > *best_savings,
        };
        if better {
            best = Some((savings, di, si, new_ref));
        }
    }

    let (savings, di, si, new_ref) = best?;
    let node = Plan::node_ref(di, si);

    let plan = state.plan.as_mut()?;
    let choice = plan.days[di].slots[si].primary_mut()?;
    let old_name = choice.name.clone();

    let detail = match choice.kind {
        ChoiceKind::Flight => {
            let option = state.flights_by_id.get(&new_ref)?.clone();
            let name = format!("{} ({})", option.airline, match option.leg {
                crate::adapters::flights::FlightLeg::Arrival => "arrival",
                crate::adapters::flights::FlightLeg::Return => "return",
            });
            let mapped = features::flight_features(&option);
            rebind(choice, new_ref.clone(), name.clone(), state.tool_provenance.get("flights"));
            choice.features = mapped;
            format!("{} -> {} ({})", old_name, name, option.tier)
        }
        ChoiceKind::Lodging => {
            let option = state.lodgings_by_id.get(&new_ref)?.clone();
            let mapped = features::lodging_features(&option, nights as u32);
            rebind(
                choice,
                new_ref.clone(),
                option.name.clone(),
                state.tool_provenance.get("lodging"),
            );
            choice.features = mapped;
            format!("{} -> {} ({})", old_name, option.name, option.tier)
        }
        _ => return None,
    };

    planner_info!("(downgrade_tier) {} at {}: saves {}.", detail, node, savings);

    Some(RepairAction {
        cycle,
        move_kind: RepairMove::DowngradeTier,
        node_ref: node,
        detail,
        savings_cents: Some(savings),
    })
}

fn venue_open(state: &PlanState, choice: &Choice, window: &crate::calendar_utils::Timeslot) -> bool {
    let Some(option_ref) = choice.option_ref.as_deref() else {
        return true;
    };
    let Some(option) = state.attractions_by_id.get(option_ref) else {
        return true;
    };
    match option.calendar() {
        Some(calendar) => calendar.is_open_during(window),
        None => true,
    }
}

/// weather_unsuitable: swap the slot with the same band on a day whose
/// weather clears; fall back to an indoor replacement
fn reschedule_activity(
    state: &mut PlanState,
    di: usize,
    si: usize,
    cycle: u32,
    config: &Config,
) -> Option<RepairAction> {
    let plan = state.plan.as_ref()?;
    let slot = plan.slot_at(di, si)?;
    let band = slot.band?;
    let moving = slot.primary()?.clone();
    let city = state.request.city.clone();

    for dj in 0..plan.days.len() {
        if dj == di {
            continue;
        }

        // destination day must clear for the moving outdoor activity
        let Some(forecast) = state.weather_by_date.get(&plan.days[dj].date) else {
            continue;
        };
        if forecast.blocks_outdoor(&config.weather, &city) {
            continue;
        }

        let Some(sj) = plan.days[dj].slots.iter().position(|s| {
            !s.locked
                && s.band == Some(band)
                && s.kind() == Some(ChoiceKind::Attraction)
        }) else {
            continue;
        };

        let incoming = plan.days[dj].slots[sj].primary()?.clone();

        // the incoming activity lands on the bad-weather day: it must not
        // itself be outdoor
        if incoming.features.indoor.is_no() {
            continue;
        }

        // both venues must be open in their new windows
        let di_window = plan.days[di].slots[si].window;
        let dj_window = plan.days[dj].slots[sj].window;
        if !venue_open(state, &incoming, &di_window) || !venue_open(state, &moving, &dj_window) {
            continue;
        }

        let detail = format!(
            "{} moved to {}, {} moved to {}",
            moving.name, plan.days[dj].date, incoming.name, plan.days[di].date
        );

        let plan = state.plan.as_mut()?;
        let from_choices = plan.days[di].slots[si].choices.clone();
        let to_choices = plan.days[dj].slots[sj].choices.clone();
        plan.days[di].slots[si].choices = to_choices;
        plan.days[dj].slots[sj].choices = from_choices;

        planner_info!("(reschedule_activity) {}.", detail);
        return Some(RepairAction {
            cycle,
            move_kind: RepairMove::RescheduleActivity,
            node_ref: format!("{}<->{}", Plan::node_ref(di, si), Plan::node_ref(dj, sj)),
            detail,
            savings_cents: None,
        });
    }

    // no day clears: replace with something indoor
    replace_activity(state, di, si, true, cycle)
}

/// venue_closed / timing_infeasible: replace the activity from the resolved
/// pool, preferring the same theme
fn replace_activity(
    state: &mut PlanState,
    di: usize,
    si: usize,
    require_indoor: bool,
    cycle: u32,
) -> Option<RepairAction> {
    let plan = state.plan.as_ref()?;
    let slot = plan.slot_at(di, si)?;
    if slot.locked {
        return None;
    }

    let current = slot.primary()?.clone();
    if current.kind != ChoiceKind::Attraction {
        return None;
    }

    let window = slot.window;
    let used = used_refs(plan, ChoiceKind::Attraction);
    let current_cost = current.cost_cents();

    let candidate = state
        .attractions_by_id
        .values()
        .filter(|a| !used.contains(&a.id))
        .filter(|a| !require_indoor || a.indoor.is_yes())
        .filter(|a| match a.calendar() {
            Some(calendar) => calendar.is_open_during(&window),
            None => true,
        })
        .min_by_key(|a| {
            let same_theme = !a.themes.is_disjoint(&current.features.themes);
            (
                if same_theme { 0 } else { 1 },
                (a.admission_cents - current_cost).abs(),
                a.id.clone(),
            )
        })?
        .clone();

    let node = Plan::node_ref(di, si);
    let detail = format!("{} -> {}", current.name, candidate.name);

    let plan = state.plan.as_mut()?;
    let choice = plan.days[di].slots[si].primary_mut()?;
    let mapped = features::attraction_features(&candidate);
    rebind(
        choice,
        candidate.id.clone(),
        candidate.name.clone(),
        state.tool_provenance.get("attractions"),
    );
    choice.features = mapped;

    planner_info!("(replace_activity) {} at {}.", detail, node);
    Some(RepairAction {
        cycle,
        move_kind: RepairMove::ReplaceActivity,
        node_ref: node,
        detail,
        savings_cents: None,
    })
}

/// Fallback for timing violations: order the day's slots by start and pad
/// buffer gaps. Days holding a locked slot are left alone.
fn reorder_activities(state: &mut PlanState, di: usize, cycle: u32) -> Option<RepairAction> {
    let buffer = {
        let plan = state.plan.as_ref()?;
        Duration::minutes(plan.assumptions.transit_buffer_min)
    };

    let plan = state.plan.as_mut()?;
    let day = plan.days.get_mut(di)?;
    if day.slots.iter().any(|s| s.locked) {
        return None;
    }

    day.slots.sort_by_key(|s| s.window.time_start);
    for i in 1..day.slots.len() {
        let prev_end = day.slots[i - 1].window.time_end;
        let transit_pair = day.slots[i - 1].kind() == Some(ChoiceKind::Transit)
            || day.slots[i].kind() == Some(ChoiceKind::Transit);
        let earliest = if transit_pair {
            prev_end
        } else {
            prev_end + buffer
        };

        if day.slots[i].window.time_start < earliest {
            let duration = day.slots[i].window.duration();
            day.slots[i].window.time_start = earliest;
            day.slots[i].window.time_end = earliest + duration;
        }
    }

    planner_info!("(reorder_activities) day {} reordered.", di);
    Some(RepairAction {
        cycle,
        move_kind: RepairMove::ReorderActivities,
        node_ref: format!("d{}", di),
        detail: "slots sorted by start, gaps padded".to_string(),
        savings_cents: None,
    })
}

fn apply_move(
    state: &mut PlanState,
    violation: &Violation,
    cycle: u32,
    config: &Config,
) -> Option<RepairAction> {
    match violation.kind {
        ViolationKind::BudgetExceeded => downgrade_tier(state, cycle),
        ViolationKind::WeatherUnsuitable => {
            let (di, si) = violation.slot_indices()?;
            reschedule_activity(state, di, si, cycle, config)
        }
        ViolationKind::VenueClosed => {
            let (di, si) = violation.slot_indices()?;
            replace_activity(state, di, si, false, cycle)
        }
        ViolationKind::TimingInfeasible => match violation.slot_indices() {
            Some((di, si)) => replace_activity(state, di, si, false, cycle)
                .or_else(|| reorder_activities(state, di, cycle)),
            None => None,
        },
        // locked-slot constraints are never repaired by touching the lock
        ViolationKind::PrefViolated => {
            planner_warn!("(apply_move) locked-slot violation cannot be repaired.");
            None
        }
    }
}

pub fn run(state: &PlanState, config: &Config) -> Option<RepairOutcome> {
    let plan = state.plan.as_ref()?.clone();

    let mut working = state.clone();
    let mut violations = state.violations.clone();
    let mut log: Vec<RepairAction> = vec![];
    let mut cycles_run = 0u32;
    let mut moves_applied = 0u32;
    let mut reuse_ratio = None;

    // a clean plan passes through untouched
    if !violations.iter().any(|v| v.blocking) {
        return Some(RepairOutcome {
            plan,
            violations,
            cycles_run: 0,
            moves_applied: 0,
            log,
            reuse_ratio,
            repaired: true,
        });
    }

    for cycle in 1..=config.repair_max_cycles {
        let ordered: Vec<Violation> = repair_order(&violations)
            .into_iter()
            .cloned()
            .collect();
        if ordered.is_empty() {
            break;
        }

        let pre_cycle = working.plan.as_ref()?.clone();
        let mut moves_this_cycle = 0u32;

        for violation in ordered
            .iter()
            .take(config.repair_max_moves_per_cycle as usize)
        {
            let snapshot = working.plan.clone();
            let Some(action) = apply_move(&mut working, violation, cycle, config) else {
                continue;
            };

            // clamp repairs that would disturb too much of the plan
            let ratio = Plan::reuse_ratio(&pre_cycle, working.plan.as_ref()?);
            if ratio < config.repair_min_reuse_ratio {
                planner_warn!(
                    "(run) move reverted: reuse ratio {:.2} under {:.2}.",
                    ratio,
                    config.repair_min_reuse_ratio
                );
                working.plan = snapshot;
                break;
            }

            reuse_ratio = Some(ratio);
            moves_this_cycle += 1;
            moves_applied += 1;
            log.push(action);
        }

        cycles_run = cycle;
        planner_info!(
            "(run) repair cycle {} applied {} moves.",
            cycle,
            moves_this_cycle
        );

        violations = verify::run(&working, config);
        working.violations = violations.clone();

        if !violations.iter().any(|v| v.blocking) {
            break;
        }
    }

    let repaired = !violations.iter().any(|v| v.blocking);
    Some(RepairOutcome {
        plan: working.plan?,
        violations,
        cycles_run,
        moves_applied,
        log,
        reuse_ratio,
        repaired,
    })
}
