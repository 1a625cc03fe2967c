//! Select: score candidates and pick one.
//!
//! score = 40*budget_fit + 20*distribution_fit + 20*schedule_fit +
//! 20*preference_fit, on a 0-100 scale. Ties break by lowest estimated
//! total, then lexicographic candidate id.

use crate::config::Config;
use crate::planner::choice::ChoiceKind;
use crate::planner::generate::{allocations, BudgetProfile};
use crate::planner::plan::Plan;
use crate::planner::request::Cents;
use crate::planner::state::{CandidateScore, PlanState, SelectionOutcome};
use chrono::Duration;
use ordered_float::OrderedFloat;

/// 1 at a fully used budget, decaying linearly to 0 across the slippage
/// band, impossible beyond it
pub fn budget_fit(total: Cents, budget: Cents, slippage_pct: u32) -> f64 {
    if budget <= 0 {
        return f64::NEG_INFINITY;
    }

    let total_f = total as f64;
    let budget_f = budget as f64;
    let cap = budget_f * (1.0 + slippage_pct as f64 / 100.0);

    if total_f <= budget_f {
        1.0 - (1.0 - total_f / budget_f).abs()
    } else if total_f <= cap {
        1.0 - (total_f - budget_f) / (cap - budget_f)
    } else {
        f64::NEG_INFINITY
    }
}

fn range_credit(ratio: f64, low: f64, high: f64) -> f64 {
    if ratio >= low && ratio <= high {
        return 1.0;
    }

    let distance = if ratio < low { low - ratio } else { ratio - high };
    (1.0 - distance / 0.10).max(0.0)
}

/// Rewards flight spend in [0.25,0.35], lodging in [0.30,0.40], and
/// activities in [0.20,0.30] of the estimated total
pub fn distribution_fit(plan: &Plan) -> f64 {
    let total = plan.total_cost_cents();
    if total <= 0 {
        return 0.0;
    }

    let totals = plan.category_totals();
    let ratio = |kind: ChoiceKind| -> f64 {
        totals
            .get(kind.as_str())
            .copied()
            .unwrap_or(0) as f64
            / total as f64
    };

    let flights = range_credit(ratio(ChoiceKind::Flight), 0.25, 0.35);
    let lodging = range_credit(ratio(ChoiceKind::Lodging), 0.30, 0.40);
    let activity = range_credit(ratio(ChoiceKind::Attraction), 0.20, 0.30);

    (flights + lodging + activity) / 3.0
}

/// Rewards zero overlaps and adequate buffers between consecutive slots
pub fn schedule_fit(plan: &Plan, config: &Config) -> f64 {
    let mut fit: f64 = 1.0;

    for day in &plan.days {
        for pair in day.slots.windows(2) {
            if pair[0].window.overlaps(&pair[1].window)
                || pair[0].window.time_start >= pair[1].window.time_start
            {
                fit -= 0.5;
                continue;
            }

            // transit legs ride flush against their activity
            let transit_adjacent = pair.iter().any(|s| s.kind() == Some(ChoiceKind::Transit));
            if transit_adjacent {
                continue;
            }

            let gap = pair[1].window.time_start - pair[0].window.time_end;
            let flight_adjacent = pair.iter().any(|s| s.kind() == Some(ChoiceKind::Flight));
            let required = if flight_adjacent {
                Duration::minutes(config.airport_buffer_min)
            } else {
                Duration::minutes(config.transit_buffer_min)
            };

            if gap < required {
                fit -= 0.25;
            }
        }
    }

    fit.max(0.0)
}

/// Theme coverage (5 points per requested theme found) plus kid-friendly
/// ratio (10 points) when requested, normalized to 0-1 against the 20-point
/// weight
pub fn preference_fit(plan: &Plan, state: &PlanState) -> f64 {
    let prefs = &state.request.prefs;

    let mut points = 0.0;
    for theme in &prefs.themes {
        let covered = plan.iter_slots().any(|(_, _, slot)| {
            slot.primary()
                .map(|c| c.features.themes.contains(theme))
                .unwrap_or(false)
        });
        if covered {
            points += 5.0;
        }
    }

    if prefs.kid_friendly {
        let attractions: Vec<_> = plan
            .iter_slots()
            .filter_map(|(_, _, s)| s.primary())
            .filter(|c| c.kind == ChoiceKind::Attraction)
            .collect();
        if !attractions.is_empty() {
            let friendly = attractions
                .iter()
                .filter(|c| c.features.kid_friendly.is_yes())
                .count();
            points += friendly as f64 / attractions.len() as f64 * 10.0;
        }
    }

    points.min(20.0) / 20.0
}

pub fn score_candidate(plan: &Plan, state: &PlanState, config: &Config) -> CandidateScore {
    // budget fit judges the profile's planned spend; the per-slot cost
    // estimates are too sparse pre-resolve to stand in for a total
    let estimated_total = match BudgetProfile::from_slug(&plan.id) {
        Some(profile) => {
            allocations(state.request.budget_cents, profile, plan.days.len())
                .target_spend_cents
        }
        None => plan.total_cost_cents(),
    };
    let bf = budget_fit(
        estimated_total,
        state.request.budget_cents,
        config.budget_slippage_pct,
    );
    let df = distribution_fit(plan);
    let sf = schedule_fit(plan, config);
    let pf = preference_fit(plan, state);

    CandidateScore {
        candidate_id: plan.id.clone(),
        total: 40.0 * bf + 20.0 * df + 20.0 * sf + 20.0 * pf,
        budget_fit: bf,
        distribution_fit: df,
        schedule_fit: sf,
        preference_fit: pf,
        estimated_total_cents: estimated_total,
    }
}

pub fn run(state: &mut PlanState, config: &Config) -> Result<(), String> {
    if state.candidates.is_empty() {
        return Err("no viable candidates generated".to_string());
    }

    let mut scored: Vec<(CandidateScore, &Plan)> = state
        .candidates
        .iter()
        .map(|plan| (score_candidate(plan, state, config), plan))
        .collect();

    scored.sort_by(|(a, pa), (b, pb)| {
        OrderedFloat(b.total)
            .cmp(&OrderedFloat(a.total))
            .then_with(|| a.estimated_total_cents.cmp(&b.estimated_total_cents))
            .then_with(|| pa.id.cmp(&pb.id))
    });

    let tie_break = if scored.len() > 1 && scored[0].0.total == scored[1].0.total {
        Some(format!(
            "tie between {} and {}: lowest cost, then id",
            scored[0].0.candidate_id, scored[1].0.candidate_id
        ))
    } else {
        None
    };

    let selected_id = scored[0].0.candidate_id.clone();
    let selected_score = scored[0].0.total;
    let mut plan = scored[0].1.clone();
    let scores: Vec<CandidateScore> = scored.into_iter().map(|(s, _)| s).collect();

    // the chosen plan's choices carry the selection score
    for day in &mut plan.days {
        for slot in &mut day.slots {
            for choice in &mut slot.choices {
                choice.score = selected_score;
            }
        }
    }

    planner_info!(
        "(run) selected candidate {} with score {:.1}.",
        selected_id,
        selected_score
    );

    state.selection = Some(SelectionOutcome {
        selected_id,
        scores,
        tie_break,
    });
    state.plan = Some(plan);
    Ok(())
}
