//! Verify: four independent verifiers over the resolved plan.
//!
//! Output order is fixed (budget, feasibility, weather, preferences) so the
//! violation list is reproducible. Verifier findings are violations, never
//! errors.

use crate::config::Config;
use crate::planner::choice::ChoiceKind;
use crate::planner::plan::Plan;
use crate::planner::state::PlanState;
use crate::planner::violation::{Violation, ViolationKind};
use chrono::Duration;
use serde_json::json;

/// Budget: resolved choice costs plus discretionary spend must stay within
/// the slippage band
fn verify_budget(plan: &Plan, state: &PlanState, config: &Config) -> Vec<Violation> {
    let total = plan.total_cost_cents();
    let budget = state.request.budget_cents;
    let cap = budget * (100 + config.budget_slippage_pct as i64) / 100;

    if total <= cap {
        return vec![];
    }

    let by_category = plan.category_totals();
    planner_warn!(
        "(verify_budget) total {} exceeds cap {} (budget {}).",
        total,
        cap,
        budget
    );

    vec![Violation::new(ViolationKind::BudgetExceeded, true, "plan")
        .with_detail("overage_cents", json!(total - budget))
        .with_detail("total_cents", json!(total))
        .with_detail("by_category", json!(by_category))]
}

/// Feasibility: resolution completeness, ordering, buffers, venue hours,
/// well-formed windows across DST
fn verify_feasibility(plan: &Plan, state: &PlanState, config: &Config) -> Vec<Violation> {
    let mut violations = vec![];

    for (di, si, slot) in plan.iter_slots() {
        let node = Plan::node_ref(di, si);

        // windows must have positive duration in every zone; a DST gap must
        // never produce a ghost window
        if slot.window.time_start >= slot.window.time_end {
            violations.push(
                Violation::new(ViolationKind::TimingInfeasible, true, &node)
                    .with_detail("kind", json!("ghost_window")),
            );
        }

        let Some(choice) = slot.primary() else {
            continue;
        };

        // unresolved non-meal choices surface here for Repair
        if !slot.locked && choice.kind != ChoiceKind::Meal && choice.option_ref.is_none() {
            violations.push(
                Violation::new(ViolationKind::TimingInfeasible, true, &node)
                    .with_detail("kind", json!("missing_option"))
                    .with_detail("choice_kind", json!(choice.kind.as_str())),
            );
        }
    }

    for (di, day) in plan.days.iter().enumerate() {
        for (si, pair) in day.slots.windows(2).enumerate() {
            let node = Plan::node_ref(di, si + 1);

            if pair[0].window.time_start >= pair[1].window.time_start
                || pair[0].window.overlaps(&pair[1].window)
            {
                violations.push(
                    Violation::new(ViolationKind::TimingInfeasible, true, &node)
                        .with_detail("kind", json!("overlap")),
                );
                continue;
            }

            // transit legs sit flush against the activity they serve
            if pair.iter().any(|s| s.kind() == Some(ChoiceKind::Transit)) {
                continue;
            }

            let gap = pair[1].window.time_start - pair[0].window.time_end;
            let flight_adjacent = pair.iter().any(|s| s.kind() == Some(ChoiceKind::Flight));
            let (required, kind_tag) = if flight_adjacent {
                (Duration::minutes(config.airport_buffer_min), "airport_buffer")
            } else {
                (Duration::minutes(config.transit_buffer_min), "slot_buffer")
            };

            if gap < required {
                violations.push(
                    Violation::new(ViolationKind::TimingInfeasible, true, &node)
                        .with_detail("kind", json!(kind_tag))
                        .with_detail("gap_s", json!(gap.num_seconds())),
                );
            }
        }
    }

    // venue hours must contain the slot window; unknown hours are advisory
    for (di, si, slot) in plan.iter_slots() {
        if slot.locked {
            continue;
        }

        let Some(choice) = slot.primary() else {
            continue;
        };
        if choice.kind != ChoiceKind::Attraction {
            continue;
        }

        let Some(option_ref) = choice.option_ref.as_deref() else {
            continue;
        };
        let Some(option) = state.attractions_by_id.get(option_ref) else {
            continue;
        };

        let node = Plan::node_ref(di, si);
        match option.calendar() {
            Some(calendar) => {
                if !calendar.is_open_during(&slot.window) {
                    violations.push(
                        Violation::new(ViolationKind::VenueClosed, true, &node)
                            .with_detail("venue", json!(option.name))
                            .with_detail("closed", json!(true)),
                    );
                }
            }
            None => {
                violations.push(
                    Violation::new(ViolationKind::VenueClosed, false, &node)
                        .with_detail("venue", json!(option.name))
                        .with_detail("closed", json!(null)),
                );
            }
        }
    }

    violations
}

/// Weather: outdoor slots block on a bad forecast; unknown indoor/outdoor
/// and missing forecasts stay advisory
fn verify_weather(plan: &Plan, state: &PlanState, config: &Config) -> Vec<Violation> {
    let mut violations = vec![];
    let city = &state.request.city;

    for (di, si, slot) in plan.iter_slots() {
        if slot.locked {
            continue;
        }

        let Some(choice) = slot.primary() else {
            continue;
        };
        if choice.kind != ChoiceKind::Attraction {
            continue;
        }

        let indoor = choice.features.indoor;
        if indoor.is_yes() {
            continue;
        }

        let date = plan.days[di].date;
        let node = Plan::node_ref(di, si);

        let Some(forecast) = state.weather_by_date.get(&date) else {
            // degraded weather data never fails a run
            violations.push(
                Violation::new(ViolationKind::WeatherUnsuitable, false, &node)
                    .with_detail("kind", json!("weather_unavailable"))
                    .with_detail("date", json!(date)),
            );
            continue;
        };

        if !forecast.blocks_outdoor(&config.weather, city) {
            continue;
        }

        // indoor unknown propagates to advisory, never blocking
        let blocking = indoor.is_no();
        violations.push(
            Violation::new(ViolationKind::WeatherUnsuitable, blocking, &node)
                .with_detail("date", json!(date))
                .with_detail("precip_prob", json!(forecast.precip_prob))
                .with_detail("venue", json!(choice.name)),
        );
    }

    violations
}

/// Preferences: locked slots must survive intact (blocking); kid-friendly
/// ratio and theme coverage are diagnostics
fn verify_preferences(plan: &Plan, state: &PlanState) -> Vec<Violation> {
    let mut violations = vec![];
    let prefs = &state.request.prefs;

    for lock in &prefs.locked_slots {
        let present = plan.iter_slots().any(|(_, _, slot)| {
            slot.locked
                && slot.window == lock.window
                && slot
                    .primary()
                    .map(|c| c.name == lock.name && c.kind == lock.kind)
                    .unwrap_or(false)
        });

        if !present {
            violations.push(
                Violation::new(ViolationKind::PrefViolated, true, "plan")
                    .with_detail("kind", json!("locked_slot_missing"))
                    .with_detail("name", json!(lock.name)),
            );
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
            let ratio = friendly as f64 / attractions.len() as f64;
            if ratio < 0.5 {
                violations.push(
                    Violation::new(ViolationKind::PrefViolated, false, "plan")
                        .with_detail("kind", json!("kid_friendly_ratio"))
                        .with_detail("ratio", json!(ratio)),
                );
            }
        }
    }

    for theme in &prefs.themes {
        let covered = plan.iter_slots().any(|(_, _, slot)| {
            slot.primary()
                .map(|c| c.features.themes.contains(theme))
                .unwrap_or(false)
        });

        if !covered {
            violations.push(
                Violation::new(ViolationKind::PrefViolated, false, "plan")
                    .with_detail("kind", json!("theme_uncovered"))
                    .with_detail("theme", json!(theme)),
            );
        }
    }

    violations
}

/// Run all four verifiers in their fixed order
pub fn run(state: &PlanState, config: &Config) -> Vec<Violation> {
    let Some(plan) = state.plan.as_ref() else {
        planner_error!("(run) verify reached without a plan.");
        return vec![];
    };

    let mut violations = verify_budget(plan, state, config);
    violations.extend(verify_feasibility(plan, state, config));
    violations.extend(verify_weather(plan, state, config));
    violations.extend(verify_preferences(plan, state));

    planner_info!(
        "(run) verify found {} violations ({} blocking).",
        violations.len(),
        violations.iter().filter(|v| v.blocking).count()
    );

    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{resolved_paris_state, fetched_at};

    #[tokio::test]
    async fn test_clean_plan_has_no_blocking_violations() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_clean_plan_has_no_blocking_violations) Start.");

        let state = resolved_paris_state(250_000, fetched_at()).await;
        let violations = run(&state, &crate::config::Config::new());
        assert!(
            violations.iter().all(|v| !v.blocking),
            "unexpected blocking violations: {:?}",
            violations
        );

        ut_info!("(test_clean_plan_has_no_blocking_violations) Success.");
    }

    #[tokio::test]
    async fn test_budget_exceeded_on_tight_budget() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_budget_exceeded_on_tight_budget) Start.");

        let state = resolved_paris_state(180_000, fetched_at()).await;
        let violations = run(&state, &crate::config::Config::new());

        let budget: Vec<_> = violations
            .iter()
            .filter(|v| v.kind == ViolationKind::BudgetExceeded)
            .collect();
        assert_eq!(budget.len(), 1);
        assert!(budget[0].blocking);
        assert!(budget[0].overage_cents() > 0);

        ut_info!("(test_budget_exceeded_on_tight_budget) Success.");
    }

    #[tokio::test]
    async fn test_budget_exactly_at_cap_passes() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_budget_exactly_at_cap_passes) Start.");

        let mut state = resolved_paris_state(250_000, fetched_at()).await;
        let total = state.plan.as_ref().unwrap().total_cost_cents();

        // shrink the budget so the plan lands exactly on it
        state.request.budget_cents = total;
        let violations = run(&state, &crate::config::Config::new());
        assert!(!violations
            .iter()
            .any(|v| v.kind == ViolationKind::BudgetExceeded));

        ut_info!("(test_budget_exactly_at_cap_passes) Success.");
    }

    #[tokio::test]
    async fn test_unresolved_choice_is_flagged() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_unresolved_choice_is_flagged) Start.");

        let mut state = resolved_paris_state(250_000, fetched_at()).await;
        if let Some(plan) = state.plan.as_mut() {
            // strip one flight binding
            'outer: for day in &mut plan.days {
                for slot in &mut day.slots {
                    if slot.kind() == Some(ChoiceKind::Flight) {
                        slot.choices[0].option_ref = None;
                        break 'outer;
                    }
                }
            }
        }

        let violations = run(&state, &crate::config::Config::new());
        assert!(violations.iter().any(|v| {
            v.kind == ViolationKind::TimingInfeasible
                && v.blocking
                && v.details.get("kind") == Some(&json!("missing_option"))
        }));

        ut_info!("(test_unresolved_choice_is_flagged) Success.");
    }

    #[tokio::test]
    async fn test_theme_coverage_diagnostic() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_theme_coverage_diagnostic) Start.");

        let mut state = resolved_paris_state(250_000, fetched_at()).await;
        state
            .request
            .prefs
            .themes
            .insert("wine tasting".to_string());

        let violations = run(&state, &crate::config::Config::new());
        let uncovered: Vec<_> = violations
            .iter()
            .filter(|v| v.details.get("kind") == Some(&json!("theme_uncovered")))
            .collect();
        assert_eq!(uncovered.len(), 1);
        assert!(!uncovered[0].blocking);

        ut_info!("(test_theme_coverage_diagnostic) Success.");
    }
}
