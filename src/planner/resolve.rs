//! Resolve: bind each abstract choice in the selected plan to a concrete
//! tool result.
//!
//! Deterministic: the same plan and adapter responses always produce the
//! same resolution. A choice that no result satisfies keeps a null
//! `option_ref`; Verify raises it as a timing violation for Repair.

use crate::adapters::features;
use crate::adapters::flights::FlightLeg;
use crate::planner::choice::{Choice, ChoiceKind, Provenance, ProvenanceSource};
use crate::planner::request::Cents;
use crate::planner::state::PlanState;
use std::collections::BTreeSet;

/// Rewrite a choice with the matched option's identity and provenance.
/// A hint-grounded choice that now carries live data merges to "rag+tool".
fn bind(choice: &mut Choice, option_ref: String, name: String, tool_provenance: Option<&Provenance>) {
    let merged_source = if choice.provenance.source == ProvenanceSource::Rag {
        ProvenanceSource::RagTool
    } else {
        ProvenanceSource::Tool
    };

    let base = match tool_provenance {
        Some(p) => p.clone(),
        None => Provenance::derived(&option_ref, choice.provenance.fetched_at),
    };

    choice.option_ref = Some(option_ref.clone());
    choice.name = name;
    choice.provenance = Provenance {
        source: merged_source,
        ref_id: option_ref,
        source_url: base.source_url,
        fetched_at: base.fetched_at,
        response_digest: base.response_digest,
        cache_hit: base.cache_hit,
    };
}

fn resolve_flight(
    choice: &mut Choice,
    leg: FlightLeg,
    state: &PlanState,
    used: &mut BTreeSet<String>,
) -> bool {
    let target = choice.cost_cents();
    let tier = choice.features.tier;

    let best = state
        .flights_by_id
        .values()
        .filter(|f| f.leg == leg)
        .filter(|f| state.request.airports.iter().any(|a| a == f.airport()))
        .filter(|f| Some(f.tier) == tier)
        .filter(|f| !used.contains(&f.id))
        .min_by_key(|f| ((f.price_cents - target).abs(), f.id.clone()));

    let Some(option) = best else {
        planner_warn!("(resolve_flight) no {:?} flight matches tier {:?}.", leg, tier);
        return false;
    };

    used.insert(option.id.clone());
    let name = match leg {
        FlightLeg::Arrival => format!("{} (arrival)", option.airline),
        FlightLeg::Return => format!("{} (return)", option.airline),
    };
    let mapped = features::flight_features(option);
    bind(
        choice,
        option.id.clone(),
        name,
        state.tool_provenance.get("flights"),
    );
    choice.features = mapped;
    true
}

fn resolve_lodging(choice: &mut Choice, state: &PlanState, used: &mut BTreeSet<String>) -> bool {
    let nights = state.request.window.night_count().max(1) as Cents;
    let target_nightly = choice.cost_cents() / nights;
    let tier = choice.features.tier;
    let kid_required = state.request.prefs.kid_friendly;

    let best = state
        .lodgings_by_id
        .values()
        .filter(|l| Some(l.tier) == tier)
        .filter(|l| !kid_required || !l.kid_friendly.is_no())
        .filter(|l| !used.contains(&l.id))
        .min_by_key(|l| ((l.nightly_cents - target_nightly).abs(), l.id.clone()));

    let Some(option) = best else {
        planner_warn!("(resolve_lodging) no stay matches tier {:?}.", tier);
        return false;
    };

    used.insert(option.id.clone());
    let mapped = features::lodging_features(option, nights as u32);
    bind(
        choice,
        option.id.clone(),
        option.name.clone(),
        state.tool_provenance.get("lodging"),
    );
    choice.features = mapped;
    true
}

fn resolve_attraction(choice: &mut Choice, state: &PlanState, used: &mut BTreeSet<String>) -> bool {
    // a RAG-named venue binds by name first
    let by_name = state
        .attractions_by_id
        .values()
        .filter(|a| !used.contains(&a.id))
        .find(|a| a.name.eq_ignore_ascii_case(&choice.name));

    let est = choice.cost_cents();
    let option = match by_name {
        Some(option) => Some(option),
        None => state
            .attractions_by_id
            .values()
            .filter(|a| !used.contains(&a.id))
            .filter(|a| !a.themes.is_disjoint(&choice.features.themes))
            .min_by_key(|a| ((a.admission_cents - est).abs(), a.id.clone())),
    };

    let Some(option) = option else {
        planner_warn!("(resolve_attraction) no venue matches {}.", choice.name);
        return false;
    };

    used.insert(option.id.clone());
    let mapped = features::attraction_features(option);
    bind(
        choice,
        option.id.clone(),
        option.name.clone(),
        state.tool_provenance.get("attractions"),
    );
    choice.features = mapped;
    true
}

/// Transit legs carry their generated mode inside the ref id; once both
/// neighboring venues are resolved the mode is re-derived from real
/// coordinates
fn transit_mode_of(choice: &Choice) -> Option<String> {
    choice
        .provenance
        .ref_id
        .split(':')
        .nth(3)
        .map(str::to_string)
}

fn resolve_transit(choice: &mut Choice, state: &PlanState, mode_override: Option<String>) -> bool {
    let mode = match mode_override.or_else(|| transit_mode_of(choice)) {
        Some(mode) => mode,
        None => {
            planner_warn!("(resolve_transit) no mode on {}.", choice.provenance.ref_id);
            return false;
        }
    };

    let Some(option) = state
        .transit_by_id
        .values()
        .find(|t| t.mode.as_str() == mode)
    else {
        planner_warn!("(resolve_transit) no option for mode {}.", mode);
        return false;
    };

    // "metro to Sainte-Chapelle" reads better than the raw mode
    let destination = choice.name.split(" to ").nth(1).map(str::to_string);
    let name = match destination {
        Some(dest) => format!("{} to {}", option.route, dest),
        None => option.route.clone(),
    };

    let mapped = features::transit_features(option);
    bind(
        choice,
        option.id.clone(),
        name,
        state.tool_provenance.get("transit"),
    );
    // duration inherited from the adapter, cost from the unit fare
    choice.features = mapped;
    true
}

pub fn run(state: &mut PlanState) {
    let Some(mut plan) = state.plan.clone() else {
        planner_error!("(run) resolve reached without a selected plan.");
        return;
    };

    // the earlier flight slot is the arrival leg, the later the return
    let mut flight_order: Vec<(usize, usize)> = plan
        .iter_slots()
        .filter(|(_, _, s)| !s.locked && s.kind() == Some(ChoiceKind::Flight))
        .map(|(di, si, _)| (di, si))
        .collect();
    flight_order.sort_by_key(|(di, si)| {
        plan.days[*di].slots[*si].window.time_start
    });

    let mut flights_used: BTreeSet<String> = BTreeSet::new();
    let mut lodging_used: BTreeSet<String> = BTreeSet::new();
    let mut attractions_used: BTreeSet<String> = BTreeSet::new();
    let mut transit_slots: Vec<(usize, usize)> = vec![];
    let mut unresolved = 0usize;

    for di in 0..plan.days.len() {
        for si in 0..plan.days[di].slots.len() {
            let slot = &plan.days[di].slots[si];
            if slot.locked {
                continue;
            }

            let Some(kind) = slot.kind() else {
                continue;
            };

            let slot = &mut plan.days[di].slots[si];
            let Some(choice) = slot.primary_mut() else {
                continue;
            };

            let resolved = match kind {
                ChoiceKind::Meal => continue,
                ChoiceKind::Flight => {
                    let leg = if flight_order.first() == Some(&(di, si)) {
                        FlightLeg::Arrival
                    } else {
                        FlightLeg::Return
                    };
                    resolve_flight(choice, leg, state, &mut flights_used)
                }
                ChoiceKind::Lodging => resolve_lodging(choice, state, &mut lodging_used),
                ChoiceKind::Attraction => {
                    resolve_attraction(choice, state, &mut attractions_used)
                }
                ChoiceKind::Transit => {
                    // deferred: the mode re-derives from the venues around
                    // the leg, which resolve in this pass
                    transit_slots.push((di, si));
                    continue;
                }
            };

            if !resolved {
                unresolved += 1;
            }
        }
    }

    for (di, si) in transit_slots {
        let mode_override = derived_transit_mode(&plan, state, di, si);
        let Some(choice) = plan.days[di].slots[si].primary_mut() else {
            continue;
        };

        if !resolve_transit(choice, state, mode_override) {
            unresolved += 1;
        }
    }

    if unresolved > 0 {
        planner_warn!("(run) {} choices left unresolved.", unresolved);
    } else {
        planner_info!("(run) all choices resolved.");
    }

    state.plan = Some(plan);
}

/// Haversine distance between the resolved venues either side of a transit
/// leg, mapped back through the mode rule. None keeps the generated mode.
fn derived_transit_mode(
    plan: &crate::planner::plan::Plan,
    state: &PlanState,
    di: usize,
    si: usize,
) -> Option<String> {
    let day = plan.days.get(di)?;
    let window = day.slots.get(si)?.window;

    let geo_of = |slot: &crate::planner::plan::Slot| {
        let choice = slot.primary()?;
        if choice.kind != ChoiceKind::Attraction {
            return None;
        }
        let option = state.attractions_by_id.get(choice.option_ref.as_deref()?)?;
        Some(option.geo)
    };

    let from = day
        .slots
        .iter()
        .filter(|s| s.window.time_end <= window.time_start)
        .rev()
        .find_map(geo_of)?;
    let to = day
        .slots
        .iter()
        .filter(|s| s.window.time_start >= window.time_end)
        .find_map(geo_of)?;

    let distance_km = crate::adapters::transit::haversine_km(&from, &to);
    Some(
        crate::adapters::transit::mode_for_distance(distance_km)
            .as_str()
            .to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{resolved_paris_state, fetched_at};

    #[tokio::test]
    async fn test_all_non_meal_choices_resolve() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_all_non_meal_choices_resolve) Start.");

        let state = resolved_paris_state(250_000, fetched_at()).await;
        let plan = state.plan.as_ref().unwrap();

        for (_, _, slot) in plan.iter_slots() {
            let choice = slot.primary().unwrap();
            if choice.kind == ChoiceKind::Meal || slot.locked {
                continue;
            }
            assert!(
                choice.option_ref.is_some(),
                "unresolved {:?} {}",
                choice.kind,
                choice.name
            );
        }

        ut_info!("(test_all_non_meal_choices_resolve) Success.");
    }

    #[tokio::test]
    async fn test_rag_named_attraction_merges_provenance() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_rag_named_attraction_merges_provenance) Start.");

        let state = resolved_paris_state(250_000, fetched_at()).await;
        let plan = state.plan.as_ref().unwrap();

        let louvre = plan
            .iter_slots()
            .filter_map(|(_, _, s)| s.primary())
            .find(|c| c.name == "Louvre")
            .expect("Louvre resolved");
        assert_eq!(louvre.provenance.source, ProvenanceSource::RagTool);
        assert!(louvre.option_ref.as_deref().unwrap().starts_with("AT-"));
        // features rewritten from live data
        assert_eq!(louvre.features.cost_cents, Some(2_200));

        ut_info!("(test_rag_named_attraction_merges_provenance) Success.");
    }

    #[tokio::test]
    async fn test_flights_distinguish_legs_and_are_unique() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_flights_distinguish_legs_and_are_unique) Start.");

        let state = resolved_paris_state(250_000, fetched_at()).await;
        let plan = state.plan.as_ref().unwrap();

        let refs: Vec<String> = plan
            .iter_slots()
            .filter_map(|(_, _, s)| s.primary())
            .filter(|c| c.kind == ChoiceKind::Flight)
            .filter_map(|c| c.option_ref.clone())
            .collect();
        assert_eq!(refs.len(), 2);
        assert_ne!(refs[0], refs[1]);
        assert!(refs.iter().any(|r| r.contains("ARR")));
        assert!(refs.iter().any(|r| r.contains("RET")));

        ut_info!("(test_flights_distinguish_legs_and_are_unique) Success.");
    }

    #[tokio::test]
    async fn test_transit_inherits_adapter_duration() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_transit_inherits_adapter_duration) Start.");

        let state = resolved_paris_state(250_000, fetched_at()).await;
        let plan = state.plan.as_ref().unwrap();

        for (_, _, slot) in plan.iter_slots() {
            let Some(choice) = slot.primary() else { continue };
            if choice.kind != ChoiceKind::Transit {
                continue;
            }

            let option_ref = choice.option_ref.as_deref().expect("transit resolved");
            let option = state.transit_by_id.get(option_ref).unwrap();
            assert_eq!(choice.features.travel_time_s, Some(option.typical_duration_s));
        }

        ut_info!("(test_transit_inherits_adapter_duration) Success.");
    }
}
