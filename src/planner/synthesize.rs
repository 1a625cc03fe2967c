//! Synthesize: emit the final itinerary with cost breakdown, decisions, and
//! citations.
//!
//! No evidence, no claim: any activity attribute without provenance is
//! omitted rather than fabricated.

use crate::planner::choice::{ChoiceKind, ProvenanceSource};
use crate::planner::itinerary::{
    Activity, Citation, CostBreakdown, DayItinerary, Decision, Itinerary, ItineraryMetadata,
};
use crate::planner::plan::Plan;
use crate::planner::state::PlanState;
use chrono::{DateTime, Utc};

fn cents_to_display(cents: i64) -> String {
    format!("${}.{:02}", cents / 100, (cents % 100).abs())
}

fn build_days(state: &PlanState, plan: &Plan) -> Vec<DayItinerary> {
    plan.days
        .iter()
        .map(|day| {
            let activities = day
                .slots
                .iter()
                .filter_map(|slot| {
                    let choice = slot.primary()?;

                    // geo only when a resolved venue provides it
                    let geo = choice
                        .option_ref
                        .as_deref()
                        .and_then(|r| state.attractions_by_id.get(r))
                        .map(|a| a.geo);

                    // a forecast note only where a forecast exists
                    let notes = if choice.kind == ChoiceKind::Attraction
                        && !choice.features.indoor.is_yes()
                    {
                        state
                            .weather_by_date
                            .get(&day.date)
                            .map(|w| format!("Forecast: {}", w.summary))
                    } else {
                        None
                    };

                    Some(Activity {
                        window: slot.window,
                        kind: choice.kind,
                        name: choice.name.clone(),
                        geo,
                        notes,
                        cost_cents: choice.cost_cents(),
                    })
                })
                .collect();

            DayItinerary {
                date: day.date,
                activities,
            }
        })
        .collect()
}

fn build_cost_breakdown(state: &PlanState, plan: &Plan) -> CostBreakdown {
    let by_category = plan.category_totals();
    let days = plan.days.len() as i64;

    let currency_disclaimer = state.fx.as_ref().map(|fx| {
        format!(
            "Amounts converted at the {}->{} rate fetched {}.",
            fx.base, fx.quote, fx.as_of
        )
    });

    CostBreakdown {
        total_cents: plan.total_cost_cents(),
        daily_spend_cents: plan.assumptions.daily_spend_cents * days,
        by_category,
        currency: "USD".to_string(),
        currency_disclaimer,
    }
}

fn build_decisions(state: &PlanState) -> Vec<Decision> {
    let mut decisions = vec![];

    if let Some(selection) = &state.selection {
        let top = selection
            .scores
            .iter()
            .find(|s| s.candidate_id == selection.selected_id);
        let rationale = match top {
            Some(score) => format!(
                "score {:.1} (budget {:.2}, distribution {:.2}, schedule {:.2}, preference {:.2}){}",
                score.total,
                score.budget_fit,
                score.distribution_fit,
                score.schedule_fit,
                score.preference_fit,
                selection
                    .tie_break
                    .as_deref()
                    .map(|t| format!("; {}", t))
                    .unwrap_or_default()
            ),
            None => "highest scoring candidate".to_string(),
        };

        decisions.push(Decision {
            node_ref: "plan".to_string(),
            claim: format!("Selected the '{}' budget profile.", selection.selected_id),
            rationale,
        });
    }

    for action in &state.repair_log {
        let savings = action
            .savings_cents
            .map(|s| format!(", saving {}", cents_to_display(s)))
            .unwrap_or_default();
        decisions.push(Decision {
            node_ref: action.node_ref.clone(),
            claim: format!("Applied {} in repair cycle {}.", action.move_kind, action.cycle),
            rationale: format!("{}{}", action.detail, savings),
        });
    }

    if let Some(plan) = &state.plan {
        for (di, si, slot) in plan.iter_slots() {
            let Some(choice) = slot.primary() else {
                continue;
            };
            if choice.provenance.source != ProvenanceSource::RagTool {
                continue;
            }

            decisions.push(Decision {
                node_ref: Plan::node_ref(di, si),
                claim: format!("{} was drawn from destination knowledge.", choice.name),
                rationale: format!(
                    "knowledge-base mention matched to live result {}",
                    choice.provenance.ref_id
                ),
            });
        }
    }

    decisions
}

fn build_citations(state: &PlanState, plan: &Plan) -> Vec<Citation> {
    let mut citations = vec![];

    for (di, si, slot) in plan.iter_slots() {
        let Some(choice) = slot.primary() else {
            continue;
        };
        let node = Plan::node_ref(di, si);

        match choice.kind {
            ChoiceKind::Attraction => {
                let Some(option_ref) = choice.option_ref.as_deref() else {
                    continue;
                };
                let Some(option) = state.attractions_by_id.get(option_ref) else {
                    continue;
                };

                citations.push(Citation {
                    claim: format!("{} is a {}.", option.name, option.category),
                    node_ref: node.clone(),
                    provenance: choice.provenance.clone(),
                });

                if let Some(cost) = choice.features.cost_cents {
                    citations.push(Citation {
                        claim: format!(
                            "{} admission is {}.",
                            option.name,
                            cents_to_display(cost)
                        ),
                        node_ref: node.clone(),
                        provenance: choice.provenance.clone(),
                    });
                }

                if let Some(hours) = option.opening_hours.as_deref() {
                    citations.push(Citation {
                        claim: format!(
                            "{} opening hours follow \"{}\".",
                            option.name,
                            hours.replace('\n', " ")
                        ),
                        node_ref: node.clone(),
                        provenance: choice.provenance.clone(),
                    });
                }
            }
            ChoiceKind::Flight | ChoiceKind::Lodging => {
                if choice.option_ref.is_none() {
                    continue;
                }
                if let Some(cost) = choice.features.cost_cents {
                    citations.push(Citation {
                        claim: format!("{} costs {}.", choice.name, cents_to_display(cost)),
                        node_ref: node.clone(),
                        provenance: choice.provenance.clone(),
                    });
                }
            }
            ChoiceKind::Transit => {
                if choice.option_ref.is_none() {
                    continue;
                }
                if let Some(duration) = choice.features.travel_time_s {
                    citations.push(Citation {
                        claim: format!(
                            "{} takes about {} minutes.",
                            choice.name,
                            duration / 60
                        ),
                        node_ref: node.clone(),
                        provenance: choice.provenance.clone(),
                    });
                }
            }
            ChoiceKind::Meal => {}
        }
    }

    // one forecast citation per day that hosts an outdoor or unknown-cover
    // activity, backed by the weather tool response
    if let Some(weather_provenance) = state.tool_provenance.get("weather") {
        for (di, day) in plan.days.iter().enumerate() {
            let outdoor_present = day.slots.iter().any(|s| {
                s.primary()
                    .map(|c| c.kind == ChoiceKind::Attraction && !c.features.indoor.is_yes())
                    .unwrap_or(false)
            });
            if !outdoor_present {
                continue;
            }

            let Some(forecast) = state.weather_by_date.get(&day.date) else {
                continue;
            };

            citations.push(Citation {
                claim: format!(
                    "Forecast for {}: {}, {:.0}% precipitation.",
                    day.date,
                    forecast.summary,
                    forecast.precip_prob * 100.0
                ),
                node_ref: format!("d{}", di),
                provenance: weather_provenance.clone(),
            });
        }
    }

    citations
}

pub fn run(state: &PlanState, created_at: DateTime<Utc>) -> Option<Itinerary> {
    let plan = state.plan.as_ref()?;

    let itinerary = Itinerary {
        days: build_days(state, plan),
        cost_breakdown: build_cost_breakdown(state, plan),
        decisions: build_decisions(state),
        citations: build_citations(state, plan),
        metadata: ItineraryMetadata {
            trace_id: state.trace_id.clone(),
            created_at,
        },
    };

    planner_info!(
        "(run) synthesized itinerary: {} days, {} activities, {} citations.",
        itinerary.days.len(),
        itinerary.activity_count(),
        itinerary.citations.len()
    );

    Some(itinerary)
}
