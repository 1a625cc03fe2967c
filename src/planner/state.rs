//! The state value threaded through the pipeline.
//!
//! Each stage consumes the previous state and returns an enriched one; no
//! stage mutates a previous stage's output in place.

use crate::adapters::attractions::AttractionOption;
use crate::adapters::flights::FlightOption;
use crate::adapters::fx::FxRate;
use crate::adapters::lodging::LodgingOption;
use crate::adapters::transit::TransitOption;
use crate::adapters::weather::WeatherDay;
use crate::planner::itinerary::Itinerary;
use crate::planner::plan::Plan;
use crate::planner::request::Request;
use crate::planner::violation::Violation;
use crate::retrieval::hints::StructuredHints;
use crate::retrieval::Chunk;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// The ten pipeline stages, in execution order
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Intake,
    Retrieve,
    Generate,
    Select,
    Execute,
    Resolve,
    Verify,
    Repair,
    Synthesize,
    Respond,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Intake => "intake",
            Stage::Retrieve => "retrieve",
            Stage::Generate => "generate",
            Stage::Select => "select",
            Stage::Execute => "execute",
            Stage::Resolve => "resolve",
            Stage::Verify => "verify",
            Stage::Repair => "repair",
            Stage::Synthesize => "synthesize",
            Stage::Respond => "respond",
        }
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// Wall time spent in one stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTiming {
    pub stage: Stage,
    pub duration_ms: i64,
}

/// Per-candidate score with its components, kept for diagnostics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub candidate_id: String,
    pub total: f64,
    pub budget_fit: f64,
    pub distribution_fit: f64,
    pub schedule_fit: f64,
    pub preference_fit: f64,
    pub estimated_total_cents: i64,
}

/// How Select arrived at its pick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionOutcome {
    pub selected_id: String,
    pub scores: Vec<CandidateScore>,

    /// Present when the top score was shared and a tie-break applied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tie_break: Option<String>,
}

/// Kinds of deterministic repair moves
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairMove {
    DowngradeTier,
    RescheduleActivity,
    ReplaceActivity,
    ReorderActivities,
}

impl RepairMove {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepairMove::DowngradeTier => "downgrade_tier",
            RepairMove::RescheduleActivity => "reschedule_activity",
            RepairMove::ReplaceActivity => "replace_activity",
            RepairMove::ReorderActivities => "reorder_activities",
        }
    }
}

impl Display for RepairMove {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// One applied repair move, kept for decisions and diagnostics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairAction {
    pub cycle: u32,
    pub move_kind: RepairMove,
    pub node_ref: String,
    pub detail: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub savings_cents: Option<i64>,
}

/// Everything a run knows, enriched stage by stage
#[derive(Debug, Clone)]
pub struct PlanState {
    pub request: Request,
    pub trace_id: String,
    pub org_scope: String,
    pub user_scope: String,
    pub seed: u64,

    pub retrieved_chunks: Vec<Chunk>,
    pub structured_hints: StructuredHints,

    /// All generated candidates; discarded ones stay for diagnostics
    pub candidates: Vec<Plan>,
    pub selection: Option<SelectionOutcome>,

    /// The plan being worked: selected, then resolved, then repaired
    pub plan: Option<Plan>,

    /// Canonical bytes of each locked slot as Generate emitted it; locked
    /// slots must match these bytes all the way to Synthesize
    pub locked_snapshot: Vec<Vec<u8>>,

    pub weather_by_date: BTreeMap<NaiveDate, WeatherDay>,
    pub flights_by_id: BTreeMap<String, FlightOption>,
    pub lodgings_by_id: BTreeMap<String, LodgingOption>,
    pub attractions_by_id: BTreeMap<String, AttractionOption>,
    pub transit_by_id: BTreeMap<String, TransitOption>,
    pub fx: Option<FxRate>,

    /// Response-level provenance per tool, the basis for per-choice
    /// provenance after Resolve
    pub tool_provenance: BTreeMap<String, crate::planner::choice::Provenance>,

    pub violations: Vec<Violation>,
    pub repair_cycles_run: u32,
    pub repair_moves_applied: u32,
    pub repair_log: Vec<RepairAction>,
    pub reuse_ratio: Option<f64>,

    pub itinerary: Option<Itinerary>,

    pub stage_timings: Vec<StageTiming>,
    pub tool_calls: BTreeMap<String, u32>,
    pub done: bool,
}

impl PlanState {
    pub fn new(
        request: Request,
        trace_id: String,
        org_scope: String,
        user_scope: String,
        seed: u64,
    ) -> Self {
        PlanState {
            request,
            trace_id,
            org_scope,
            user_scope,
            seed,
            retrieved_chunks: vec![],
            structured_hints: StructuredHints::default(),
            candidates: vec![],
            selection: None,
            plan: None,
            locked_snapshot: vec![],
            weather_by_date: BTreeMap::new(),
            flights_by_id: BTreeMap::new(),
            lodgings_by_id: BTreeMap::new(),
            attractions_by_id: BTreeMap::new(),
            transit_by_id: BTreeMap::new(),
            fx: None,
            tool_provenance: BTreeMap::new(),
            violations: vec![],
            repair_cycles_run: 0,
            repair_moves_applied: 0,
            repair_log: vec![],
            reuse_ratio: None,
            itinerary: None,
            stage_timings: vec![],
            tool_calls: BTreeMap::new(),
            done: false,
        }
    }

    pub fn record_tool_call(&mut self, tool: &str) {
        *self.tool_calls.entry(tool.to_string()).or_insert(0) += 1;
    }

    pub fn blocking_violations(&self) -> Vec<&Violation> {
        self.violations.iter().filter(|v| v.blocking).collect()
    }
}
