//! The planning engine: a deterministic, checkpointed pipeline of ten
//! stages threading one `PlanState`.
//!
//! Stage order is total and visible through the event stream; the only
//! non-linear edge is the bounded self-loop inside Repair.

pub mod choice;
pub mod execute;
pub mod generate;
pub mod intake;
pub mod itinerary;
pub mod plan;
pub mod repair;
pub mod request;
pub mod resolve;
pub mod retrieve;
pub mod select;
pub mod state;
pub mod synthesize;
pub mod verify;
pub mod violation;

use crate::adapters::{AdapterError, AdapterSet};
use crate::clock::Clock;
use crate::config::Config;
use crate::events::{EventKind, EventLog};
use crate::persist::{Scopes, SessionHandle};
use crate::retrieval::hints::HintExtractor;
use crate::retrieval::KnowledgeRetriever;
use itinerary::Itinerary;
use plan::Plan;
use request::{Request, RequestError};
use serde_json::json;
use state::{PlanState, Stage, StageTiming};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use violation::Violation;

/// Run-fatal errors surfaced to the caller
#[derive(Debug, Clone)]
pub enum PlanError {
    /// Validation failed at intake; the run never started
    InvalidRequest(RequestError),

    /// Repair exhausted its budget; the final plan and remaining violations
    /// are returned as a structured diagnostic
    Unrepairable {
        violations: Vec<Violation>,
        plan: Box<Plan>,
    },

    /// Cooperative cancellation; partial results discarded
    Cancelled,

    /// Invariant violation or unexpected failure
    Internal(String),
}

impl Display for PlanError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            PlanError::InvalidRequest(e) => write!(f, "invalid_request: {}", e),
            PlanError::Unrepairable { violations, .. } => write!(
                f,
                "unrepairable: {} violations remain",
                violations.iter().filter(|v| v.blocking).count()
            ),
            PlanError::Cancelled => write!(f, "cancelled"),
            PlanError::Internal(msg) => write!(f, "internal: {}", msg),
        }
    }
}

impl PlanError {
    /// Terminal status string for persistence and events
    pub fn status(&self) -> &'static str {
        match self {
            PlanError::InvalidRequest(_) => "failed",
            PlanError::Unrepairable { .. } => "unrepairable",
            PlanError::Cancelled => "cancelled",
            PlanError::Internal(_) => "failed",
        }
    }
}

/// Caller-provided run identifiers
#[derive(Debug, Clone, Default)]
pub struct PlanOpts {
    pub trace_id: Option<String>,
    pub org_scope: String,
    pub user_scope: String,
    pub seed: Option<u64>,
}

/// Full result of a run: the outcome plus the final state for diagnostics
#[derive(Debug)]
pub struct PlanRun {
    pub state: PlanState,
    pub outcome: Result<Itinerary, PlanError>,
}

/// Invariants checked at every stage boundary. A failure here is an
/// `internal` error, never a violation.
fn check_invariants(state: &PlanState, stage: Stage, config: &Config) -> Result<(), String> {
    if state.request.budget_cents <= 0 {
        return Err(format!("{}: non-positive budget in state", stage));
    }

    if state.repair_cycles_run > config.repair_max_cycles {
        return Err(format!(
            "{}: repair ran {} cycles",
            stage, state.repair_cycles_run
        ));
    }

    for cycle in 1..=state.repair_cycles_run {
        let moves = state
            .repair_log
            .iter()
            .filter(|a| a.cycle == cycle)
            .count();
        if moves > config.repair_max_moves_per_cycle as usize {
            return Err(format!("{}: cycle {} applied {} moves", stage, cycle, moves));
        }
    }

    let Some(plan) = state.plan.as_ref() else {
        return Ok(());
    };

    plan.validate_day_ordering()
        .map_err(|e| format!("{}: {}", stage, e))?;

    for (di, si, slot) in plan.iter_slots() {
        for choice in &slot.choices {
            if let Some(cost) = choice.features.cost_cents {
                if cost < 0 {
                    return Err(format!(
                        "{}: negative cost at {}",
                        stage,
                        Plan::node_ref(di, si)
                    ));
                }
            }

            if choice.provenance.ref_id.is_empty() {
                return Err(format!(
                    "{}: missing provenance at {}",
                    stage,
                    Plan::node_ref(di, si)
                ));
            }
        }
    }

    // locked slots must stay byte-identical from selection onward
    if !state.locked_snapshot.is_empty() {
        let current: Vec<Vec<u8>> = plan
            .iter_slots()
            .filter(|(_, _, s)| s.locked)
            .map(|(_, _, s)| s.canonical_bytes())
            .collect();
        if current != state.locked_snapshot {
            return Err(format!("{}: locked slot mutated", stage));
        }
    }

    Ok(())
}

/// The engine. Configuration is read once at construction; collaborators
/// are trait objects so tests and deployments wire their own.
pub struct PlanningEngine {
    config: Config,
    adapters: AdapterSet,
    retriever: Arc<dyn KnowledgeRetriever>,
    extractor: Arc<dyn HintExtractor>,
    clock: Arc<dyn Clock>,
    session: Arc<dyn SessionHandle>,
}

impl PlanningEngine {
    pub fn new(
        config: Config,
        adapters: AdapterSet,
        retriever: Arc<dyn KnowledgeRetriever>,
        extractor: Arc<dyn HintExtractor>,
        clock: Arc<dyn Clock>,
        session: Arc<dyn SessionHandle>,
    ) -> Self {
        PlanningEngine {
            config,
            adapters,
            retriever,
            extractor,
            clock,
            session,
        }
    }

    /// Fixture-backed engine: bundled corpus, fixture adapters, in-memory
    /// persistence. Sufficient for offline planning and demos.
    pub fn with_fixtures(config: Config) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(crate::clock::SystemClock);
        let adapters = AdapterSet::with_fixtures(&config, clock.clone());
        PlanningEngine::new(
            config,
            adapters,
            Arc::new(crate::retrieval::fixture::FixtureRetriever),
            Arc::new(crate::retrieval::hints::LineHintExtractor),
            clock,
            Arc::new(crate::persist::MemorySession::new()),
        )
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session(&self) -> Arc<dyn SessionHandle> {
        self.session.clone()
    }

    /// Run the pipeline to completion. Synchronous in contract; typically
    /// spawned as a background task by `tasks::spawn_run`.
    pub async fn plan(&self, request: Request, opts: PlanOpts) -> Result<Itinerary, PlanError> {
        let events = Arc::new(EventLog::new());
        let cancel = CancellationToken::new();
        self.execute_run(request, opts, cancel, events).await.outcome
    }

    pub async fn execute_run(
        &self,
        request: Request,
        opts: PlanOpts,
        cancel: CancellationToken,
        events: Arc<EventLog>,
    ) -> PlanRun {
        let trace_id = opts
            .trace_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let mut state = match intake::run(
            request.clone(),
            trace_id.clone(),
            opts.org_scope.clone(),
            opts.user_scope.clone(),
            opts.seed,
        ) {
            Ok(state) => state,
            Err(e) => {
                events.append(
                    self.clock.now(),
                    EventKind::Error,
                    Stage::Intake.as_str(),
                    "invalid_request",
                    Some(json!({ "error": e.to_string() })),
                );
                // intake rejections never start a run; nothing to persist
                let mut rejected =
                    PlanState::new(request, trace_id, opts.org_scope, opts.user_scope, 0);
                rejected.done = true;
                return PlanRun {
                    state: rejected,
                    outcome: Err(PlanError::InvalidRequest(e)),
                };
            }
        };

        let scopes = Scopes {
            org_scope: state.org_scope.clone(),
            user_scope: state.user_scope.clone(),
        };

        let outcome = self.run_stages(&mut state, &cancel, &events).await;

        // Respond: persist, mark terminal, emit the final event
        let status = match &outcome {
            Ok(_) => "completed",
            Err(e) => e.status(),
        };

        if let Ok(itinerary) = &outcome {
            if let Err(e) = self
                .session
                .store_itinerary(&state.trace_id, &scopes, itinerary)
                .await
            {
                planner_error!("(execute_run) could not persist itinerary: {}.", e);
            }
        }

        if let Err(e) = self
            .session
            .mark_terminal(&state.trace_id, &scopes, status)
            .await
        {
            planner_error!("(execute_run) could not mark terminal: {}.", e);
        }

        let final_kind = match &outcome {
            Ok(_) => EventKind::Done,
            Err(PlanError::Unrepairable { .. }) => EventKind::Done,
            Err(_) => EventKind::Error,
        };
        events.append(
            self.clock.now(),
            final_kind,
            Stage::Respond.as_str(),
            status,
            None,
        );

        for event in events.events() {
            if let Err(e) = self
                .session
                .append_event(&state.trace_id, &scopes, &event)
                .await
            {
                planner_error!("(execute_run) could not persist event: {}.", e);
                break;
            }
        }

        state.done = true;
        PlanRun { state, outcome }
    }

    async fn run_stages(
        &self,
        state: &mut PlanState,
        cancel: &CancellationToken,
        events: &EventLog,
    ) -> Result<Itinerary, PlanError> {
        let config = &self.config;

        self.stage_started(events, Stage::Retrieve);
        self.guard(state, cancel, Stage::Retrieve, config)?;
        let started = self.clock.now();
        retrieve::run(state, self.retriever.as_ref(), self.extractor.as_ref(), config).await;
        self.stage_finished(state, events, Stage::Retrieve, started);

        self.stage_started(events, Stage::Generate);
        self.guard(state, cancel, Stage::Generate, config)?;
        let started = self.clock.now();
        generate::run(state, config, started);
        self.stage_finished(state, events, Stage::Generate, started);

        self.stage_started(events, Stage::Select);
        self.guard(state, cancel, Stage::Select, config)?;
        let started = self.clock.now();
        if let Err(e) = select::run(state, config) {
            planner_error!("(run_stages) selection failed: {}.", e);
            return Err(PlanError::Internal(e));
        }
        if let Some(plan) = state.plan.as_ref() {
            state.locked_snapshot = plan
                .iter_slots()
                .filter(|(_, _, s)| s.locked)
                .map(|(_, _, s)| s.canonical_bytes())
                .collect();
        }
        self.stage_finished(state, events, Stage::Select, started);

        self.stage_started(events, Stage::Execute);
        self.guard(state, cancel, Stage::Execute, config)?;
        let started = self.clock.now();
        execute::run(state, &self.adapters, events, started, cancel)
            .await
            .map_err(|e| match e {
                AdapterError::Cancelled => PlanError::Cancelled,
                other => PlanError::Internal(other.to_string()),
            })?;
        self.stage_finished(state, events, Stage::Execute, started);

        self.stage_started(events, Stage::Resolve);
        self.guard(state, cancel, Stage::Resolve, config)?;
        let started = self.clock.now();
        resolve::run(state);
        self.stage_finished(state, events, Stage::Resolve, started);

        self.stage_started(events, Stage::Verify);
        self.guard(state, cancel, Stage::Verify, config)?;
        let started = self.clock.now();
        state.violations = verify::run(state, config);
        self.stage_finished(state, events, Stage::Verify, started);

        self.stage_started(events, Stage::Repair);
        self.guard(state, cancel, Stage::Repair, config)?;
        let started = self.clock.now();
        let outcome = repair::run(state, config)
            .ok_or_else(|| PlanError::Internal("repair ran without a plan".to_string()))?;
        state.plan = Some(outcome.plan);
        state.violations = outcome.violations;
        state.repair_cycles_run = outcome.cycles_run;
        state.repair_moves_applied = outcome.moves_applied;
        state.repair_log = outcome.log;
        state.reuse_ratio = outcome.reuse_ratio;
        self.stage_finished(state, events, Stage::Repair, started);

        if !outcome.repaired {
            planner_warn!(
                "(run_stages) run is unrepairable after {} cycles.",
                state.repair_cycles_run
            );
            let plan = state
                .plan
                .clone()
                .ok_or_else(|| PlanError::Internal("no plan after repair".to_string()))?;
            return Err(PlanError::Unrepairable {
                violations: state.violations.clone(),
                plan: Box::new(plan),
            });
        }

        self.stage_started(events, Stage::Synthesize);
        self.guard(state, cancel, Stage::Synthesize, config)?;
        let started = self.clock.now();
        let itinerary = synthesize::run(state, self.clock.now())
            .ok_or_else(|| PlanError::Internal("synthesize without a plan".to_string()))?;
        state.itinerary = Some(itinerary.clone());
        self.stage_finished(state, events, Stage::Synthesize, started);

        Ok(itinerary)
    }

    /// Cancellation and invariants are checked between stages
    fn guard(
        &self,
        state: &PlanState,
        cancel: &CancellationToken,
        stage: Stage,
        config: &Config,
    ) -> Result<(), PlanError> {
        if cancel.is_cancelled() {
            planner_warn!("(guard) run cancelled before {}.", stage);
            return Err(PlanError::Cancelled);
        }

        check_invariants(state, stage, config).map_err(|e| {
            planner_error!("(guard) invariant violation: {}.", e);
            PlanError::Internal(e)
        })
    }

    fn stage_started(&self, events: &EventLog, stage: Stage) {
        events.append(
            self.clock.now(),
            EventKind::NodeEvent,
            stage.as_str(),
            "started",
            None,
        );
    }

    fn stage_finished(
        &self,
        state: &mut PlanState,
        events: &EventLog,
        stage: Stage,
        started: chrono::DateTime<chrono::Utc>,
    ) {
        let duration_ms = (self.clock.now() - started).num_milliseconds();
        state.stage_timings.push(StageTiming { stage, duration_ms });
        events.append(
            self.clock.now(),
            EventKind::NodeEvent,
            stage.as_str(),
            "finished",
            Some(json!({ "duration_ms": duration_ms })),
        );
    }
}
