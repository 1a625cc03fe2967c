//! Background run execution.
//!
//! A plan request is accepted immediately with a run id; the pipeline runs
//! in its own tokio task with a heartbeat emitter and a wall-clock watchdog
//! that cancels overlong runs. Completed runs stay queryable for a
//! keepalive window.

pub mod pool;

use crate::events::{EventKind, EventLog, ProgressEvent};
use crate::planner::itinerary::Itinerary;
use crate::planner::request::Request;
use crate::planner::{PlanError, PlanOpts, PlanningEngine};
use chrono::{Duration, Utc};
use lazy_static::lazy_static;
use pool::{RunPool, RunRecord};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// How long to keep a finished run queryable
const RUN_KEEPALIVE_DURATION_MINUTES: i64 = 60;

lazy_static! {
    static ref RUNS: RunPool = RunPool::new();
}

/// Run-level lifecycle: running, then exactly one terminal state
#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Unrepairable,
    Failed,
    Cancelled,
}

impl Display for RunStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let s = match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Unrepairable => "unrepairable",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// Errors that can occur when handling a run
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum TaskError {
    /// Run id was not found
    NotFound,

    /// Run already reached a terminal state
    AlreadyProcessed,

    /// Internal error with updating the run
    Internal,
}

impl Display for TaskError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            TaskError::NotFound => write!(f, "Run not found."),
            TaskError::AlreadyProcessed => write!(f, "Run already processed."),
            TaskError::Internal => write!(f, "Internal error."),
        }
    }
}

fn status_for(outcome: &Result<Itinerary, PlanError>) -> (RunStatus, Option<String>) {
    match outcome {
        Ok(_) => (RunStatus::Completed, None),
        Err(e @ PlanError::Unrepairable { .. }) => {
            (RunStatus::Unrepairable, Some(e.to_string()))
        }
        Err(PlanError::Cancelled) => (RunStatus::Cancelled, None),
        Err(e) => (RunStatus::Failed, Some(e.to_string())),
    }
}

/// Start a run in the background and return its id immediately
pub fn spawn_run(engine: Arc<PlanningEngine>, request: Request, opts: PlanOpts) -> String {
    let run_id = uuid::Uuid::new_v4().to_string();
    let cancel = CancellationToken::new();
    let events = Arc::new(EventLog::new());

    RUNS.insert(RunRecord {
        run_id: run_id.clone(),
        status: RunStatus::Running,
        status_rationale: None,
        created_at: Utc::now(),
        expires_at: Utc::now() + Duration::minutes(RUN_KEEPALIVE_DURATION_MINUTES),
        cancel: cancel.clone(),
        events: events.clone(),
        itinerary: None,
    });

    // heartbeat while the pipeline is between visible events
    let heartbeat_events = events.clone();
    let heartbeat_cancel = cancel.clone();
    let heartbeat_interval = engine.config().heartbeat_interval_ms;
    let heartbeat = tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval(std::time::Duration::from_millis(heartbeat_interval.max(100)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = heartbeat_cancel.cancelled() => break,
                _ = ticker.tick() => {
                    heartbeat_events.append(
                        Utc::now(),
                        EventKind::Heartbeat,
                        "run",
                        "alive",
                        None,
                    );
                }
            }
        }
    });

    // wall-clock watchdog: overlong runs are cancelled, not killed
    let watchdog_cancel = cancel.clone();
    let run_timeout = engine.config().run_timeout_ms;
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(run_timeout)).await;
        if !watchdog_cancel.is_cancelled() {
            tasks_warn!("(spawn_run) watchdog cancelling run after {} ms.", run_timeout);
            watchdog_cancel.cancel();
        }
    });

    let task_run_id = run_id.clone();
    tokio::spawn(async move {
        tasks_info!("(spawn_run) run {} started.", task_run_id);
        let run = engine
            .execute_run(request, opts, cancel.clone(), events.clone())
            .await;

        let (status, rationale) = status_for(&run.outcome);
        if let Ok(itinerary) = &run.outcome {
            RUNS.set_itinerary(&task_run_id, itinerary.clone());
        }

        RUNS.set_status(
            &task_run_id,
            status,
            rationale,
            Utc::now() + Duration::minutes(RUN_KEEPALIVE_DURATION_MINUTES),
        );

        cancel.cancel();
        heartbeat.abort();
        RUNS.expire(Utc::now());
        tasks_info!("(spawn_run) run {} finished: {}.", task_run_id, status);
    });

    run_id
}

/// Current status and rationale of a run
pub fn run_status(run_id: &str) -> Result<(RunStatus, Option<String>), TaskError> {
    let Some(record) = RUNS.get(run_id) else {
        return Err(TaskError::NotFound);
    };

    Ok((record.status, record.status_rationale))
}

/// The finished itinerary, when the run completed
pub fn run_itinerary(run_id: &str) -> Result<Option<Itinerary>, TaskError> {
    let Some(record) = RUNS.get(run_id) else {
        return Err(TaskError::NotFound);
    };

    Ok(record.itinerary)
}

/// All progress events so far; clients resume with `ts > last_seen`
pub fn run_events(run_id: &str) -> Result<Vec<ProgressEvent>, TaskError> {
    let Some(record) = RUNS.get(run_id) else {
        return Err(TaskError::NotFound);
    };

    Ok(record.events.events())
}

/// Live event subscription for a run
pub fn subscribe(
    run_id: &str,
) -> Result<tokio::sync::broadcast::Receiver<ProgressEvent>, TaskError> {
    let Some(record) = RUNS.get(run_id) else {
        return Err(TaskError::NotFound);
    };

    Ok(record.events.subscribe())
}

/// Cooperatively cancel a running run
pub fn cancel_run(run_id: &str) -> Result<(), TaskError> {
    let Some(record) = RUNS.get(run_id) else {
        tasks_error!("(cancel_run) run {} not found.", run_id);
        return Err(TaskError::NotFound);
    };

    // can't cancel something that already finished
    if record.status != RunStatus::Running {
        return Err(TaskError::AlreadyProcessed);
    }

    record.cancel.cancel();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::paris_request;

    fn fixture_engine() -> Arc<PlanningEngine> {
        let config = crate::config::Config::new();
        let clock = crate::test_util::fixed_clock();
        let adapters = crate::adapters::AdapterSet::with_fixtures(&config, clock.clone());
        Arc::new(PlanningEngine::new(
            config,
            adapters,
            Arc::new(crate::retrieval::fixture::FixtureRetriever),
            Arc::new(crate::retrieval::hints::LineHintExtractor),
            clock,
            Arc::new(crate::persist::MemorySession::new()),
        ))
    }

    async fn wait_terminal(run_id: &str) -> RunStatus {
        for _ in 0..200 {
            if let Ok((status, _)) = run_status(run_id) {
                if status != RunStatus::Running {
                    return status;
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        panic!("run did not finish");
    }

    #[tokio::test]
    async fn test_spawn_and_complete() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_spawn_and_complete) Start.");

        let engine = fixture_engine();
        let run_id = spawn_run(engine, paris_request(250_000), PlanOpts::default());

        let status = wait_terminal(&run_id).await;
        assert_eq!(status, RunStatus::Completed);
        assert!(run_itinerary(&run_id).unwrap().is_some());

        // stage events are present and ordered
        let events = run_events(&run_id).unwrap();
        assert!(!events.is_empty());
        for pair in events.windows(2) {
            assert!(pair[0].ts < pair[1].ts);
        }

        // a finished run can no longer be cancelled
        assert_eq!(cancel_run(&run_id).unwrap_err(), TaskError::AlreadyProcessed);

        ut_info!("(test_spawn_and_complete) Success.");
    }

    #[tokio::test]
    async fn test_unknown_run() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_unknown_run) Start.");

        assert_eq!(run_status("missing").unwrap_err(), TaskError::NotFound);
        assert_eq!(cancel_run("missing").unwrap_err(), TaskError::NotFound);

        ut_info!("(test_unknown_run) Success.");
    }

    #[tokio::test]
    async fn test_cancel_running() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_cancel_running) Start.");

        let engine = fixture_engine();
        let run_id = spawn_run(engine, paris_request(250_000), PlanOpts::default());

        // cancellation is cooperative; a best-effort cancel either lands
        // before a stage boundary or the run completes first
        let _ = cancel_run(&run_id);
        let status = wait_terminal(&run_id).await;
        assert!(matches!(
            status,
            RunStatus::Cancelled | RunStatus::Completed
        ));

        ut_info!("(test_cancel_running) Success.");
    }
}
