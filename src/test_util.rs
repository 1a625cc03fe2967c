//! Shared helpers for unit and integration tests: a one-time logger, fixed
//! clocks, canned requests, and states advanced to each pipeline stage.

use crate::adapters::AdapterSet;
use crate::calendar_utils::Timeslot;
use crate::clock::FixedClock;
use crate::config::Config;
use crate::planner::request::{Cents, Preferences, Request, TripWindow};
use crate::planner::state::PlanState;
use crate::planner::{execute, generate, intake, resolve, retrieve, select, verify};
use crate::retrieval::fixture::FixtureRetriever;
use crate::retrieval::hints::LineHintExtractor;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

static LOG_HANDLE: OnceCell<()> = OnceCell::const_new();

/// Initialize console logging once for the whole test binary
pub async fn get_log_handle() {
    LOG_HANDLE
        .get_or_init(|| async {
            use log4rs::append::console::ConsoleAppender;
            use log4rs::config::{Appender, Config as LogConfig, Root};

            let stdout = ConsoleAppender::builder().build();
            let config = LogConfig::builder()
                .appender(Appender::builder().build("stdout", Box::new(stdout)))
                .build(Root::builder().appender("stdout").build(log::LevelFilter::Warn));

            if let Ok(config) = config {
                let _ = log4rs::init_config(config);
            }
        })
        .await;
}

/// The instant every deterministic test pins its clock to
pub fn fetched_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 5, 20, 12, 0, 0).unwrap()
}

pub fn fixed_clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(fetched_at()))
}

/// The canonical five-day Paris request: 2025-06-01 through 2025-06-05
/// local, art and food themes, CDG and ORY
pub fn paris_request(budget_cents: Cents) -> Request {
    Request {
        city: "Paris".to_string(),
        window: TripWindow {
            start_utc: Utc.with_ymd_and_hms(2025, 6, 1, 6, 0, 0).unwrap(),
            end_utc: Utc.with_ymd_and_hms(2025, 6, 5, 21, 0, 0).unwrap(),
            tz: "Europe/Paris".parse().unwrap(),
        },
        budget_cents,
        airports: vec!["CDG".to_string(), "ORY".to_string()],
        prefs: Preferences {
            kid_friendly: false,
            themes: ["art", "food"].iter().map(|t| t.to_string()).collect(),
            avoid_overnight: false,
            locked_slots: vec![],
        },
    }
}

/// Same shape as the Paris request, any destination
pub fn request_for_city(city: &str, budget_cents: Cents) -> Request {
    let mut request = paris_request(budget_cents);
    request.city = city.to_string();
    request
}

/// Locked Louvre slot on 2025-06-02, 14:00 to 16:00 Paris time
pub fn louvre_lock() -> crate::planner::request::LockedSlot {
    crate::planner::request::LockedSlot {
        window: Timeslot::new(
            Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 6, 2, 14, 0, 0).unwrap(),
        ),
        kind: crate::planner::choice::ChoiceKind::Attraction,
        name: "Louvre".to_string(),
    }
}

/// Fixture adapter set on a fixed clock
pub fn fixture_adapters() -> AdapterSet {
    AdapterSet::with_fixtures(&Config::new(), fixed_clock())
}

/// State after Intake and Retrieve against the bundled corpus
pub async fn paris_state_with_hints(budget_cents: Cents) -> PlanState {
    state_with_hints(paris_request(budget_cents)).await
}

pub async fn state_with_hints(request: Request) -> PlanState {
    let mut state = intake::run(
        request,
        "trace-test".to_string(),
        "org-test".to_string(),
        "user-test".to_string(),
        None,
    )
    .expect("valid request");

    retrieve::run(
        &mut state,
        &FixtureRetriever,
        &LineHintExtractor,
        &Config::new(),
    )
    .await;
    state
}

/// State advanced through Resolve on fixture adapters
pub async fn resolved_paris_state(budget_cents: Cents, now: DateTime<Utc>) -> PlanState {
    resolved_state(paris_request(budget_cents), now).await
}

pub async fn resolved_state(request: Request, now: DateTime<Utc>) -> PlanState {
    let config = Config::new();
    let mut state = state_with_hints(request).await;

    generate::run(&mut state, &config, now);
    select::run(&mut state, &config).expect("selection");

    let adapters = fixture_adapters();
    let events = crate::events::EventLog::new();
    execute::run(&mut state, &adapters, &events, now, &CancellationToken::new())
        .await
        .expect("execute");

    resolve::run(&mut state);
    state
}

/// State with the Verify output already in `violations`
pub async fn verified_paris_state(budget_cents: Cents, now: DateTime<Utc>) -> PlanState {
    let mut state = resolved_paris_state(budget_cents, now).await;
    state.violations = verify::run(&state, &Config::new());
    state
}
