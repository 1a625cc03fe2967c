//! Offline planning CLI: runs the engine against fixture adapters and the
//! bundled knowledge corpus.

use anyhow::{Context, Result};
use clap::Parser;
use svc_planner::planner::request::Request;
use svc_planner::{Config, PlanError, PlanOpts, PlanningEngine};

#[derive(Debug, Parser)]
#[command(name = "svc-planner", about = "Agentic travel-itinerary planner")]
struct Args {
    /// Path to a JSON trip request
    #[arg(long)]
    request: String,

    /// Fixed seed; defaults to a content hash of trace id and request
    #[arg(long)]
    seed: Option<u64>,

    /// Trace id; generated when omitted
    #[arg(long)]
    trace_id: Option<String>,

    /// Stream progress events to stderr while planning
    #[arg(long, default_value_t = false)]
    events: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::try_from_env().context("could not load configuration")?;
    svc_planner::init_logger(&config);

    let raw = std::fs::read_to_string(&args.request)
        .with_context(|| format!("could not read request file {}", args.request))?;
    let request: Request =
        serde_json::from_str(&raw).context("could not parse trip request")?;

    let engine = PlanningEngine::with_fixtures(config);
    let opts = PlanOpts {
        trace_id: args.trace_id,
        org_scope: "cli".to_string(),
        user_scope: "cli".to_string(),
        seed: args.seed,
    };

    let events = std::sync::Arc::new(svc_planner::events::EventLog::new());
    let cancel = tokio_util::sync::CancellationToken::new();

    let mut event_task = None;
    if args.events {
        let mut rx = events.subscribe();
        event_task = Some(tokio::spawn(async move {
            while let Ok(event) = rx.recv().await {
                if let Ok(line) = serde_json::to_string(&event) {
                    eprintln!("{}", line);
                }
            }
        }));
    }

    let run = engine.execute_run(request, opts, cancel, events).await;
    if let Some(task) = event_task {
        task.abort();
    }

    match run.outcome {
        Ok(itinerary) => {
            println!("{}", serde_json::to_string_pretty(&itinerary)?);
            Ok(())
        }
        Err(PlanError::Unrepairable { violations, plan }) => {
            // a structured diagnostic, clearly distinct from a crash
            let diagnostic = serde_json::json!({
                "status": "unrepairable",
                "violations": violations,
                "plan": plan,
                "repair_cycles_run": run.state.repair_cycles_run,
            });
            println!("{}", serde_json::to_string_pretty(&diagnostic)?);
            std::process::exit(2);
        }
        Err(e) => {
            eprintln!("planning failed: {}", e);
            std::process::exit(1);
        }
    }
}
