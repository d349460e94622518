mod runner;
mod scenarios;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use agtrace_core::config::{ExporterKind, Settings};
use agtrace_core::telemetry::{LogBridgeHook, global_registry};
use agtrace_core::{get_tracer, init_tracing, shutdown_tracing};
use anyhow::Context;
use clap::Parser;
use tracing::warn;

use crate::scenarios::ScenarioCtx;

const SERVICE_NAME: &str = "agtrace";
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(author, version, about = "Run traced LLM agent scenarios", long_about = None)]
struct Cli {
    /// Scenario ids or id prefixes (all scenarios when omitted)
    scenarios: Vec<String>,
    /// List scenarios and exit
    #[arg(long)]
    list: bool,
    /// Settings file (JSON or TOML)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Per-scenario timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,
    /// Run the fixed variant of every scenario
    #[arg(long)]
    no_bugs: bool,
    /// Span exporter: console, otlp-http or none
    #[arg(long, value_name = "KIND")]
    exporter: Option<ExporterKind>,
    /// OTLP collector base URL
    #[arg(long, value_name = "URL")]
    endpoint: Option<String>,
    /// Skip resolving the model endpoint and credential
    #[arg(long)]
    offline: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let catalog = scenarios::catalog();

    if cli.list {
        for s in &catalog {
            println!("{:<36} {}", s.id(), s.about());
        }
        return Ok(ExitCode::SUCCESS);
    }

    let mut settings = match &cli.config {
        Some(path) => Settings::from_path(path).with_context(|| format!("loading {}", path.display()))?,
        None => Settings::default(),
    };
    settings.tracing = settings.tracing.overlay_env()?;
    if let Some(kind) = cli.exporter {
        settings.tracing.exporter = kind;
    }
    if let Some(endpoint) = cli.endpoint {
        settings.tracing.endpoint = Some(endpoint);
    }
    if let Some(secs) = cli.timeout {
        settings.runner.timeout_secs = secs;
    }
    if cli.no_bugs {
        settings.runner.inject_bugs = false;
    }

    settings.validate()?;

    let (model, model_endpoint) = if cli.offline {
        (settings.model.name.clone(), None)
    } else {
        let access = settings.model.resolve()?;
        (access.model, Some(access.endpoint))
    };

    global_registry().add_hook(Box::new(LogBridgeHook::default()));
    init_tracing(SERVICE_NAME, settings.tracing.clone())?;

    let (selected, unknown) = runner::select(&catalog, &cli.scenarios);
    for id in &unknown {
        eprintln!("unknown scenario: {id}");
    }

    let limit = settings.runner.timeout();
    let mut reports = Vec::with_capacity(selected.len());
    if selected.is_empty() {
        println!("No scenarios to run");
    }
    for scenario in selected {
        let ctx = ScenarioCtx {
            tracer: get_tracer(scenario.id()),
            model: model.clone(),
            endpoint: model_endpoint.clone(),
            inject_bugs: settings.runner.inject_bugs,
        };
        let report = runner::run_one(scenario, &ctx, limit).await;
        println!("{report}");
        reports.push(report);
    }
    if !reports.is_empty() {
        println!("{}", runner::summary(&reports));
    }

    if let Err(e) = shutdown_tracing(SHUTDOWN_TIMEOUT) {
        warn!(error = %e, "tracing shutdown incomplete");
    }
    Ok(if runner::all_passed(&reports) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
