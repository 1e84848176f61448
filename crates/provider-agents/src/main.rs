//! Single-shot runner: load the harness config, execute one request through
//! the orchestrator, print the outcome as JSON on stdout.
//!
//! ```bash
//! provider-agents --config harness.toml --prompt "fix the failing test"
//! echo "summarise this diff" | provider-agents --tier pro
//! ```
//!
//! Exit status is 0 on success, 1 for any other terminal state.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use coordination::{
    Capability, ComplexitySignals, ExecutionRequest, Orchestrator, TaskPayload, Tier,
};
use provider_agents::{config, telemetry, RoutingAdapter};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Harness config file (defaults to $HARNESS_CONFIG, then ./harness.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Task prompt; read from stdin when omitted
    #[arg(long)]
    prompt: Option<String>,

    /// Minimum tier to start at
    #[arg(long)]
    tier: Option<Tier>,

    /// Required model capability (repeatable)
    #[arg(long = "capability", value_parser = parse_capability)]
    capabilities: Vec<Capability>,

    /// Working directory handed to process providers
    #[arg(long)]
    working_dir: Option<PathBuf>,

    /// Files touched so far, for complexity-based escalation
    #[arg(long)]
    files_touched: Option<usize>,

    /// Modules touched so far, for complexity-based escalation
    #[arg(long)]
    modules_touched: Option<usize>,

    /// Append an outcome record to this JSONL file
    #[arg(long)]
    telemetry: Option<PathBuf>,
}

fn parse_capability(value: &str) -> Result<Capability, String> {
    serde_json::from_value(serde_json::Value::String(value.replace('-', "_")))
        .map_err(|_| format!("unknown capability '{value}'"))
}

fn read_prompt(arg: Option<String>) -> Result<String> {
    if let Some(prompt) = arg {
        return Ok(prompt);
    }
    let mut prompt = String::new();
    std::io::stdin()
        .read_to_string(&mut prompt)
        .context("Failed to read prompt from stdin")?;
    Ok(prompt)
}

fn build_request(args: &Args, prompt: String) -> ExecutionRequest {
    let mut payload = TaskPayload::new(prompt);
    if let Some(dir) = &args.working_dir {
        payload = payload.with_working_dir(dir);
    }
    let mut request = ExecutionRequest::new(payload).with_capabilities(&args.capabilities);
    if let Some(tier) = args.tier {
        request = request.with_tier(tier);
    }
    if args.files_touched.is_some() || args.modules_touched.is_some() {
        request = request.with_complexity(ComplexitySignals::new(
            args.files_touched.unwrap_or(0),
            args.modules_touched.unwrap_or(0),
        ));
    }
    request
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing();
    let args = Args::parse();

    let config = config::load(args.config.as_deref())?;
    let prompt = read_prompt(args.prompt.clone())?;
    if prompt.trim().is_empty() {
        anyhow::bail!("Empty prompt");
    }

    let adapter = RoutingAdapter::new().context("Failed to build provider adapters")?;
    let orchestrator =
        Orchestrator::new(&config, Arc::new(adapter)).context("Failed to build orchestrator")?;
    info!(
        providers = orchestrator.providers().len(),
        max_tier = %config.max_tier,
        "Harness ready"
    );

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; cancelling after the current attempt");
            on_signal.cancel();
        }
    });

    let request = build_request(&args, prompt);
    let outcome = orchestrator.execute_with_cancel(request, cancel).await;

    if let Some(path) = &args.telemetry {
        if let Err(e) = telemetry::append_outcome(path, &outcome) {
            warn!(error = %e, "Failed to record outcome");
        }
    }

    let json = serde_json::to_string_pretty(&outcome).context("Failed to serialize outcome")?;
    println!("{json}");

    if !outcome.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
