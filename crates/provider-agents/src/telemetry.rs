//! Tracing setup and the append-only outcome log.
//!
//! Every finished request can be summarised as one JSON line in a
//! `.harness-telemetry.jsonl` file, so runs can be compared across sessions.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use coordination::{AttemptOutcome, ExecutionOutcome, TerminalState, Tier};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Default log file, relative to the working directory.
pub const TELEMETRY_FILE: &str = ".harness-telemetry.jsonl";

/// Install the global `fmt` subscriber; `RUST_LOG` overrides the `info` default.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// One line of the outcome log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub recorded_at: DateTime<Utc>,
    pub request_id: String,
    pub stream_id: String,
    pub terminal: TerminalState,
    pub final_tier: Tier,
    pub attempts: usize,
    pub failures: usize,
    pub providers_tried: Vec<String>,
    pub escalations: usize,
    /// Time spent inside provider calls
    pub provider_time_ms: u64,
}

impl OutcomeRecord {
    pub fn from_outcome(outcome: &ExecutionOutcome, recorded_at: DateTime<Utc>) -> Self {
        let provider_time: Duration = outcome.attempts.iter().map(|a| a.duration).sum();
        Self {
            recorded_at,
            request_id: outcome.request_id.to_string(),
            stream_id: outcome.stream_id.clone(),
            terminal: outcome.terminal.clone(),
            final_tier: outcome.final_tier,
            attempts: outcome.attempts.len(),
            failures: outcome
                .attempts
                .iter()
                .filter(|a| matches!(a.outcome, AttemptOutcome::Failed { .. }))
                .count(),
            providers_tried: outcome
                .providers_tried()
                .into_iter()
                .map(str::to_string)
                .collect(),
            escalations: outcome.escalations.len(),
            provider_time_ms: provider_time.as_millis() as u64,
        }
    }
}

/// Append one record to the JSONL log at `path`, creating it if needed.
pub fn append_outcome(path: &Path, outcome: &ExecutionOutcome) -> Result<()> {
    let record = OutcomeRecord::from_outcome(outcome, Utc::now());
    let mut line = serde_json::to_string(&record).context("Failed to serialize outcome record")?;
    line.push('\n');

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open telemetry log {}", path.display()))?;
    file.write_all(line.as_bytes())
        .with_context(|| format!("Failed to append to {}", path.display()))?;

    info!(
        path = %path.display(),
        terminal = %record.terminal,
        attempts = record.attempts,
        "Outcome recorded"
    );
    Ok(())
}
