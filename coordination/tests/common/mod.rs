//! Shared fixtures for orchestrator integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use coordination::{
    AdapterError, FallbackChains, HarnessConfig, ManualClock, Orchestrator, ProviderAdapter,
    ProviderResponse, ProviderSpec, RetryStrategy, TaskPayload, Tier,
};

/// One scripted adapter reply.
#[derive(Debug, Clone)]
pub enum Step {
    Succeed(String),
    Fail(i32, String),
    Error(String),
    /// Never returns; the orchestrator's timeout has to fire
    Hang,
}

/// Adapter that replays per-provider scripts and records every call.
///
/// A provider whose script is empty succeeds with `"ok from <id>"`.
#[derive(Default)]
pub struct ScriptedAdapter {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    calls: Mutex<Vec<(String, String)>>,
    latency: Duration,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    /// Clock moved forward by every call, standing in for provider latency
    tick: Option<(ManualClock, chrono::Duration)>,
}

impl ScriptedAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn ticking(mut self, clock: &ManualClock, per_call: chrono::Duration) -> Self {
        self.tick = Some((clock.clone(), per_call));
        self
    }

    pub fn script(self, provider: &str, steps: impl IntoIterator<Item = Step>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(provider.to_string())
            .or_default()
            .extend(steps);
        self
    }

    /// Provider ids in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(p, _)| p.clone())
            .collect()
    }

    pub fn models_called(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, m)| m.clone())
            .collect()
    }

    pub fn call_count(&self, provider: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == provider)
            .count()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    async fn invoke(
        &self,
        provider: &ProviderSpec,
        model: &str,
        _payload: &TaskPayload,
        _timeout: Duration,
    ) -> Result<ProviderResponse, AdapterError> {
        self.calls
            .lock()
            .unwrap()
            .push((provider.id.clone(), model.to_string()));
        let step = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&provider.id)
            .and_then(|q| q.pop_front());

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if let Some((clock, per_call)) = &self.tick {
            clock.advance(*per_call);
        }

        match step {
            None => Ok(ProviderResponse::success(format!("ok from {}", provider.id))),
            Some(Step::Succeed(output)) => Ok(ProviderResponse::success(output)),
            Some(Step::Fail(status, diagnostic)) => {
                Ok(ProviderResponse::failure(status, diagnostic))
            }
            Some(Step::Error(message)) => Err(AdapterError::Transport(message)),
            Some(Step::Hang) => {
                tokio::time::sleep(Duration::from_secs(24 * 3_600)).await;
                Ok(ProviderResponse::success("too late"))
            }
        }
    }
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
}

pub fn server_error() -> Step {
    Step::Fail(500, "500 Internal Server Error".into())
}

/// Two standard-tier providers (`p1` → `p2`) and one pro-tier provider (`p3`).
///
/// Server errors retry immediately so tests don't depend on backoff timing.
pub fn base_config() -> HarnessConfig {
    let mut config = HarnessConfig {
        providers: vec![
            ProviderSpec::process("p1", "p1-cli -p", &["claude-3-5-sonnet-20241022"]),
            ProviderSpec::api("p2", "http://127.0.0.1:9/v1", &["gpt-4o-2024-08-06"]),
            ProviderSpec::process("p3", "p3-cli -p", &["claude-opus-4-20250514"]),
        ],
        chains: FallbackChains::new()
            .with_chain(Tier::Standard, &["p1", "p2"])
            .with_chain(Tier::Pro, &["p3"]),
        ..Default::default()
    };
    config.retry.server = RetryStrategy::fixed(Duration::ZERO, 5);
    config.retry.network = RetryStrategy::fixed(Duration::ZERO, 0);
    config
}

pub fn build(
    config: &HarnessConfig,
    adapter: &Arc<ScriptedAdapter>,
) -> (Orchestrator, ManualClock) {
    build_with_clock(config, adapter, ManualClock::new(t0()))
}

pub fn build_with_clock(
    config: &HarnessConfig,
    adapter: &Arc<ScriptedAdapter>,
    clock: ManualClock,
) -> (Orchestrator, ManualClock) {
    let orchestrator = Orchestrator::new(config, adapter.clone())
        .unwrap()
        .with_clock(Arc::new(clock.clone()));
    (orchestrator, clock)
}

pub fn task() -> coordination::ExecutionRequest {
    coordination::ExecutionRequest::new(TaskPayload::new("refactor the parser"))
}
