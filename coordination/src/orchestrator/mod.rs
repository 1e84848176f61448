//! Orchestrator: drives one request through selection, execution, retry,
//! switching and escalation until it reaches a terminal state.
//!
//! ## Loop
//!
//! ```text
//! Selecting ──► Executing ──► Success
//!    ▲  │           │
//!    │  │           ├─► Retry ──────► Selecting   (same provider, or next in chain)
//!    │  │           ├─► Escalate ───► Selecting   (next configured tier)
//!    │  │           ├─► Exhausted
//!    │  │           └─► Fatal
//!    │  └─► Exhausted | Cancelled
//! ```
//!
//! Provider health is shared across every stream through the
//! [`ProviderStateStore`](crate::state::ProviderStateStore); escalation state
//! belongs to the calling stream. Attempts within one request are strictly
//! sequential; the worker pool bounds adapter calls across all streams.

pub mod state_machine;
pub mod types;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::adapter::{SharedAdapter, TaskPayload};
use crate::clock::{SharedClock, SystemClock};
use crate::config::HarnessConfig;
use crate::error::HarnessResult;
use crate::escalation::{EscalationSignal, EscalationState, ThinkingDepthManager};
use crate::feedback::{ErrorClassifier, ErrorKind, RawOutcome};
use crate::registry::{ModelRegistry, ProviderId, ProviderRegistry, ProviderSpec};
use crate::resilience::{FailReason, RetryDecision, RetryPolicy, SwitchCause};
use crate::router::{CircuitBreaker, FallbackChains, RateLimitTracker};
use crate::state::{ProviderStateStore, SharedProviderStateStore};
use crate::tier::Tier;

pub use state_machine::{ExecutionState, IllegalTransition, StateMachine, TransitionRecord};
pub use types::{
    AttemptOutcome, AttemptRecord, ExecutionOutcome, ExecutionRequest, ExhaustedReason,
    TerminalState,
};

/// A provider/model pair chosen for the next attempt.
#[derive(Debug, Clone)]
struct Candidate<'a> {
    provider: &'a ProviderSpec,
    model: String,
    family: String,
}

/// Result of one adapter call, before state updates.
enum Settled {
    Succeeded { output: String },
    Failed(RawOutcome),
}

/// Per-request bookkeeping. Dropped when the request ends.
#[derive(Debug, Default)]
struct RequestLedger {
    attempts: Vec<AttemptRecord>,
    /// Providers dropped for the rest of the request, and why
    excluded: HashMap<ProviderId, SwitchCause>,
    /// Budgeted failures per provider and kind since the last escalation
    failures: HashMap<(ProviderId, ErrorKind), u32>,
    /// Provider to try first after a `RetrySame`
    preferred: Option<ProviderId>,
}

impl RequestLedger {
    fn attempt_count(&self) -> u32 {
        self.attempts.len() as u32
    }

    fn bump_failures(&mut self, provider: &str, kind: ErrorKind) -> u32 {
        let count = self
            .failures
            .entry((provider.to_string(), kind))
            .or_insert(0);
        *count += 1;
        *count
    }

    /// Escalation gives every provider a fresh budget; rejected providers stay out.
    fn reset_for_new_tier(&mut self) {
        self.excluded.retain(|_, cause| *cause == SwitchCause::Rejected);
        self.failures.clear();
        self.preferred = None;
    }
}

/// The provider orchestration harness.
pub struct Orchestrator {
    models: ModelRegistry,
    providers: ProviderRegistry,
    chains: FallbackChains,
    classifier: ErrorClassifier,
    retry: RetryPolicy,
    breaker: CircuitBreaker,
    rate_limits: RateLimitTracker,
    depth: ThinkingDepthManager,
    state: SharedProviderStateStore,
    adapter: SharedAdapter,
    clock: SharedClock,
    workers: Arc<Semaphore>,
    max_total_attempts: u32,
    allow_provider_switch: bool,
}

impl Orchestrator {
    /// Build an orchestrator from validated configuration.
    pub fn new(config: &HarnessConfig, adapter: SharedAdapter) -> HarnessResult<Self> {
        config.validate()?;
        Ok(Self {
            models: config.model_registry()?,
            providers: config.provider_registry()?,
            chains: config.chains.clone(),
            classifier: ErrorClassifier::new(),
            retry: RetryPolicy::new(config.retry.clone()),
            breaker: CircuitBreaker::new(config.circuit_breaker.clone()),
            rate_limits: RateLimitTracker::new(config.rate_limit.clone()),
            depth: ThinkingDepthManager::for_chains(
                config.escalation.clone(),
                config.max_tier,
                &config.chains,
            ),
            state: ProviderStateStore::new().shared(),
            adapter,
            clock: Arc::new(SystemClock),
            workers: Arc::new(Semaphore::new(config.worker_pool_size)),
            max_total_attempts: config.max_total_attempts,
            allow_provider_switch: config.allow_provider_switch,
        })
    }

    /// Use an injected time source (tests use `ManualClock`).
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Share provider health with other orchestrators.
    pub fn with_state_store(mut self, state: SharedProviderStateStore) -> Self {
        self.state = state;
        self
    }

    pub fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn state_store(&self) -> &SharedProviderStateStore {
        &self.state
    }

    pub fn depth_manager(&self) -> &ThinkingDepthManager {
        &self.depth
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    pub fn models(&self) -> &ModelRegistry {
        &self.models
    }

    /// Run a request as a fresh task stream.
    pub async fn execute(&self, request: ExecutionRequest) -> ExecutionOutcome {
        self.execute_with_cancel(request, CancellationToken::new())
            .await
    }

    pub async fn execute_with_cancel(
        &self,
        request: ExecutionRequest,
        cancel: CancellationToken,
    ) -> ExecutionOutcome {
        let mut stream = self.depth.start_stream(request.request_id.to_string());
        self.execute_in_stream_with_cancel(&mut stream, request, cancel)
            .await
    }

    /// Run a request as part of an existing task stream.
    pub async fn execute_in_stream(
        &self,
        stream: &mut EscalationState,
        request: ExecutionRequest,
    ) -> ExecutionOutcome {
        self.execute_in_stream_with_cancel(stream, request, CancellationToken::new())
            .await
    }

    pub async fn execute_in_stream_with_cancel(
        &self,
        stream: &mut EscalationState,
        request: ExecutionRequest,
        cancel: CancellationToken,
    ) -> ExecutionOutcome {
        let span = tracing::info_span!(
            "execute",
            request_id = %request.request_id,
            stream = %stream.stream_id
        );
        self.run(stream, request, cancel).instrument(span).await
    }

    async fn run(
        &self,
        stream: &mut EscalationState,
        request: ExecutionRequest,
        cancel: CancellationToken,
    ) -> ExecutionOutcome {
        let escalations_before = stream.escalation_history.len();
        let mut sm = StateMachine::new();
        let mut ledger = RequestLedger::default();

        let now = self.clock.now();
        if let Some(tier) = request.tier {
            self.depth.request_tier(stream, tier, now);
        }
        if let Some(signals) = request.complexity {
            self.depth.observe_complexity(stream, signals, now);
        }

        let terminal = match self
            .drive(&mut sm, &mut ledger, stream, &request, &cancel)
            .await
        {
            Ok(terminal) => terminal,
            Err(e) => {
                tracing::error!(error = %e, summary = %sm.summary(), "Execution state machine violated");
                TerminalState::Fatal {
                    reason: FailReason::Internal,
                }
            }
        };

        tracing::info!(
            terminal = %terminal,
            attempts = ledger.attempts.len(),
            tier = %stream.current_tier,
            "Request finished"
        );

        ExecutionOutcome {
            request_id: request.request_id,
            stream_id: stream.stream_id.clone(),
            terminal,
            final_tier: stream.current_tier,
            attempts: ledger.attempts,
            transitions: sm.transitions().to_vec(),
            escalations: stream.escalation_history[escalations_before..].to_vec(),
        }
    }

    async fn drive(
        &self,
        sm: &mut StateMachine,
        ledger: &mut RequestLedger,
        stream: &mut EscalationState,
        request: &ExecutionRequest,
        cancel: &CancellationToken,
    ) -> Result<TerminalState, IllegalTransition> {
        loop {
            if cancel.is_cancelled() {
                sm.advance(ExecutionState::Cancelled, Some("cancelled before selection"))?;
                return Ok(TerminalState::Cancelled);
            }

            if ledger.attempt_count() >= self.max_total_attempts {
                let reason = ExhaustedReason::AttemptCeiling;
                sm.advance(ExecutionState::Exhausted, Some(&reason.to_string()))?;
                return Ok(TerminalState::Exhausted { reason });
            }

            let tier = stream.current_tier;
            let Some(candidate) = self.select(tier, request, ledger) else {
                let reason = ExhaustedReason::NoCandidate;
                tracing::warn!(%tier, excluded = ledger.excluded.len(), "No admissible provider");
                sm.advance(ExecutionState::Exhausted, Some(&reason.to_string()))?;
                return Ok(TerminalState::Exhausted { reason });
            };

            sm.advance(
                ExecutionState::Executing,
                Some(&format!("{}/{}", candidate.provider.id, candidate.model)),
            )?;
            let attempt = ledger.attempt_count() + 1;
            sm.set_attempt(attempt);

            let started_at = self.clock.now();
            let clock_start = tokio::time::Instant::now();
            let settled = self.invoke(&candidate, &request.payload).await;
            let duration = clock_start.elapsed();
            let finished_at = self.clock.now();

            let provider_id = candidate.provider.id.clone();
            let mut record = AttemptRecord {
                attempt,
                provider: provider_id.clone(),
                model: candidate.model.clone(),
                family: Some(candidate.family.clone()),
                tier,
                started_at,
                finished_at,
                duration,
                outcome: AttemptOutcome::Succeeded,
                decision: None,
            };

            let raw = match settled {
                Settled::Succeeded { output } => {
                    self.record_success(&provider_id, finished_at);
                    self.depth.record_success(stream);
                    tracing::info!(
                        provider = %provider_id,
                        model = %candidate.model,
                        attempt,
                        "Attempt succeeded"
                    );
                    ledger.attempts.push(record);
                    sm.advance(ExecutionState::Success, None)?;
                    return Ok(TerminalState::Success {
                        provider: provider_id,
                        model: candidate.model,
                        output,
                    });
                }
                Settled::Failed(raw) => raw,
            };

            let kind = self.classifier.classify(&raw);
            self.record_failure(&provider_id, kind, &raw.diagnostic, finished_at);

            let decision = self.decide(stream, ledger, &provider_id, kind, finished_at);

            tracing::warn!(
                provider = %provider_id,
                model = %candidate.model,
                attempt,
                %kind,
                status = ?raw.status,
                %decision,
                "Attempt failed"
            );

            record.outcome = AttemptOutcome::Failed {
                kind,
                status: raw.status,
                diagnostic: raw.diagnostic,
                timed_out: raw.timed_out,
            };
            record.decision = Some(decision);
            ledger.attempts.push(record);

            match decision {
                RetryDecision::RetrySame { delay } => {
                    ledger.preferred = Some(provider_id);
                    sm.advance(ExecutionState::Retry, Some(&decision.to_string()))?;
                    if !self.backoff(delay, cancel).await {
                        sm.advance(ExecutionState::Cancelled, Some("cancelled during backoff"))?;
                        return Ok(TerminalState::Cancelled);
                    }
                    sm.advance(ExecutionState::Selecting, None)?;
                }
                RetryDecision::SwitchProvider { cause } => {
                    if !self.allow_provider_switch {
                        return if cause == SwitchCause::Rejected {
                            let reason = FailReason::ProviderRejected;
                            sm.advance(ExecutionState::Fatal, Some(&reason.to_string()))?;
                            Ok(TerminalState::Fatal { reason })
                        } else {
                            let reason = ExhaustedReason::SwitchingDisabled;
                            sm.advance(ExecutionState::Exhausted, Some(&reason.to_string()))?;
                            Ok(TerminalState::Exhausted { reason })
                        };
                    }
                    if cause.excludes_provider() {
                        ledger.excluded.insert(provider_id, cause);
                    }
                    ledger.preferred = None;
                    sm.advance(ExecutionState::Retry, Some(&decision.to_string()))?;
                    sm.advance(ExecutionState::Selecting, None)?;
                }
                RetryDecision::EscalateTier => {
                    ledger.reset_for_new_tier();
                    let reason = format!("{} → {}", tier, stream.current_tier);
                    sm.advance(ExecutionState::Escalate, Some(&reason))?;
                    sm.advance(ExecutionState::Selecting, None)?;
                }
                RetryDecision::Fail { reason } => {
                    sm.advance(ExecutionState::Fatal, Some(&reason.to_string()))?;
                    return Ok(TerminalState::Fatal { reason });
                }
            }
        }
    }

    /// Retry decision combined with the stream's escalation signal.
    ///
    /// Escalation overrides retrying or switching, never a failure. A
    /// rejected provider is excluded even when escalation wins.
    fn decide(
        &self,
        stream: &mut EscalationState,
        ledger: &mut RequestLedger,
        provider: &str,
        kind: ErrorKind,
        now: DateTime<Utc>,
    ) -> RetryDecision {
        // Immediate strategies (rate limits, rejections) never touch the budget
        let failures = match self.retry.strategy_for(kind) {
            Some(strategy) if strategy.has_budget() => ledger.bump_failures(provider, kind),
            _ => 0,
        };
        let decision = self.retry.decide(kind, failures);
        match decision {
            RetryDecision::Fail { .. } => return decision,
            RetryDecision::SwitchProvider {
                cause: SwitchCause::Rejected,
            } => {
                ledger
                    .excluded
                    .insert(provider.to_string(), SwitchCause::Rejected);
            }
            _ => {}
        }
        match self.depth.record_failure(stream, kind, now) {
            EscalationSignal::Stay => decision,
            EscalationSignal::Escalated(_) => RetryDecision::EscalateTier,
            EscalationSignal::TierExhausted { .. } => RetryDecision::Fail {
                reason: FailReason::TierExhausted,
            },
        }
    }

    /// First admissible provider/model for `tier`, preferring a provider
    /// that was just told to retry.
    fn select<'a>(
        &'a self,
        tier: Tier,
        request: &ExecutionRequest,
        ledger: &RequestLedger,
    ) -> Option<Candidate<'a>> {
        let chain = self.chains.chain(tier);
        let preferred = ledger
            .preferred
            .as_ref()
            .filter(|id| chain.contains(*id));
        let ordered = preferred
            .into_iter()
            .chain(chain.iter().filter(|id| Some(*id) != preferred));

        let now = self.clock.now();
        for id in ordered {
            if ledger.excluded.contains_key(id) {
                continue;
            }
            let Some(provider) = self.providers.get(id) else {
                continue;
            };
            let Some((model, info)) =
                provider.model_for_tier(&self.models, tier, &request.required_capabilities)
            else {
                continue;
            };
            if !self.is_admissible(id, now) {
                continue;
            }
            return Some(Candidate {
                provider,
                model: model.to_string(),
                family: info.family.clone(),
            });
        }
        None
    }

    /// Not OPEN (after the lazy HALF_OPEN check) and not cooling down.
    fn is_admissible(&self, provider: &str, now: DateTime<Utc>) -> bool {
        self.state.update(provider, |state| {
            let before = state.circuit;
            let selectable = self.breaker.is_selectable(state, now);
            if state.circuit != before {
                tracing::info!(provider, from = %before, to = %state.circuit, "Circuit state changed");
            }
            selectable && !state.is_cooling_down(now)
        })
    }

    async fn invoke(&self, candidate: &Candidate<'_>, payload: &TaskPayload) -> Settled {
        let Ok(_permit) = self.workers.acquire().await else {
            return Settled::Failed(RawOutcome::new(None, "worker pool closed"));
        };

        let provider = candidate.provider;
        let timeout = provider.timeout();
        tracing::debug!(provider = %provider.id, model = %candidate.model, ?timeout, "Invoking provider");

        let call = self
            .adapter
            .invoke(provider, &candidate.model, payload, timeout);
        match tokio::time::timeout(timeout, call).await {
            Err(_) => Settled::Failed(RawOutcome::timed_out(format!(
                "provider '{}' timed out after {}s",
                provider.id,
                timeout.as_secs()
            ))),
            Ok(Err(e)) => Settled::Failed(RawOutcome::new(None, e.to_string())),
            Ok(Ok(response)) if response.is_success() => Settled::Succeeded {
                output: response.output,
            },
            Ok(Ok(response)) => {
                let diagnostic = if response.diagnostic.trim().is_empty() {
                    response.output
                } else {
                    response.diagnostic
                };
                Settled::Failed(RawOutcome::new(Some(response.status), diagnostic))
            }
        }
    }

    fn record_success(&self, provider: &str, now: DateTime<Utc>) {
        self.state.update(provider, |state| {
            state.record_attempt(None, now);
            if let Some(t) = self.breaker.record_success(state, now) {
                tracing::info!(provider, from = %t.from, to = %t.to, "Circuit state changed");
            }
        });
    }

    fn record_failure(&self, provider: &str, kind: ErrorKind, diagnostic: &str, now: DateTime<Utc>) {
        self.state.update(provider, |state| {
            state.record_attempt(Some(kind), now);
            if kind == ErrorKind::RateLimit {
                let until = self.rate_limits.apply(state, diagnostic, now);
                tracing::info!(provider, %until, "Provider cooling down");
            }
            if kind.counts_as_circuit_failure() {
                if let Some(t) = self.breaker.record_failure(state, now) {
                    tracing::warn!(
                        provider,
                        from = %t.from,
                        to = %t.to,
                        failures = state.consecutive_failures,
                        "Circuit state changed"
                    );
                }
            }
        });
    }

    /// Sleep for `delay` unless cancelled first. Returns `false` on cancel.
    async fn backoff(&self, delay: Duration, cancel: &CancellationToken) -> bool {
        if delay.is_zero() {
            return !cancel.is_cancelled();
        }
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}
