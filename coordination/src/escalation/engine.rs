//! Thinking-depth manager: deterministic tier escalation for task streams
//!
//! Consumes classified failures and complexity observations and moves the
//! stream's tier up the configured ladder. All decisions are deterministic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::escalation::state::{ComplexitySignals, EscalationReason, EscalationRecord, EscalationState};
use crate::feedback::ErrorKind;
use crate::router::FallbackChains;
use crate::tier::Tier;

fn default_on_fail_attempts() -> u32 {
    3
}

fn default_files_threshold() -> usize {
    8
}

fn default_modules_threshold() -> usize {
    3
}

fn default_initial_tier() -> Tier {
    Tier::Standard
}

/// Configuration for tier escalation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationConfig {
    /// Counted failures at one tier before moving up
    #[serde(default = "default_on_fail_attempts")]
    pub on_fail_attempts: u32,
    /// Files touched at which the stream moves up one tier
    #[serde(default = "default_files_threshold")]
    pub files_threshold: usize,
    /// Modules touched at which the stream moves up one tier
    #[serde(default = "default_modules_threshold")]
    pub modules_threshold: usize,
    /// Tier new streams start at
    #[serde(default = "default_initial_tier")]
    pub initial_tier: Tier,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            on_fail_attempts: default_on_fail_attempts(),
            files_threshold: default_files_threshold(),
            modules_threshold: default_modules_threshold(),
            initial_tier: default_initial_tier(),
        }
    }
}

/// Outcome of feeding an observation to the manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationSignal {
    /// Stay at the current tier
    Stay,
    /// The stream moved to a higher tier
    Escalated(EscalationRecord),
    /// Threshold reached with no higher tier available
    TierExhausted { tier: Tier },
}

impl EscalationSignal {
    pub fn is_escalated(&self) -> bool {
        matches!(self, Self::Escalated(_))
    }
}

/// Tracks and caps the capability tier of task streams.
#[derive(Debug, Clone)]
pub struct ThinkingDepthManager {
    config: EscalationConfig,
    max_tier: Tier,
    /// Tiers escalation may land on, ascending, all `<= max_tier`
    ladder: Vec<Tier>,
}

impl ThinkingDepthManager {
    /// Manager that may escalate through every tier up to `max_tier`.
    pub fn new(config: EscalationConfig, max_tier: Tier) -> Self {
        Self::with_ladder(config, max_tier, Tier::all().iter().copied())
    }

    /// Manager restricted to `tiers` (filtered to `<= max_tier`).
    pub fn with_ladder(
        config: EscalationConfig,
        max_tier: Tier,
        tiers: impl IntoIterator<Item = Tier>,
    ) -> Self {
        let mut ladder: Vec<Tier> = tiers.into_iter().filter(|t| *t <= max_tier).collect();
        ladder.sort();
        ladder.dedup();
        Self {
            config,
            max_tier,
            ladder,
        }
    }

    /// Manager whose ladder is the set of tiers with a configured chain.
    pub fn for_chains(config: EscalationConfig, max_tier: Tier, chains: &FallbackChains) -> Self {
        let tiers = chains
            .iter()
            .filter(|(_, chain)| !chain.is_empty())
            .map(|(tier, _)| tier);
        Self::with_ladder(config, max_tier, tiers)
    }

    pub fn config(&self) -> &EscalationConfig {
        &self.config
    }

    pub fn max_tier(&self) -> Tier {
        self.max_tier
    }

    /// Fresh state for a new task stream at the initial tier.
    pub fn start_stream(&self, stream_id: impl Into<String>) -> EscalationState {
        EscalationState::new(stream_id, self.config.initial_tier.min(self.max_tier))
    }

    /// Next tier strictly above `current` on the ladder.
    pub fn next_tier(&self, current: Tier) -> Option<Tier> {
        self.ladder.iter().copied().find(|t| *t > current)
    }

    /// Record a failed attempt at the stream's current tier.
    ///
    /// Rate-limit failures say nothing about capability and are not counted.
    pub fn record_failure(
        &self,
        state: &mut EscalationState,
        kind: ErrorKind,
        now: DateTime<Utc>,
    ) -> EscalationSignal {
        if kind == ErrorKind::RateLimit {
            return EscalationSignal::Stay;
        }
        state.failures_at_tier = state.failures_at_tier.saturating_add(1);
        if state.failures_at_tier < self.config.on_fail_attempts.max(1) {
            return EscalationSignal::Stay;
        }

        let reason = EscalationReason::RepeatedFailures {
            count: state.failures_at_tier,
            threshold: self.config.on_fail_attempts,
        };
        self.escalate(state, reason, now)
    }

    /// A success clears the failure streak at the current tier.
    pub fn record_success(&self, state: &mut EscalationState) {
        state.failures_at_tier = 0;
    }

    /// Fold in complexity signals; escalates at most one tier when a
    /// threshold is newly crossed. Counts never decrease.
    pub fn observe_complexity(
        &self,
        state: &mut EscalationState,
        signals: ComplexitySignals,
        now: DateTime<Utc>,
    ) -> EscalationSignal {
        let before = state.complexity();
        state.files_touched = before.files_touched.max(signals.files_touched);
        state.modules_touched = before.modules_touched.max(signals.modules_touched);

        let files_threshold = self.config.files_threshold;
        let modules_threshold = self.config.modules_threshold;
        let reason = if before.files_touched < files_threshold
            && state.files_touched >= files_threshold
        {
            EscalationReason::FileComplexity {
                files: state.files_touched,
                threshold: files_threshold,
            }
        } else if before.modules_touched < modules_threshold
            && state.modules_touched >= modules_threshold
        {
            EscalationReason::ModuleComplexity {
                modules: state.modules_touched,
                threshold: modules_threshold,
            }
        } else {
            return EscalationSignal::Stay;
        };

        match self.escalate(state, reason, now) {
            // Complexity alone never fails a request
            EscalationSignal::TierExhausted { .. } => EscalationSignal::Stay,
            signal => signal,
        }
    }

    /// Raise the stream to a caller-requested tier (capped at `max_tier`).
    /// Requests below the current tier are ignored.
    pub fn request_tier(
        &self,
        state: &mut EscalationState,
        tier: Tier,
        now: DateTime<Utc>,
    ) -> EscalationSignal {
        let target = tier.min(self.max_tier);
        if target <= state.current_tier {
            return EscalationSignal::Stay;
        }
        let record = state.record_escalation(target, EscalationReason::Requested, now);
        tracing::info!(
            stream = %state.stream_id,
            from = %record.from_tier,
            to = %record.to_tier,
            "Tier raised on request"
        );
        EscalationSignal::Escalated(record)
    }

    /// Explicitly move the stream down to `to`. No-op unless `to` is lower.
    pub fn de_escalate(
        &self,
        state: &mut EscalationState,
        to: Tier,
        now: DateTime<Utc>,
    ) -> Option<EscalationRecord> {
        if to >= state.current_tier {
            return None;
        }
        let record = state.record_escalation(to, EscalationReason::DeEscalated, now);
        tracing::info!(
            stream = %state.stream_id,
            from = %record.from_tier,
            to = %record.to_tier,
            "Tier de-escalated"
        );
        Some(record)
    }

    fn escalate(
        &self,
        state: &mut EscalationState,
        reason: EscalationReason,
        now: DateTime<Utc>,
    ) -> EscalationSignal {
        let Some(to) = self.next_tier(state.current_tier) else {
            tracing::warn!(
                stream = %state.stream_id,
                tier = %state.current_tier,
                %reason,
                "No higher tier available"
            );
            return EscalationSignal::TierExhausted {
                tier: state.current_tier,
            };
        };
        let record = state.record_escalation(to, reason, now);
        tracing::info!(
            stream = %state.stream_id,
            from = %record.from_tier,
            to = %record.to_tier,
            reason = %record.reason,
            "Escalating tier"
        );
        EscalationSignal::Escalated(record)
    }
}
