//! Request, attempt and outcome types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use super::state_machine::TransitionRecord;
use crate::adapter::TaskPayload;
use crate::escalation::{ComplexitySignals, EscalationRecord};
use crate::feedback::ErrorKind;
use crate::registry::{Capability, ProviderId};
use crate::resilience::{FailReason, RetryDecision};
use crate::tier::Tier;

/// One call to `execute`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub request_id: Uuid,
    pub payload: TaskPayload,
    #[serde(default)]
    pub required_capabilities: BTreeSet<Capability>,
    /// Minimum starting tier; the stream's tier is raised to it if lower
    #[serde(default)]
    pub tier: Option<Tier>,
    /// Complexity observed for the stream so far
    #[serde(default)]
    pub complexity: Option<ComplexitySignals>,
}

impl ExecutionRequest {
    pub fn new(payload: TaskPayload) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            payload,
            required_capabilities: BTreeSet::new(),
            tier: None,
            complexity: None,
        }
    }

    pub fn with_capabilities(mut self, caps: &[Capability]) -> Self {
        self.required_capabilities.extend(caps.iter().copied());
        self
    }

    pub fn with_tier(mut self, tier: Tier) -> Self {
        self.tier = Some(tier);
        self
    }

    pub fn with_complexity(mut self, signals: ComplexitySignals) -> Self {
        self.complexity = Some(signals);
        self
    }
}

/// Result of a single attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Succeeded,
    Failed {
        kind: ErrorKind,
        status: Option<i32>,
        diagnostic: String,
        timed_out: bool,
    },
}

impl AttemptOutcome {
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Succeeded => None,
            Self::Failed { kind, .. } => Some(*kind),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-based, across providers and tiers
    pub attempt: u32,
    pub provider: ProviderId,
    pub model: String,
    pub family: Option<String>,
    pub tier: Tier,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration: Duration,
    pub outcome: AttemptOutcome,
    /// What the harness did next; `None` after a success
    pub decision: Option<RetryDecision>,
}

/// Why a request ran out of options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustedReason {
    /// Every provider in the chain is open, cooling down, excluded or lacks a model
    NoCandidate,
    /// `max_total_attempts` reached
    AttemptCeiling,
    /// A switch was needed but switching is disabled
    SwitchingDisabled,
}

impl fmt::Display for ExhaustedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCandidate => write!(f, "no admissible provider"),
            Self::AttemptCeiling => write!(f, "attempt ceiling reached"),
            Self::SwitchingDisabled => write!(f, "provider switching disabled"),
        }
    }
}

/// How a request ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TerminalState {
    Success {
        provider: ProviderId,
        model: String,
        output: String,
    },
    Exhausted {
        reason: ExhaustedReason,
    },
    Fatal {
        reason: FailReason,
    },
    Cancelled,
}

impl TerminalState {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

impl fmt::Display for TerminalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success { provider, model, .. } => write!(f, "success ({}/{})", provider, model),
            Self::Exhausted { reason } => write!(f, "exhausted ({})", reason),
            Self::Fatal { reason } => write!(f, "fatal ({})", reason),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Everything the caller gets back from `execute`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub request_id: Uuid,
    pub stream_id: String,
    pub terminal: TerminalState,
    pub final_tier: Tier,
    /// Every attempt, in order; no diagnostic is dropped
    pub attempts: Vec<AttemptRecord>,
    pub transitions: Vec<TransitionRecord>,
    /// Tier changes made during this request
    pub escalations: Vec<EscalationRecord>,
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        self.terminal.is_success()
    }

    /// Output of the successful attempt.
    pub fn output(&self) -> Option<&str> {
        match &self.terminal {
            TerminalState::Success { output, .. } => Some(output),
            _ => None,
        }
    }

    /// The most recent failed attempt.
    pub fn last_failure(&self) -> Option<&AttemptRecord> {
        self.attempts
            .iter()
            .rev()
            .find(|a| matches!(a.outcome, AttemptOutcome::Failed { .. }))
    }

    /// Providers tried, in order, with repeats.
    pub fn providers_tried(&self) -> Vec<&str> {
        self.attempts.iter().map(|a| a.provider.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = ExecutionRequest::new(TaskPayload::new("hi"))
            .with_capabilities(&[Capability::Vision])
            .with_tier(Tier::Pro)
            .with_complexity(ComplexitySignals::new(2, 1));
        assert!(request.required_capabilities.contains(&Capability::Vision));
        assert_eq!(request.tier, Some(Tier::Pro));
        assert_ne!(
            request.request_id,
            ExecutionRequest::new(TaskPayload::new("hi")).request_id
        );
    }

    #[test]
    fn test_terminal_serialization() {
        let terminal = TerminalState::Exhausted {
            reason: ExhaustedReason::NoCandidate,
        };
        let json = serde_json::to_value(&terminal).unwrap();
        assert_eq!(json["state"], "exhausted");
        assert_eq!(json["reason"], "no_candidate");
        assert_eq!(terminal.to_string(), "exhausted (no admissible provider)");
    }
}
