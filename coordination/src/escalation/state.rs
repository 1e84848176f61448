//! Escalation State: tier and failure budget for one task stream

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::tier::Tier;

/// Complexity observed for a task stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplexitySignals {
    /// Distinct files touched so far
    pub files_touched: usize,
    /// Distinct modules touched so far
    pub modules_touched: usize,
}

impl ComplexitySignals {
    pub fn new(files_touched: usize, modules_touched: usize) -> Self {
        Self {
            files_touched,
            modules_touched,
        }
    }
}

/// Reasons for a tier change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    /// Consecutive failures at the tier reached the threshold
    RepeatedFailures { count: u32, threshold: u32 },
    /// Too many files touched
    FileComplexity { files: usize, threshold: usize },
    /// Too many modules touched
    ModuleComplexity { modules: usize, threshold: usize },
    /// Caller asked for a higher starting tier
    Requested,
    /// Operator moved the stream down
    DeEscalated,
}

impl fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RepeatedFailures { count, threshold } => {
                write!(f, "{} failures at tier (threshold: {})", count, threshold)
            }
            Self::FileComplexity { files, threshold } => {
                write!(f, "{} files touched (threshold: {})", files, threshold)
            }
            Self::ModuleComplexity { modules, threshold } => {
                write!(f, "{} modules touched (threshold: {})", modules, threshold)
            }
            Self::Requested => write!(f, "requested by caller"),
            Self::DeEscalated => write!(f, "explicit de-escalation"),
        }
    }
}

/// Record of a tier change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationRecord {
    pub from_tier: Tier,
    pub to_tier: Tier,
    pub reason: EscalationReason,
    pub timestamp: DateTime<Utc>,
}

/// Escalation state for a single task stream.
///
/// Owned by the stream; never shared between streams.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationState {
    pub stream_id: String,
    pub current_tier: Tier,
    /// Counted failures since the last tier change or success
    pub failures_at_tier: u32,
    pub files_touched: usize,
    pub modules_touched: usize,
    pub escalation_history: Vec<EscalationRecord>,
}

impl EscalationState {
    pub fn new(stream_id: impl Into<String>, tier: Tier) -> Self {
        Self {
            stream_id: stream_id.into(),
            current_tier: tier,
            failures_at_tier: 0,
            files_touched: 0,
            modules_touched: 0,
            escalation_history: Vec::new(),
        }
    }

    pub fn complexity(&self) -> ComplexitySignals {
        ComplexitySignals::new(self.files_touched, self.modules_touched)
    }

    /// Move to `to_tier`, resetting the per-tier failure count.
    pub fn record_escalation(
        &mut self,
        to_tier: Tier,
        reason: EscalationReason,
        now: DateTime<Utc>,
    ) -> EscalationRecord {
        let record = EscalationRecord {
            from_tier: self.current_tier,
            to_tier,
            reason,
            timestamp: now,
        };
        self.escalation_history.push(record.clone());
        self.current_tier = to_tier;
        self.failures_at_tier = 0;
        record
    }

    /// Number of upward tier changes so far.
    pub fn escalation_count(&self) -> usize {
        self.escalation_history
            .iter()
            .filter(|r| r.to_tier > r.from_tier)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state() {
        let state = EscalationState::new("stream-1", Tier::Standard);
        assert_eq!(state.current_tier, Tier::Standard);
        assert_eq!(state.failures_at_tier, 0);
        assert!(state.escalation_history.is_empty());
        assert_eq!(state.complexity(), ComplexitySignals::default());
    }

    #[test]
    fn test_record_escalation_resets_failures() {
        let mut state = EscalationState::new("stream-1", Tier::Standard);
        state.failures_at_tier = 3;
        let record = state.record_escalation(
            Tier::Pro,
            EscalationReason::RepeatedFailures {
                count: 3,
                threshold: 3,
            },
            Utc::now(),
        );
        assert_eq!(record.from_tier, Tier::Standard);
        assert_eq!(state.current_tier, Tier::Pro);
        assert_eq!(state.failures_at_tier, 0);
        assert_eq!(state.escalation_count(), 1);
    }

    #[test]
    fn test_reason_display() {
        let reason = EscalationReason::ModuleComplexity {
            modules: 4,
            threshold: 3,
        };
        assert_eq!(reason.to_string(), "4 modules touched (threshold: 3)");
    }
}
