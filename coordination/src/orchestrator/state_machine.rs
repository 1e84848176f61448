//! Execution State Machine: explicit states and legal transition guards.
//!
//! Every request is driven through a typed state model so that:
//! 1. Every state transition is auditable and logged.
//! 2. Illegal transitions are rejected by `advance()`.
//! 3. The attempt history in the outcome can be replayed state by state.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// States of one request.
///
/// Every request starts at `Selecting` and ends in exactly one of
/// `Success`, `Exhausted`, `Fatal` or `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// Picking a provider/model from the current tier's chain.
    Selecting,
    /// Waiting on the adapter.
    Executing,
    /// Retrying the same provider or switching to the next one.
    Retry,
    /// Moving to a higher tier before selecting again.
    Escalate,
    /// An attempt succeeded; terminal.
    Success,
    /// No admissible provider left, or the attempt ceiling was hit; terminal.
    Exhausted,
    /// Unrecoverable failure; terminal.
    Fatal,
    /// Caller cancelled between attempts; terminal.
    Cancelled,
}

impl ExecutionState {
    /// Whether this is a terminal state (no further transitions allowed).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Success | Self::Exhausted | Self::Fatal | Self::Cancelled
        )
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Selecting => write!(f, "Selecting"),
            Self::Executing => write!(f, "Executing"),
            Self::Retry => write!(f, "Retry"),
            Self::Escalate => write!(f, "Escalate"),
            Self::Success => write!(f, "Success"),
            Self::Exhausted => write!(f, "Exhausted"),
            Self::Fatal => write!(f, "Fatal"),
            Self::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Legal transitions between execution states.
///
/// ```text
/// Selecting → Executing | Exhausted | Cancelled
/// Executing → Success | Retry | Escalate | Exhausted | Fatal
/// Retry     → Selecting | Cancelled
/// Escalate  → Selecting
/// ```
fn is_legal_transition(from: ExecutionState, to: ExecutionState) -> bool {
    use ExecutionState::*;

    matches!(
        (from, to),
        (Selecting, Executing)
            | (Selecting, Exhausted)
            | (Selecting, Cancelled)
            | (Executing, Success)
            | (Executing, Retry)
            | (Executing, Escalate)
            | (Executing, Exhausted)
            | (Executing, Fatal)
            // Cancellation is only honoured while backing off
            | (Retry, Selecting)
            | (Retry, Cancelled)
            | (Escalate, Selecting)
    )
}

/// A single recorded state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: ExecutionState,
    pub to: ExecutionState,
    /// Attempts made when the transition happened.
    pub attempt: u32,
    /// Milliseconds since the request started.
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Error returned when an illegal transition is attempted.
#[derive(Debug, Clone, Error)]
#[error("Illegal state transition: {from} → {to}")]
pub struct IllegalTransition {
    pub from: ExecutionState,
    pub to: ExecutionState,
}

/// Per-request state machine with a transition log.
#[derive(Debug)]
pub struct StateMachine {
    current: ExecutionState,
    attempt: u32,
    created_at: Instant,
    transitions: Vec<TransitionRecord>,
}

impl StateMachine {
    /// Create a new state machine starting at `Selecting`.
    pub fn new() -> Self {
        Self {
            current: ExecutionState::Selecting,
            attempt: 0,
            created_at: Instant::now(),
            transitions: Vec::new(),
        }
    }

    pub fn current(&self) -> ExecutionState {
        self.current
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn set_attempt(&mut self, attempt: u32) {
        self.attempt = attempt;
    }

    /// Attempt to advance to the next state.
    pub fn advance(
        &mut self,
        to: ExecutionState,
        reason: Option<&str>,
    ) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.current, to) {
            return Err(IllegalTransition {
                from: self.current,
                to,
            });
        }

        let record = TransitionRecord {
            from: self.current,
            to,
            attempt: self.attempt,
            elapsed_ms: self.created_at.elapsed().as_millis() as u64,
            reason: reason.map(String::from),
        };

        tracing::debug!(
            from = %self.current,
            to = %to,
            attempt = self.attempt,
            "State transition"
        );

        self.transitions.push(record);
        self.current = to;
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    /// Get the full transition log.
    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    /// One-line history, e.g. `Selecting → Success (3 transitions) [Executing → Retry → ...]`.
    pub fn summary(&self) -> String {
        let states: Vec<String> = self.transitions.iter().map(|t| t.to.to_string()).collect();
        let mut out = format!(
            "{} → {} ({} transitions)",
            ExecutionState::Selecting,
            self.current,
            self.transitions.len(),
        );
        if !states.is_empty() {
            out.push_str(&format!(" [{}]", states.join(" → ")));
        }
        out
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
