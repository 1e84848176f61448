//! Per-provider circuit breaker.
//!
//! The breaker tracks consecutive failures per provider. When failures
//! reach a configurable threshold the circuit *opens* and the provider is
//! skipped. After the timeout the circuit enters *half-open* the next time
//! it is polled for selection, and trial requests decide whether it closes
//! again or re-opens.
//!
//! The breaker itself is stateless configuration; the per-provider state it
//! drives lives in [`ProviderRuntimeState`] and is only ever touched under
//! that provider's lock in the state store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::state::ProviderRuntimeState;

/// Circuit breaker state for a single provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Healthy; requests allowed.
    #[default]
    Closed,
    /// Tripped; requests blocked until the timeout expires.
    Open,
    /// Timeout expired; trial requests allowed.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_success_threshold() -> u32 {
    2
}

fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Consecutive half-open successes before the circuit closes.
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
    /// Seconds in OPEN before a trial is allowed.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl CircuitBreakerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            success_threshold: default_success_threshold(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// A circuit state change, returned so callers can log it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitTransition {
    pub from: CircuitState,
    pub to: CircuitState,
}

/// Drives [`ProviderRuntimeState`] through CLOSED / OPEN / HALF_OPEN.
#[derive(Debug, Clone, Default)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state, moving OPEN → HALF_OPEN once the timeout has elapsed.
    pub fn poll(&self, state: &mut ProviderRuntimeState, now: DateTime<Utc>) -> CircuitState {
        if state.circuit == CircuitState::Open && self.timeout_elapsed(state, now) {
            self.transition(state, CircuitState::HalfOpen, now);
        }
        state.circuit
    }

    /// Whether the provider may be selected (CLOSED, or HALF_OPEN as a trial).
    pub fn is_selectable(&self, state: &mut ProviderRuntimeState, now: DateTime<Utc>) -> bool {
        self.poll(state, now) != CircuitState::Open
    }

    /// Record a successful attempt.
    pub fn record_success(
        &self,
        state: &mut ProviderRuntimeState,
        now: DateTime<Utc>,
    ) -> Option<CircuitTransition> {
        state.consecutive_failures = 0;
        match self.poll(state, now) {
            CircuitState::Closed => None,
            CircuitState::HalfOpen => {
                state.consecutive_successes += 1;
                if state.consecutive_successes >= self.config.success_threshold {
                    Some(self.transition(state, CircuitState::Closed, now))
                } else {
                    None
                }
            }
            // A success that raced an open circuit does not close it; only
            // half-open trials can.
            CircuitState::Open => None,
        }
    }

    /// Record a failure that counts against the circuit.
    pub fn record_failure(
        &self,
        state: &mut ProviderRuntimeState,
        now: DateTime<Utc>,
    ) -> Option<CircuitTransition> {
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        match self.poll(state, now) {
            CircuitState::Closed if state.consecutive_failures >= self.config.failure_threshold => {
                Some(self.transition(state, CircuitState::Open, now))
            }
            CircuitState::Closed => None,
            CircuitState::HalfOpen => Some(self.transition(state, CircuitState::Open, now)),
            CircuitState::Open => None,
        }
    }

    fn timeout_elapsed(&self, state: &ProviderRuntimeState, now: DateTime<Utc>) -> bool {
        let Some(opened_at) = state.opened_at else {
            return true;
        };
        (now - opened_at)
            .to_std()
            .is_ok_and(|elapsed| elapsed >= self.config.timeout())
    }

    fn transition(
        &self,
        state: &mut ProviderRuntimeState,
        to: CircuitState,
        now: DateTime<Utc>,
    ) -> CircuitTransition {
        let from = state.circuit;
        state.circuit = to;
        state.consecutive_successes = 0;
        match to {
            CircuitState::Open => state.opened_at = Some(now),
            CircuitState::Closed => {
                state.opened_at = None;
                state.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {}
        }
        CircuitTransition { from, to }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
    }

    fn breaker(failures: u32, successes: u32, timeout_secs: u64) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: failures,
            success_threshold: successes,
            timeout_secs,
        })
    }

    #[test]
    fn test_circuit_starts_closed() {
        let cb = CircuitBreaker::default();
        let mut state = ProviderRuntimeState::default();
        assert_eq!(cb.poll(&mut state, t0()), CircuitState::Closed);
        assert!(cb.is_selectable(&mut state, t0()));
    }

    #[test]
    fn test_circuit_opens_after_threshold() {
        let cb = breaker(3, 1, 60);
        let mut state = ProviderRuntimeState::default();
        assert!(cb.record_failure(&mut state, t0()).is_none());
        assert!(cb.record_failure(&mut state, t0()).is_none());
        let transition = cb.record_failure(&mut state, t0()).unwrap();
        assert_eq!(transition.from, CircuitState::Closed);
        assert_eq!(transition.to, CircuitState::Open);
        assert_eq!(state.opened_at, Some(t0()));
        assert!(!cb.is_selectable(&mut state, t0()));
    }

    #[test]
    fn test_success_resets_failure_count() {
        let cb = breaker(3, 1, 60);
        let mut state = ProviderRuntimeState::default();
        cb.record_failure(&mut state, t0());
        cb.record_failure(&mut state, t0());
        cb.record_success(&mut state, t0());
        assert_eq!(state.consecutive_failures, 0);
        cb.record_failure(&mut state, t0());
        assert_eq!(state.circuit, CircuitState::Closed);
    }

    #[test]
    fn test_open_becomes_half_open_lazily() {
        let cb = breaker(1, 1, 60);
        let mut state = ProviderRuntimeState::default();
        cb.record_failure(&mut state, t0());

        let almost = t0() + chrono::Duration::seconds(59);
        assert_eq!(cb.poll(&mut state, almost), CircuitState::Open);

        let after = t0() + chrono::Duration::seconds(60);
        // Nothing changes until polled
        assert_eq!(state.circuit, CircuitState::Open);
        assert_eq!(cb.poll(&mut state, after), CircuitState::HalfOpen);
        assert!(cb.is_selectable(&mut state, after));
    }

    #[test]
    fn test_half_open_closes_after_success_threshold() {
        let cb = breaker(1, 2, 10);
        let mut state = ProviderRuntimeState::default();
        cb.record_failure(&mut state, t0());
        let later = t0() + chrono::Duration::seconds(10);

        assert!(cb.record_success(&mut state, later).is_none());
        assert_eq!(state.circuit, CircuitState::HalfOpen);
        let transition = cb.record_success(&mut state, later).unwrap();
        assert_eq!(transition.to, CircuitState::Closed);
        assert!(state.opened_at.is_none());
    }

    #[test]
    fn test_half_open_failure_reopens_and_restarts_clock() {
        let cb = breaker(3, 2, 10);
        let mut state = ProviderRuntimeState::default();
        for _ in 0..3 {
            cb.record_failure(&mut state, t0());
        }
        let trial = t0() + chrono::Duration::seconds(15);
        let transition = cb.record_failure(&mut state, trial).unwrap();
        assert_eq!(transition.from, CircuitState::HalfOpen);
        assert_eq!(transition.to, CircuitState::Open);
        assert_eq!(state.opened_at, Some(trial));

        let still_open = trial + chrono::Duration::seconds(5);
        assert!(!cb.is_selectable(&mut state, still_open));
    }

    #[test]
    fn test_config_defaults_from_toml() {
        let config: CircuitBreakerConfig = toml::from_str("failure_threshold = 2").unwrap();
        assert_eq!(config.failure_threshold, 2);
        assert_eq!(config.success_threshold, 2);
        assert_eq!(config.timeout(), Duration::from_secs(60));
    }
}
