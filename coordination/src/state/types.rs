//! Runtime state types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::feedback::ErrorKind;
use crate::router::CircuitState;

/// Health of one provider, shared by every request in the process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderRuntimeState {
    /// Circuit status as of the last poll or update
    pub circuit: CircuitState,
    /// Consecutive counted failures (reset by any success)
    pub consecutive_failures: u32,
    /// Consecutive successes while half-open
    pub consecutive_successes: u32,
    /// When the circuit last entered OPEN
    pub opened_at: Option<DateTime<Utc>>,
    /// Provider is inadmissible until this instant
    pub cooldown_until: Option<DateTime<Utc>>,
    pub total_attempts: u64,
    pub total_failures: u64,
    pub last_error_kind: Option<ErrorKind>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl ProviderRuntimeState {
    /// Whether a rate-limit cooldown is still active at `now`.
    pub fn is_cooling_down(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_until.is_some_and(|until| until > now)
    }

    /// Time left on the cooldown, zero when none is active.
    pub fn cooldown_remaining(&self, now: DateTime<Utc>) -> Duration {
        self.cooldown_until
            .and_then(|until| (until - now).to_std().ok())
            .unwrap_or(Duration::ZERO)
    }

    /// Bookkeeping shared by every settled attempt.
    pub fn record_attempt(&mut self, error: Option<ErrorKind>, now: DateTime<Utc>) {
        self.total_attempts += 1;
        if let Some(kind) = error {
            self.total_failures += 1;
            self.last_error_kind = Some(kind);
        }
        self.last_updated = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_cooldown_window() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let mut state = ProviderRuntimeState::default();
        assert!(!state.is_cooling_down(now));

        state.cooldown_until = Some(now + chrono::Duration::seconds(30));
        assert!(state.is_cooling_down(now));
        assert_eq!(state.cooldown_remaining(now), Duration::from_secs(30));

        let later = now + chrono::Duration::seconds(30);
        assert!(!state.is_cooling_down(later));
        assert_eq!(state.cooldown_remaining(later), Duration::ZERO);
    }

    #[test]
    fn test_record_attempt_counters() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let mut state = ProviderRuntimeState::default();
        state.record_attempt(None, now);
        state.record_attempt(Some(ErrorKind::Server), now);
        assert_eq!(state.total_attempts, 2);
        assert_eq!(state.total_failures, 1);
        assert_eq!(state.last_error_kind, Some(ErrorKind::Server));
        assert_eq!(state.last_updated, Some(now));
    }
}
