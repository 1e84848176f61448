//! Rate-limit cooldown tracking.
//!
//! When a provider throttles a request the diagnostic text often says when
//! to come back. The tracker extracts that hint, falls back to a default
//! cooldown otherwise, and marks the provider inadmissible until then.
//!
//! Recognised hints:
//!
//! ```text
//! relative   "retry after 60s"  "retry-after: 60"  "try again in 1m30s"
//!            "try again in 2 minutes"  "reset in 20 seconds"  "wait 500ms"
//! absolute   "resets at 2025-01-01T12:00:00Z"  "until 2025-01-01 12:00:00+00:00"
//!            "retry-after: Wed, 01 Jan 2025 12:10:00 GMT" (HTTP-date)
//! header     "x-ratelimit-reset: 1735732800" (epoch) / "x-ratelimit-reset-requests: 6s"
//! ```

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::Duration;

use crate::state::ProviderRuntimeState;

static RELATIVE_HINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:retry[ -]?after|try again in|resets? in|wait)\s*[:=]?\s*").unwrap()
});

static ABSOLUTE_HINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:resets? at|until)\s*:?\s*(\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:?\d{2}))",
    )
    .unwrap()
});

static HTTP_DATE_HINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)retry-after\s*:\s*((?:[a-z]{3},\s*)?\d{1,2}\s+[a-z]{3}\s+\d{4}\s+\d{2}:\d{2}:\d{2}\s+(?:GMT|UT|[+-]\d{4}))",
    )
    .unwrap()
});

static HEADER_HINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)x-ratelimit-reset(?:-requests|-tokens)?\s*:\s*").unwrap()
});

static DURATION_COMPONENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+(?:\.\d+)?)\s*([a-zA-Z]*)").unwrap());

static EPOCH_SECONDS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*(\d{9,})\b").unwrap());

/// Below this a bare header number is a delay in seconds, not an epoch.
const EPOCH_FLOOR: i64 = 1_000_000_000;

fn default_cooldown_secs() -> u64 {
    60
}

fn default_max_cooldown_secs() -> u64 {
    3_600
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Cooldown applied when the diagnostic carries no usable hint
    #[serde(default = "default_cooldown_secs")]
    pub default_cooldown_secs: u64,
    /// Upper bound on any cooldown, hinted or not
    #[serde(default = "default_max_cooldown_secs")]
    pub max_cooldown_secs: u64,
}

impl RateLimitConfig {
    pub fn default_cooldown(&self) -> Duration {
        Duration::from_secs(self.default_cooldown_secs)
    }

    pub fn max_cooldown(&self) -> Duration {
        Duration::from_secs(self.max_cooldown_secs)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default_cooldown_secs: default_cooldown_secs(),
            max_cooldown_secs: default_max_cooldown_secs(),
        }
    }
}

fn unit_millis(unit: &str) -> Option<f64> {
    match unit.to_ascii_lowercase().as_str() {
        "" | "s" | "sec" | "secs" | "second" | "seconds" => Some(1_000.0),
        "ms" | "msec" | "msecs" | "millisecond" | "milliseconds" => Some(1.0),
        "m" | "min" | "mins" | "minute" | "minutes" => Some(60_000.0),
        "h" | "hr" | "hrs" | "hour" | "hours" => Some(3_600_000.0),
        _ => None,
    }
}

/// Parse a compound duration like `1m30s`, `2 minutes`, `500ms` or `60`.
///
/// Components are consumed until one has an unrecognised unit.
fn parse_compound_duration(text: &str) -> Option<Duration> {
    let mut rest = text;
    let mut total_ms = 0.0_f64;
    let mut matched = false;

    while let Some(caps) = DURATION_COMPONENT.captures(rest) {
        let Some(scale) = unit_millis(&caps[2]) else {
            break;
        };
        let Ok(value) = caps[1].parse::<f64>() else {
            break;
        };
        total_ms += value * scale;
        matched = true;
        rest = &rest[caps[0].len()..];
        // A unitless number ends the duration ("retry after 60 or later")
        if caps[2].is_empty() {
            break;
        }
    }

    (matched && total_ms.is_finite()).then(|| Duration::from_millis(total_ms.round() as u64))
}

fn until(instant: DateTime<Utc>, now: DateTime<Utc>) -> Option<Duration> {
    (instant - now).to_std().ok().filter(|d| !d.is_zero())
}

/// Extracts reset hints and applies cooldowns.
#[derive(Debug, Clone, Default)]
pub struct RateLimitTracker {
    config: RateLimitConfig,
}

impl RateLimitTracker {
    pub fn new(config: RateLimitConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Reset hint carried by `diagnostic`, relative to `now`.
    ///
    /// Absolute times already in the past yield `None`.
    pub fn parse_hint(&self, diagnostic: &str, now: DateTime<Utc>) -> Option<Duration> {
        for m in RELATIVE_HINT.find_iter(diagnostic) {
            if let Some(d) = parse_compound_duration(&diagnostic[m.end()..]) {
                return Some(d);
            }
        }

        if let Some(caps) = ABSOLUTE_HINT.captures(diagnostic) {
            let stamp = caps[1].replacen(' ', "T", 1);
            if let Ok(at) = DateTime::parse_from_rfc3339(&stamp) {
                return until(at.with_timezone(&Utc), now);
            }
        }

        if let Some(caps) = HTTP_DATE_HINT.captures(diagnostic) {
            if let Ok(at) = DateTime::parse_from_rfc2822(&caps[1]) {
                return until(at.with_timezone(&Utc), now);
            }
        }

        for m in HEADER_HINT.find_iter(diagnostic) {
            let value = &diagnostic[m.end()..];
            if let Some(caps) = EPOCH_SECONDS.captures(value) {
                let epoch = caps[1].parse::<i64>().ok().filter(|&s| s >= EPOCH_FLOOR);
                if let Some(at) = epoch.and_then(|s| DateTime::from_timestamp(s, 0)) {
                    return until(at, now);
                }
            }
            if let Some(d) = parse_compound_duration(value) {
                return Some(d);
            }
        }

        None
    }

    /// Cooldown to apply for `diagnostic`: the hint or the default, clamped.
    pub fn cooldown_for(&self, diagnostic: &str, now: DateTime<Utc>) -> Duration {
        self.parse_hint(diagnostic, now)
            .unwrap_or_else(|| self.config.default_cooldown())
            .min(self.config.max_cooldown())
    }

    /// Put the provider into cooldown. Never shortens an existing cooldown.
    ///
    /// Returns the effective `cooldown_until`.
    pub fn apply(
        &self,
        state: &mut ProviderRuntimeState,
        diagnostic: &str,
        now: DateTime<Utc>,
    ) -> DateTime<Utc> {
        let cooldown = self.cooldown_for(diagnostic, now);
        let candidate = now
            + chrono::Duration::from_std(cooldown).unwrap_or_else(|_| chrono::Duration::zero());
        let effective = match state.cooldown_until {
            Some(existing) if existing > candidate => existing,
            _ => candidate,
        };
        state.cooldown_until = Some(effective);
        effective
    }

    /// Whether the provider is still cooling down.
    pub fn is_cooling_down(&self, state: &ProviderRuntimeState, now: DateTime<Utc>) -> bool {
        state.is_cooling_down(now)
    }
}
