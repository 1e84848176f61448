//! Resilience: retry and backoff policy per error kind
//!
//! The policy is a pure function from a classified failure to a
//! [`RetryDecision`]. It never mutates provider or stream state; the
//! orchestrator applies the decision.
//!
//! # Design
//!
//! ```text
//! ErrorKind ──► RetryStrategy ──► RetryDecision
//!   network        exponential_backoff   RetrySame(delay) while n <= max_retries
//!   server         exponential_backoff   SwitchProvider(budget_exhausted) after
//!   timeout        linear_backoff
//!   rate_limit     immediate_switch      SwitchProvider(immediate)
//!   authentication immediate_fail        SwitchProvider(rejected)
//!   unknown        (fixed)               Fail(unclassified)
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::feedback::ErrorKind;

/// How failures of one kind are retried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum RetryStrategy {
    /// `base_delay * n`
    LinearBackoff { base_delay_ms: u64, max_retries: u32 },
    /// `base_delay * 2^(n-1)`, optionally capped
    ExponentialBackoff {
        base_delay_ms: u64,
        max_retries: u32,
        #[serde(default)]
        max_delay_ms: Option<u64>,
    },
    /// Constant `delay`
    FixedDelay { delay_ms: u64, max_retries: u32 },
    /// Move to the next provider without delay or budget use
    ImmediateSwitch,
    /// Never retry this provider within the request
    ImmediateFail,
}

impl RetryStrategy {
    pub fn linear(base: Duration, max_retries: u32) -> Self {
        Self::LinearBackoff {
            base_delay_ms: base.as_millis() as u64,
            max_retries,
        }
    }

    pub fn exponential(base: Duration, max_retries: u32) -> Self {
        Self::ExponentialBackoff {
            base_delay_ms: base.as_millis() as u64,
            max_retries,
            max_delay_ms: None,
        }
    }

    pub fn fixed(delay: Duration, max_retries: u32) -> Self {
        Self::FixedDelay {
            delay_ms: delay.as_millis() as u64,
            max_retries,
        }
    }

    /// Retry budget on a single provider.
    pub fn max_retries(&self) -> u32 {
        match self {
            Self::LinearBackoff { max_retries, .. }
            | Self::ExponentialBackoff { max_retries, .. }
            | Self::FixedDelay { max_retries, .. } => *max_retries,
            Self::ImmediateSwitch | Self::ImmediateFail => 0,
        }
    }

    /// Whether failures under this strategy draw down a per-provider budget.
    pub fn has_budget(&self) -> bool {
        !matches!(self, Self::ImmediateSwitch | Self::ImmediateFail)
    }

    /// Delay before retry number `n` (1-based). `None` for non-delaying strategies.
    pub fn delay_for(&self, n: u32) -> Option<Duration> {
        let n = n.max(1);
        match self {
            Self::LinearBackoff { base_delay_ms, .. } => Some(Duration::from_millis(
                base_delay_ms.saturating_mul(u64::from(n)),
            )),
            Self::ExponentialBackoff {
                base_delay_ms,
                max_delay_ms,
                ..
            } => {
                let factor = 1u64.checked_shl(n - 1).unwrap_or(u64::MAX);
                let ms = base_delay_ms.saturating_mul(factor);
                let ms = max_delay_ms.map_or(ms, |cap| ms.min(cap));
                Some(Duration::from_millis(ms))
            }
            Self::FixedDelay { delay_ms, .. } => Some(Duration::from_millis(*delay_ms)),
            Self::ImmediateSwitch | Self::ImmediateFail => None,
        }
    }
}

/// Why a request failed outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailReason {
    /// Failure did not match any known signature
    Unclassified,
    /// Escalation threshold reached at the highest allowed tier
    TierExhausted,
    /// Provider rejected the request and switching is disabled
    ProviderRejected,
    /// The harness itself reached an inconsistent state
    Internal,
}

impl fmt::Display for FailReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unclassified => write!(f, "unclassified"),
            Self::TierExhausted => write!(f, "tier_exhausted"),
            Self::ProviderRejected => write!(f, "provider_rejected"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// Why the orchestrator should move to another provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchCause {
    /// Strategy switches immediately (provider stays eligible later)
    Immediate,
    /// Provider used up its retry budget for this request
    BudgetExhausted,
    /// Provider rejected the request outright (`immediate_fail`)
    Rejected,
}

impl SwitchCause {
    /// Whether the provider is dropped for the rest of the request.
    pub fn excludes_provider(&self) -> bool {
        !matches!(self, Self::Immediate)
    }
}

/// Decision after a failed attempt. A value, produced fresh per attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum RetryDecision {
    RetrySame { delay: Duration },
    SwitchProvider { cause: SwitchCause },
    EscalateTier,
    Fail { reason: FailReason },
}

impl fmt::Display for RetryDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RetrySame { delay } => write!(f, "retry_same({}ms)", delay.as_millis()),
            Self::SwitchProvider { cause } => write!(f, "switch_provider({:?})", cause),
            Self::EscalateTier => write!(f, "escalate_tier"),
            Self::Fail { reason } => write!(f, "fail({})", reason),
        }
    }
}

/// Strategy table keyed by error kind. `Unknown` is not configurable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicyConfig {
    #[serde(default = "default_network")]
    pub network: RetryStrategy,
    #[serde(default = "default_server")]
    pub server: RetryStrategy,
    #[serde(default = "default_timeout")]
    pub timeout: RetryStrategy,
    #[serde(default = "default_rate_limit")]
    pub rate_limit: RetryStrategy,
    #[serde(default = "default_authentication")]
    pub authentication: RetryStrategy,
}

fn default_network() -> RetryStrategy {
    RetryStrategy::exponential(Duration::from_secs(1), 3)
}

fn default_server() -> RetryStrategy {
    RetryStrategy::exponential(Duration::from_secs(2), 3)
}

fn default_timeout() -> RetryStrategy {
    RetryStrategy::linear(Duration::from_secs(5), 2)
}

fn default_rate_limit() -> RetryStrategy {
    RetryStrategy::ImmediateSwitch
}

fn default_authentication() -> RetryStrategy {
    RetryStrategy::ImmediateFail
}

impl Default for RetryPolicyConfig {
    fn default() -> Self {
        Self {
            network: default_network(),
            server: default_server(),
            timeout: default_timeout(),
            rate_limit: default_rate_limit(),
            authentication: default_authentication(),
        }
    }
}

/// Maps classified failures to retry decisions.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryPolicyConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryPolicyConfig) -> Self {
        Self { config }
    }

    /// Configured strategy for `kind`; `None` for `Unknown`.
    pub fn strategy_for(&self, kind: ErrorKind) -> Option<&RetryStrategy> {
        match kind {
            ErrorKind::Network => Some(&self.config.network),
            ErrorKind::Server => Some(&self.config.server),
            ErrorKind::Timeout => Some(&self.config.timeout),
            ErrorKind::RateLimit => Some(&self.config.rate_limit),
            ErrorKind::Authentication => Some(&self.config.authentication),
            ErrorKind::Unknown => None,
        }
    }

    /// Decide what to do after the `failures_on_provider`-th (1-based)
    /// failure of `kind` against the same provider within one request.
    pub fn decide(&self, kind: ErrorKind, failures_on_provider: u32) -> RetryDecision {
        let Some(strategy) = self.strategy_for(kind) else {
            return RetryDecision::Fail {
                reason: FailReason::Unclassified,
            };
        };

        match strategy {
            RetryStrategy::ImmediateSwitch => RetryDecision::SwitchProvider {
                cause: SwitchCause::Immediate,
            },
            RetryStrategy::ImmediateFail => RetryDecision::SwitchProvider {
                cause: SwitchCause::Rejected,
            },
            _ if failures_on_provider > strategy.max_retries() => RetryDecision::SwitchProvider {
                cause: SwitchCause::BudgetExhausted,
            },
            _ => RetryDecision::RetrySame {
                delay: strategy
                    .delay_for(failures_on_provider)
                    .unwrap_or(Duration::ZERO),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_delays() {
        let s = RetryStrategy::linear(Duration::from_millis(500), 3);
        assert_eq!(s.delay_for(1), Some(Duration::from_millis(500)));
        assert_eq!(s.delay_for(2), Some(Duration::from_millis(1000)));
        assert_eq!(s.delay_for(3), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_exponential_delays() {
        let s = RetryStrategy::exponential(Duration::from_secs(1), 5);
        assert_eq!(s.delay_for(1), Some(Duration::from_secs(1)));
        assert_eq!(s.delay_for(2), Some(Duration::from_secs(2)));
        assert_eq!(s.delay_for(3), Some(Duration::from_secs(4)));
        assert_eq!(s.delay_for(4), Some(Duration::from_secs(8)));
    }

    #[test]
    fn test_exponential_cap_and_overflow() {
        let s = RetryStrategy::ExponentialBackoff {
            base_delay_ms: 1_000,
            max_retries: 100,
            max_delay_ms: Some(30_000),
        };
        assert_eq!(s.delay_for(10), Some(Duration::from_millis(30_000)));
        let uncapped = RetryStrategy::exponential(Duration::from_secs(1), 100);
        // Must saturate rather than panic on shift overflow
        assert!(uncapped.delay_for(90).is_some());
    }

    #[test]
    fn test_only_backoff_strategies_have_budgets() {
        assert!(RetryStrategy::linear(Duration::from_secs(1), 2).has_budget());
        assert!(RetryStrategy::exponential(Duration::from_secs(1), 2).has_budget());
        assert!(RetryStrategy::fixed(Duration::ZERO, 0).has_budget());
        assert!(!RetryStrategy::ImmediateSwitch.has_budget());
        assert!(!RetryStrategy::ImmediateFail.has_budget());
    }

    #[test]
    fn test_fixed_delay() {
        let s = RetryStrategy::fixed(Duration::from_millis(250), 2);
        assert_eq!(s.delay_for(1), s.delay_for(2));
    }

    #[test]
    fn test_retry_within_budget_then_switch() {
        let policy = RetryPolicy::default();
        // Server: exponential(2s, 3)
        assert_eq!(
            policy.decide(ErrorKind::Server, 1),
            RetryDecision::RetrySame {
                delay: Duration::from_secs(2)
            }
        );
        assert_eq!(
            policy.decide(ErrorKind::Server, 3),
            RetryDecision::RetrySame {
                delay: Duration::from_secs(8)
            }
        );
        assert_eq!(
            policy.decide(ErrorKind::Server, 4),
            RetryDecision::SwitchProvider {
                cause: SwitchCause::BudgetExhausted
            }
        );
    }

    #[test]
    fn test_rate_limit_switches_immediately() {
        let policy = RetryPolicy::default();
        let decision = policy.decide(ErrorKind::RateLimit, 1);
        assert_eq!(
            decision,
            RetryDecision::SwitchProvider {
                cause: SwitchCause::Immediate
            }
        );
        assert!(!SwitchCause::Immediate.excludes_provider());
    }

    #[test]
    fn test_authentication_rejects_provider() {
        let policy = RetryPolicy::default();
        let decision = policy.decide(ErrorKind::Authentication, 1);
        assert_eq!(
            decision,
            RetryDecision::SwitchProvider {
                cause: SwitchCause::Rejected
            }
        );
        assert!(SwitchCause::Rejected.excludes_provider());
    }

    #[test]
    fn test_unknown_always_fails() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.decide(ErrorKind::Unknown, 1),
            RetryDecision::Fail {
                reason: FailReason::Unclassified
            }
        );
        assert!(policy.strategy_for(ErrorKind::Unknown).is_none());
    }

    #[test]
    fn test_zero_budget_switches_on_first_failure() {
        let policy = RetryPolicy::new(RetryPolicyConfig {
            network: RetryStrategy::fixed(Duration::from_millis(10), 0),
            ..Default::default()
        });
        assert_eq!(
            policy.decide(ErrorKind::Network, 1),
            RetryDecision::SwitchProvider {
                cause: SwitchCause::BudgetExhausted
            }
        );
    }

    #[test]
    fn test_strategy_toml_shape() {
        let config: RetryPolicyConfig = toml::from_str(
            r#"
[network]
strategy = "linear_backoff"
base_delay_ms = 100
max_retries = 4

[authentication]
strategy = "immediate_fail"
"#,
        )
        .unwrap();
        assert_eq!(
            config.network,
            RetryStrategy::LinearBackoff {
                base_delay_ms: 100,
                max_retries: 4
            }
        );
        assert_eq!(config.server, default_server());
        assert_eq!(config.authentication, RetryStrategy::ImmediateFail);
    }
}
