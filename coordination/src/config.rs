//! Harness configuration
//!
//! Parsed once from TOML and validated before the orchestrator is built.
//! Everything here is immutable afterwards.
//!
//! ```toml
//! max_tier = "pro"
//! allow_provider_switch = true
//! max_total_attempts = 10
//! worker_pool_size = 4
//!
//! [circuit_breaker]
//! failure_threshold = 5
//! success_threshold = 2
//! timeout_secs = 60
//!
//! [rate_limit]
//! default_cooldown_secs = 60
//!
//! [escalation]
//! on_fail_attempts = 3
//! initial_tier = "standard"
//!
//! [retry.server]
//! strategy = "exponential_backoff"
//! base_delay_ms = 2000
//! max_retries = 3
//!
//! [[providers]]
//! id = "claude"
//! kind = "process"
//! command = "claude -p"
//! models = ["claude-3-5-sonnet-20241022", "claude-opus-4-20250514"]
//!
//! [chains]
//! standard = ["claude", "openai"]
//! pro = ["claude"]
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ConfigError, HarnessResult};
use crate::escalation::EscalationConfig;
use crate::registry::{ModelFamilySpec, ModelRegistry, ProviderRegistry, ProviderSpec};
use crate::resilience::RetryPolicyConfig;
use crate::router::{CircuitBreakerConfig, FallbackChains, RateLimitConfig};
use crate::tier::Tier;

fn default_max_tier() -> Tier {
    Tier::Max
}

fn default_allow_provider_switch() -> bool {
    true
}

fn default_max_total_attempts() -> u32 {
    10
}

fn default_worker_pool_size() -> usize {
    4
}

/// Complete harness configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Escalation ceiling
    #[serde(default = "default_max_tier")]
    pub max_tier: Tier,
    /// Whether a failed provider may be replaced by the next one in the chain
    #[serde(default = "default_allow_provider_switch")]
    pub allow_provider_switch: bool,
    /// Hard cap on attempts per request, across all providers and tiers
    #[serde(default = "default_max_total_attempts")]
    pub max_total_attempts: u32,
    /// Concurrent adapter invocations across all streams
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub escalation: EscalationConfig,
    #[serde(default)]
    pub retry: RetryPolicyConfig,
    #[serde(default)]
    pub providers: Vec<ProviderSpec>,
    /// Model families; the builtin catalog is used when empty
    #[serde(default)]
    pub models: Vec<ModelFamilySpec>,
    #[serde(default)]
    pub chains: FallbackChains,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            max_tier: default_max_tier(),
            allow_provider_switch: default_allow_provider_switch(),
            max_total_attempts: default_max_total_attempts(),
            worker_pool_size: default_worker_pool_size(),
            circuit_breaker: CircuitBreakerConfig::default(),
            rate_limit: RateLimitConfig::default(),
            escalation: EscalationConfig::default(),
            retry: RetryPolicyConfig::default(),
            providers: Vec::new(),
            models: Vec::new(),
            chains: FallbackChains::default(),
        }
    }
}

impl HarnessConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> HarnessResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> HarnessResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::read(path, e))?;
        let config = Self::from_toml_str(&text)?;
        tracing::info!(
            path = %path.display(),
            providers = config.providers.len(),
            max_tier = %config.max_tier,
            "Loaded harness config"
        );
        Ok(config)
    }

    /// Model registry from `[[models]]`, or the builtin catalog.
    pub fn model_registry(&self) -> HarnessResult<ModelRegistry> {
        if self.models.is_empty() {
            Ok(ModelRegistry::builtin())
        } else {
            ModelRegistry::from_specs(self.models.iter().cloned())
        }
    }

    pub fn provider_registry(&self) -> HarnessResult<ProviderRegistry> {
        ProviderRegistry::new(self.providers.iter().cloned())
    }

    /// Tier new streams start at.
    pub fn initial_tier(&self) -> Tier {
        self.escalation.initial_tier.min(self.max_tier)
    }

    /// Check ranges and cross-references.
    pub fn validate(&self) -> HarnessResult<()> {
        if self.max_total_attempts == 0 {
            return Err(ConfigError::invalid("max_total_attempts must be > 0"));
        }
        if self.worker_pool_size == 0 {
            return Err(ConfigError::invalid("worker_pool_size must be > 0"));
        }
        if self.escalation.on_fail_attempts == 0 {
            return Err(ConfigError::invalid("escalation.on_fail_attempts must be > 0"));
        }
        if self.circuit_breaker.failure_threshold == 0 || self.circuit_breaker.success_threshold == 0
        {
            return Err(ConfigError::invalid(
                "circuit_breaker thresholds must be > 0",
            ));
        }
        if self.rate_limit.default_cooldown_secs > self.rate_limit.max_cooldown_secs {
            return Err(ConfigError::invalid(
                "rate_limit.default_cooldown_secs exceeds max_cooldown_secs",
            ));
        }

        let models = self.model_registry()?;
        let providers = self.provider_registry()?;

        for (tier, chain) in self.chains.iter() {
            for id in chain {
                let Some(provider) = providers.get(id) else {
                    return Err(ConfigError::UnknownProvider {
                        tier,
                        provider: id.clone(),
                    });
                };
                if !models.models_for_tier(tier).iter().any(|family| {
                    provider
                        .models
                        .iter()
                        .any(|m| models.match_to_family(m) == Some(*family))
                }) {
                    tracing::warn!(
                        provider = %id,
                        %tier,
                        "Provider in chain offers no model for this tier"
                    );
                }
            }
        }

        let initial = self.initial_tier();
        if !self.chains.has_chain(initial) {
            return Err(ConfigError::MissingChain { tier: initial });
        }

        Ok(())
    }
}
