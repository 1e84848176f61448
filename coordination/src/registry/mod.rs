//! Provider Registry: configured backends and the models they offer
//!
//! A provider is one external AI service (a CLI tool, a direct API, or a
//! subscription-gated CLI). The registry is an immutable snapshot built at
//! startup; runtime health lives in [`crate::state`], not here.

pub mod models;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::time::Duration;

use crate::error::{ConfigError, HarnessResult};
use crate::tier::Tier;

pub use models::{default_version_pattern, Capability, ModelFamilySpec, ModelInfo, ModelRegistry, Speed};

/// Provider identifier (e.g. `"claude"`, `"codex"`).
pub type ProviderId = String;

/// How a provider is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Direct HTTP API call
    Api,
    /// External CLI process spawned per attempt
    Process,
    /// External CLI gated on an active subscription login
    Subscription,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Api => write!(f, "api"),
            Self::Process => write!(f, "process"),
            Self::Subscription => write!(f, "subscription"),
        }
    }
}

fn default_timeout_secs() -> u64 {
    600
}

fn default_max_tokens() -> u32 {
    8_192
}

/// A configured provider. Immutable after load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSpec {
    pub id: ProviderId,
    pub kind: ProviderKind,
    /// Versioned model names, in the provider's preference order
    pub models: Vec<String>,
    /// Per-attempt timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Flags passed on every invocation
    #[serde(default)]
    pub default_flags: Vec<String>,
    /// Command line for process/subscription providers
    #[serde(default)]
    pub command: Option<String>,
    /// Base URL for API providers
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Environment variable whose presence proves an active subscription
    #[serde(default)]
    pub subscription_env: Option<String>,
}

impl ProviderSpec {
    /// Minimal process provider, mostly for tests.
    pub fn process(id: impl Into<String>, command: impl Into<String>, models: &[&str]) -> Self {
        Self {
            id: id.into(),
            kind: ProviderKind::Process,
            models: models.iter().map(|m| m.to_string()).collect(),
            timeout_secs: default_timeout_secs(),
            max_tokens: default_max_tokens(),
            default_flags: Vec::new(),
            command: Some(command.into()),
            endpoint: None,
            api_key_env: None,
            subscription_env: None,
        }
    }

    /// Minimal API provider.
    pub fn api(id: impl Into<String>, endpoint: impl Into<String>, models: &[&str]) -> Self {
        Self {
            kind: ProviderKind::Api,
            command: None,
            endpoint: Some(endpoint.into()),
            ..Self::process(id, "", models)
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// First offered model whose family has `tier` and all `required` capabilities.
    pub fn model_for_tier<'a>(
        &'a self,
        registry: &'a ModelRegistry,
        tier: Tier,
        required: &BTreeSet<Capability>,
    ) -> Option<(&'a str, &'a ModelInfo)> {
        self.models.iter().find_map(|name| {
            registry
                .resolve(name)
                .filter(|info| info.tier == tier && info.supports(required))
                .map(|info| (name.as_str(), info))
        })
    }

    /// Families this provider declares support for (unknown names skipped).
    pub fn families<'a>(&'a self, registry: &'a ModelRegistry) -> Vec<&'a str> {
        let mut out: Vec<&str> = Vec::new();
        for name in &self.models {
            if let Some(family) = registry.match_to_family(name) {
                if !out.contains(&family) {
                    out.push(family);
                }
            }
        }
        out
    }

    fn validate(&self) -> HarnessResult<()> {
        if self.id.trim().is_empty() {
            return Err(ConfigError::invalid("provider id must not be empty"));
        }
        if self.models.is_empty() {
            return Err(ConfigError::invalid(format!(
                "provider '{}' declares no models",
                self.id
            )));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::invalid(format!(
                "provider '{}' timeout_secs must be > 0",
                self.id
            )));
        }
        match self.kind {
            ProviderKind::Api if self.endpoint.is_none() => Err(ConfigError::invalid(format!(
                "api provider '{}' requires an endpoint",
                self.id
            ))),
            ProviderKind::Process | ProviderKind::Subscription
                if self.command.as_deref().map_or(true, |c| c.trim().is_empty()) =>
            {
                Err(ConfigError::invalid(format!(
                    "{} provider '{}' requires a command",
                    self.kind, self.id
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Registry of configured providers, preserving declaration order.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    entries: Vec<ProviderSpec>,
    index: HashMap<ProviderId, usize>,
}

impl ProviderRegistry {
    pub fn new(specs: impl IntoIterator<Item = ProviderSpec>) -> HarnessResult<Self> {
        let mut registry = Self::default();
        for spec in specs {
            spec.validate()?;
            if registry.index.contains_key(&spec.id) {
                return Err(ConfigError::DuplicateProvider { provider: spec.id });
            }
            registry.index.insert(spec.id.clone(), registry.entries.len());
            registry.entries.push(spec);
        }
        Ok(registry)
    }

    /// Get a provider by id
    pub fn get(&self, id: &str) -> Option<&ProviderSpec> {
        self.index.get(id).map(|&i| &self.entries[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// All providers in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &ProviderSpec> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
