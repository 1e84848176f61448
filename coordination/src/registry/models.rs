//! Model Registry: model family metadata and version matching
//!
//! Providers advertise concrete, versioned model identifiers
//! (`claude-3-5-sonnet-20241022`). The registry maps those to a
//! version-independent family that carries the capability tier, context
//! size, speed and cost.
//!
//! Matching is first-match-wins in registration order. Overlapping patterns
//! are rejected when the registry is built, so the order never has to break
//! a tie at runtime.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::error::{ConfigError, HarnessResult};
use crate::tier::Tier;

/// Optional features a model family supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Vision,
    ToolUse,
    Reasoning,
    LongContext,
}

/// Relative response speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speed {
    Fast,
    #[default]
    Medium,
    Slow,
}

/// Model family as declared in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelFamilySpec {
    /// Canonical, version-independent name
    pub family: String,
    pub tier: Tier,
    /// Regex matching versioned names; derived from `family` when absent
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    #[serde(default = "default_context_window")]
    pub context_window: u32,
    #[serde(default)]
    pub speed: Speed,
    /// USD per million tokens (blended)
    #[serde(default)]
    pub cost_per_mtok: f64,
}

fn default_context_window() -> u32 {
    128_000
}

impl ModelFamilySpec {
    pub fn new(family: impl Into<String>, tier: Tier) -> Self {
        Self {
            family: family.into(),
            tier,
            pattern: None,
            capabilities: Vec::new(),
            context_window: default_context_window(),
            speed: Speed::Medium,
            cost_per_mtok: 0.0,
        }
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn with_capabilities(mut self, caps: &[Capability]) -> Self {
        self.capabilities = caps.to_vec();
        self
    }

    pub fn with_profile(mut self, context_window: u32, speed: Speed, cost_per_mtok: f64) -> Self {
        self.context_window = context_window;
        self.speed = speed;
        self.cost_per_mtok = cost_per_mtok;
        self
    }
}

/// Resolved metadata for a model family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub family: String,
    pub tier: Tier,
    pub capabilities: BTreeSet<Capability>,
    pub context_window: u32,
    pub speed: Speed,
    pub cost_per_mtok: f64,
}

impl ModelInfo {
    /// Whether this family offers every capability in `required`.
    pub fn supports(&self, required: &BTreeSet<Capability>) -> bool {
        required.is_subset(&self.capabilities)
    }
}

/// Pattern accepting the canonical name followed by version suffixes
/// (`-20241022`, `-2024-10-22`, `-latest`, `-preview`, `-exp`, `-v2.1`).
pub fn default_version_pattern(family: &str) -> String {
    format!(
        r"(?i)^{}(?:[-@:.](?:\d{{8}}|\d{{4}}-\d{{2}}-\d{{2}}|latest|preview|exp|v\d+(?:\.\d+)*))*$",
        regex::escape(family)
    )
}

#[derive(Debug, Clone)]
struct RegisteredFamily {
    info: ModelInfo,
    pattern: Regex,
}

/// Registry of model families, in registration order.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    families: Vec<RegisteredFamily>,
    index: HashMap<String, usize>,
}

impl ModelRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from declared families, validating as it goes.
    pub fn from_specs(specs: impl IntoIterator<Item = ModelFamilySpec>) -> HarnessResult<Self> {
        let mut registry = Self::new();
        for spec in specs {
            registry.register(spec)?;
        }
        Ok(registry)
    }

    /// Register one family.
    ///
    /// Rejects duplicates, uncompilable patterns, patterns that miss their own
    /// canonical name, and patterns that overlap an already registered family.
    pub fn register(&mut self, spec: ModelFamilySpec) -> HarnessResult<()> {
        if self.index.contains_key(&spec.family) {
            return Err(ConfigError::DuplicateFamily {
                family: spec.family,
            });
        }

        let source = spec
            .pattern
            .clone()
            .unwrap_or_else(|| default_version_pattern(&spec.family));
        let pattern = Regex::new(&source).map_err(|e| ConfigError::InvalidPattern {
            family: spec.family.clone(),
            message: e.to_string(),
        })?;

        if !pattern.is_match(&spec.family) {
            return Err(ConfigError::InvalidPattern {
                family: spec.family.clone(),
                message: "pattern does not match its own canonical name".to_string(),
            });
        }

        for existing in &self.families {
            if existing.pattern.is_match(&spec.family) {
                return Err(ConfigError::OverlappingPatterns {
                    family: spec.family,
                    shadowed_by: existing.info.family.clone(),
                });
            }
            if pattern.is_match(&existing.info.family) {
                return Err(ConfigError::OverlappingPatterns {
                    family: existing.info.family.clone(),
                    shadowed_by: spec.family,
                });
            }
        }

        let info = ModelInfo {
            family: spec.family.clone(),
            tier: spec.tier,
            capabilities: spec.capabilities.into_iter().collect(),
            context_window: spec.context_window,
            speed: spec.speed,
            cost_per_mtok: spec.cost_per_mtok,
        };
        self.index.insert(spec.family, self.families.len());
        self.families.push(RegisteredFamily { info, pattern });
        Ok(())
    }

    /// Default catalog used when configuration declares no families.
    pub fn builtin() -> Self {
        use Capability::*;

        let specs = vec![
            ModelFamilySpec::new("claude-3-5-haiku", Tier::Mini)
                .with_capabilities(&[ToolUse])
                .with_profile(200_000, Speed::Fast, 0.8),
            ModelFamilySpec::new("claude-3-5-sonnet", Tier::Standard)
                .with_capabilities(&[Vision, ToolUse])
                .with_profile(200_000, Speed::Medium, 3.0),
            ModelFamilySpec::new("claude-3-7-sonnet", Tier::Thinking)
                .with_capabilities(&[Vision, ToolUse, Reasoning])
                .with_profile(200_000, Speed::Medium, 3.0),
            ModelFamilySpec::new("claude-sonnet-4", Tier::Thinking)
                .with_capabilities(&[Vision, ToolUse, Reasoning])
                .with_profile(200_000, Speed::Medium, 3.0),
            ModelFamilySpec::new("claude-opus-4", Tier::Pro)
                .with_capabilities(&[Vision, ToolUse, Reasoning])
                .with_profile(200_000, Speed::Slow, 15.0),
            ModelFamilySpec::new("claude-opus-4-1", Tier::Max)
                .with_capabilities(&[Vision, ToolUse, Reasoning])
                .with_profile(200_000, Speed::Slow, 15.0),
            ModelFamilySpec::new("gpt-4o-mini", Tier::Mini)
                .with_capabilities(&[Vision, ToolUse])
                .with_profile(128_000, Speed::Fast, 0.15),
            ModelFamilySpec::new("gpt-4o", Tier::Standard)
                .with_capabilities(&[Vision, ToolUse])
                .with_profile(128_000, Speed::Medium, 2.5),
            ModelFamilySpec::new("gpt-4.1", Tier::Standard)
                .with_capabilities(&[Vision, ToolUse, LongContext])
                .with_profile(1_000_000, Speed::Medium, 2.0),
            ModelFamilySpec::new("o3-mini", Tier::Thinking)
                .with_capabilities(&[ToolUse, Reasoning])
                .with_profile(200_000, Speed::Medium, 1.1),
            ModelFamilySpec::new("o3", Tier::Pro)
                .with_capabilities(&[Vision, ToolUse, Reasoning])
                .with_profile(200_000, Speed::Slow, 10.0),
            ModelFamilySpec::new("gemini-2.0-flash", Tier::Mini)
                .with_capabilities(&[Vision, ToolUse, LongContext])
                .with_profile(1_000_000, Speed::Fast, 0.1),
            ModelFamilySpec::new("gemini-2.5-flash", Tier::Standard)
                .with_capabilities(&[Vision, ToolUse, LongContext])
                .with_profile(1_000_000, Speed::Fast, 0.3),
            ModelFamilySpec::new("gemini-2.5-pro", Tier::Pro)
                .with_capabilities(&[Vision, ToolUse, Reasoning, LongContext])
                .with_profile(1_000_000, Speed::Medium, 1.25),
        ];

        let mut registry = Self::new();
        for spec in specs {
            // Builtin patterns are disjoint; skip rather than panic if that ever regresses.
            if let Err(e) = registry.register(spec) {
                tracing::error!(error = %e, "Builtin model family rejected");
            }
        }
        registry
    }

    /// Metadata for a canonical family name.
    pub fn get_model_info(&self, family: &str) -> Option<&ModelInfo> {
        self.index.get(family).map(|&i| &self.families[i].info)
    }

    /// Family names of the given tier, in registration order.
    pub fn models_for_tier(&self, tier: Tier) -> Vec<&str> {
        self.families
            .iter()
            .filter(|f| f.info.tier == tier)
            .map(|f| f.info.family.as_str())
            .collect()
    }

    /// Resolve a versioned provider-specific name to its family.
    ///
    /// A canonical name resolves to itself; otherwise the first family whose
    /// pattern matches wins.
    pub fn match_to_family(&self, versioned_name: &str) -> Option<&str> {
        if let Some(&i) = self.index.get(versioned_name) {
            return Some(self.families[i].info.family.as_str());
        }
        self.families
            .iter()
            .find(|f| f.pattern.is_match(versioned_name))
            .map(|f| f.info.family.as_str())
    }

    /// Resolve a versioned name straight to its family metadata.
    pub fn resolve(&self, versioned_name: &str) -> Option<&ModelInfo> {
        self.match_to_family(versioned_name)
            .and_then(|family| self.get_model_info(family))
    }

    /// Family and tier for a versioned name.
    pub fn classify_model_tier(&self, versioned_name: &str) -> Option<(&str, Tier)> {
        self.resolve(versioned_name)
            .map(|info| (info.family.as_str(), info.tier))
    }

    /// Number of registered families
    pub fn len(&self) -> usize {
        self.families.len()
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }

    /// All families in registration order
    pub fn families(&self) -> impl Iterator<Item = &ModelInfo> {
        self.families.iter().map(|f| &f.info)
    }
}
