//! Model registry matching and configuration loading from disk.

use std::collections::BTreeSet;

use coordination::{
    Capability, ConfigError, HarnessConfig, ModelFamilySpec, ModelRegistry, ProviderSpec,
    RetryStrategy, Tier,
};

#[test]
fn test_unseen_version_resolves_to_existing_family() {
    let registry = ModelRegistry::builtin();

    let (family, tier) = registry
        .classify_model_tier("claude-3-5-sonnet-20251111")
        .unwrap();
    assert_eq!(family, "claude-3-5-sonnet");
    assert_eq!(tier, Tier::Standard);
    assert_eq!(
        registry.match_to_family("claude-3-5-sonnet-20241022"),
        Some("claude-3-5-sonnet")
    );
}

#[test]
fn test_match_to_family_is_idempotent() {
    let registry = ModelRegistry::builtin();
    for info in registry.families() {
        let family = info.family.as_str();
        assert_eq!(registry.match_to_family(family), Some(family));
    }
}

#[test]
fn test_similar_names_do_not_collide() {
    let registry = ModelRegistry::builtin();
    assert_eq!(registry.match_to_family("gpt-4o-mini-2024-07-18"), Some("gpt-4o-mini"));
    assert_eq!(registry.match_to_family("gpt-4o-2024-08-06"), Some("gpt-4o"));
    assert_eq!(registry.match_to_family("claude-opus-4-20250514"), Some("claude-opus-4"));
    assert_eq!(registry.match_to_family("claude-opus-4-1-20250805"), Some("claude-opus-4-1"));
    assert_eq!(registry.match_to_family("llama-3-70b"), None);
}

#[test]
fn test_provider_model_selection_respects_capabilities() {
    let registry = ModelRegistry::builtin();
    let provider = ProviderSpec::api(
        "gemini",
        "https://example.invalid/v1",
        &["gemini-2.5-flash-preview", "gemini-2.5-pro-exp"],
    );

    let none = BTreeSet::new();
    let (model, _) = provider.model_for_tier(&registry, Tier::Standard, &none).unwrap();
    assert_eq!(model, "gemini-2.5-flash-preview");

    let reasoning: BTreeSet<_> = [Capability::Reasoning].into_iter().collect();
    assert!(provider
        .model_for_tier(&registry, Tier::Standard, &reasoning)
        .is_none());
    let (model, info) = provider
        .model_for_tier(&registry, Tier::Pro, &reasoning)
        .unwrap();
    assert_eq!(model, "gemini-2.5-pro-exp");
    assert_eq!(info.family, "gemini-2.5-pro");
}

#[test]
fn test_custom_family_registration() {
    let registry = ModelRegistry::from_specs([
        ModelFamilySpec::new("acme-coder", Tier::Standard),
        ModelFamilySpec::new("acme-coder-xl", Tier::Max),
    ])
    .unwrap();
    assert_eq!(
        registry.classify_model_tier("acme-coder-xl-latest"),
        Some(("acme-coder-xl", Tier::Max))
    );
    assert_eq!(registry.models_for_tier(Tier::Standard), vec!["acme-coder"]);

    let duplicate = ModelRegistry::from_specs([
        ModelFamilySpec::new("acme-coder", Tier::Standard),
        ModelFamilySpec::new("acme-coder", Tier::Pro),
    ]);
    assert!(matches!(duplicate, Err(ConfigError::DuplicateFamily { .. })));
}

const HARNESS_TOML: &str = r#"
max_tier = "pro"
max_total_attempts = 6

[circuit_breaker]
failure_threshold = 3
timeout_secs = 30

[escalation]
on_fail_attempts = 2

[retry.server]
strategy = "linear_backoff"
base_delay_ms = 250
max_retries = 4

[[providers]]
id = "claude"
kind = "process"
command = "claude -p --output-format text"
models = ["claude-3-5-sonnet-20241022", "claude-opus-4-20250514"]
timeout_secs = 300

[[providers]]
id = "openai"
kind = "api"
endpoint = "https://api.openai.com/v1"
api_key_env = "OPENAI_API_KEY"
models = ["gpt-4o-2024-08-06", "o3-2025-04-16"]

[chains]
standard = ["claude", "openai"]
pro = ["openai", "claude"]
"#;

#[test]
fn test_load_harness_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("harness.toml");
    std::fs::write(&path, HARNESS_TOML).unwrap();

    let config = HarnessConfig::load(&path).unwrap();
    assert_eq!(config.max_tier, Tier::Pro);
    assert_eq!(config.max_total_attempts, 6);
    assert_eq!(config.circuit_breaker.failure_threshold, 3);
    assert_eq!(config.circuit_breaker.success_threshold, 2);
    assert_eq!(
        config.retry.server,
        RetryStrategy::LinearBackoff {
            base_delay_ms: 250,
            max_retries: 4
        }
    );
    assert_eq!(config.chains.chain(Tier::Pro), ["openai", "claude"]);

    let providers = config.provider_registry().unwrap();
    assert_eq!(
        providers.get("claude").unwrap().timeout(),
        std::time::Duration::from_secs(300)
    );
}

#[test]
fn test_api_provider_requires_endpoint() {
    let text = HARNESS_TOML.replace("endpoint = \"https://api.openai.com/v1\"\n", "");
    let err = HarnessConfig::from_toml_str(&text).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { .. }));
}

#[test]
fn test_duplicate_provider_rejected() {
    let text = format!(
        "{HARNESS_TOML}\n[[providers]]\nid = \"claude\"\nkind = \"process\"\ncommand = \"claude\"\nmodels = [\"claude-3-5-haiku-20241022\"]\n"
    );
    let err = HarnessConfig::from_toml_str(&text).unwrap_err();
    assert!(matches!(err, ConfigError::DuplicateProvider { .. }));
}
