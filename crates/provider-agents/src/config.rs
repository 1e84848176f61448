//! Harness configuration loading for the runner.
//!
//! The file format is owned by [`coordination::HarnessConfig`]; this module
//! finds the file and layers `HARNESS_*` environment overrides on top:
//!
//! | Variable                     | Field                   |
//! |------------------------------|-------------------------|
//! | `HARNESS_CONFIG`             | config path             |
//! | `HARNESS_MAX_TIER`           | `max_tier`              |
//! | `HARNESS_MAX_ATTEMPTS`       | `max_total_attempts`    |
//! | `HARNESS_WORKER_POOL_SIZE`   | `worker_pool_size`      |
//! | `HARNESS_ALLOW_SWITCH`       | `allow_provider_switch` |

use anyhow::{bail, Context, Result};
use coordination::{HarnessConfig, Tier};
use std::path::{Path, PathBuf};
use tracing::info;

/// Config path used when neither `--config` nor `HARNESS_CONFIG` is set.
pub const DEFAULT_CONFIG_PATH: &str = "harness.toml";

/// Resolve the config path: explicit argument, then `HARNESS_CONFIG`, then the default.
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os("HARNESS_CONFIG").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Load the config file, apply process environment overrides, validate.
pub fn load(explicit: Option<&Path>) -> Result<HarnessConfig> {
    let path = config_path(explicit);
    let mut config = HarnessConfig::load(&path)
        .with_context(|| format!("Failed to load harness config from {}", path.display()))?;
    apply_overrides(&mut config, |key| std::env::var(key).ok())?;
    config
        .validate()
        .context("Harness config invalid after environment overrides")?;
    Ok(config)
}

/// Apply `HARNESS_*` overrides read through `lookup`.
///
/// Empty values are ignored. Unparseable values are an error rather than
/// being silently dropped.
pub fn apply_overrides(
    config: &mut HarnessConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(value) = get("HARNESS_MAX_TIER") {
        config.max_tier = value
            .parse::<Tier>()
            .map_err(anyhow::Error::msg)
            .context("HARNESS_MAX_TIER")?;
        info!(max_tier = %config.max_tier, "Override from environment");
    }
    if let Some(value) = get("HARNESS_MAX_ATTEMPTS") {
        config.max_total_attempts = value
            .trim()
            .parse()
            .with_context(|| format!("HARNESS_MAX_ATTEMPTS={value}"))?;
        info!(max_total_attempts = config.max_total_attempts, "Override from environment");
    }
    if let Some(value) = get("HARNESS_WORKER_POOL_SIZE") {
        config.worker_pool_size = value
            .trim()
            .parse()
            .with_context(|| format!("HARNESS_WORKER_POOL_SIZE={value}"))?;
        info!(worker_pool_size = config.worker_pool_size, "Override from environment");
    }
    if let Some(value) = get("HARNESS_ALLOW_SWITCH") {
        config.allow_provider_switch = parse_bool(&value)
            .with_context(|| format!("HARNESS_ALLOW_SWITCH={value}"))?;
        info!(
            allow_provider_switch = config.allow_provider_switch,
            "Override from environment"
        );
    }
    Ok(())
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("expected a boolean, got '{other}'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_overrides_applied() {
        let mut config = HarnessConfig::default();
        apply_overrides(
            &mut config,
            env(&[
                ("HARNESS_MAX_TIER", "thinking"),
                ("HARNESS_MAX_ATTEMPTS", "4"),
                ("HARNESS_WORKER_POOL_SIZE", "16"),
                ("HARNESS_ALLOW_SWITCH", "off"),
            ]),
        )
        .unwrap();
        assert_eq!(config.max_tier, Tier::Thinking);
        assert_eq!(config.max_total_attempts, 4);
        assert_eq!(config.worker_pool_size, 16);
        assert!(!config.allow_provider_switch);
    }

    #[test]
    fn test_empty_values_ignored() {
        let mut config = HarnessConfig::default();
        apply_overrides(&mut config, env(&[("HARNESS_MAX_ATTEMPTS", "  ")])).unwrap();
        assert_eq!(config.max_total_attempts, 10);
    }

    #[test]
    fn test_bad_values_rejected() {
        let mut config = HarnessConfig::default();
        let err = apply_overrides(&mut config, env(&[("HARNESS_MAX_TIER", "ultra")])).unwrap_err();
        assert!(format!("{err:#}").contains("HARNESS_MAX_TIER"));

        let err =
            apply_overrides(&mut config, env(&[("HARNESS_ALLOW_SWITCH", "maybe")])).unwrap_err();
        assert!(format!("{err:#}").contains("expected a boolean"));
    }

    #[test]
    fn test_explicit_path_wins() {
        let path = config_path(Some(Path::new("/etc/harness/custom.toml")));
        assert_eq!(path, PathBuf::from("/etc/harness/custom.toml"));
    }
}
