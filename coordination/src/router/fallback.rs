//! Per-tier fallback chains.
//!
//! Each tier maps to an ordered list of provider ids. Selection walks the
//! chain in order and takes the first admissible provider.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::registry::ProviderId;
use crate::tier::Tier;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FallbackChains {
    chains: BTreeMap<Tier, Vec<ProviderId>>,
}

impl FallbackChains {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set the chain for `tier`.
    pub fn with_chain(mut self, tier: Tier, providers: &[&str]) -> Self {
        self.chains
            .insert(tier, providers.iter().map(|p| p.to_string()).collect());
        self
    }

    /// Ordered providers for `tier` (empty if unconfigured).
    pub fn chain(&self, tier: Tier) -> &[ProviderId] {
        self.chains.get(&tier).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_chain(&self, tier: Tier) -> bool {
        self.chains.get(&tier).is_some_and(|c| !c.is_empty())
    }

    /// Lowest tier strictly above `tier`, at most `max_tier`, with a non-empty chain.
    pub fn next_configured_above(&self, tier: Tier, max_tier: Tier) -> Option<Tier> {
        tier.above()
            .take_while(|t| *t <= max_tier)
            .find(|t| self.has_chain(*t))
    }

    /// Configured tiers in ascending order with their chains.
    pub fn iter(&self) -> impl Iterator<Item = (Tier, &[ProviderId])> {
        self.chains.iter().map(|(t, c)| (*t, c.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.chains.values().all(Vec::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_lookup() {
        let chains = FallbackChains::new().with_chain(Tier::Standard, &["claude", "codex"]);
        assert_eq!(chains.chain(Tier::Standard), ["claude", "codex"]);
        assert!(chains.chain(Tier::Pro).is_empty());
        assert!(!chains.has_chain(Tier::Pro));
    }

    #[test]
    fn test_next_configured_skips_gaps() {
        let chains = FallbackChains::new()
            .with_chain(Tier::Standard, &["claude"])
            .with_chain(Tier::Pro, &["claude"]);
        assert_eq!(
            chains.next_configured_above(Tier::Standard, Tier::Max),
            Some(Tier::Pro)
        );
        assert_eq!(chains.next_configured_above(Tier::Standard, Tier::Thinking), None);
        assert_eq!(chains.next_configured_above(Tier::Pro, Tier::Max), None);
    }

    #[test]
    fn test_toml_table_shape() {
        let chains: FallbackChains = toml::from_str(
            r#"
standard = ["claude", "codex"]
pro = ["claude"]
"#,
        )
        .unwrap();
        let tiers: Vec<Tier> = chains.iter().map(|(t, _)| t).collect();
        assert_eq!(tiers, vec![Tier::Standard, Tier::Pro]);
    }
}
