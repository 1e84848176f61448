//! Capability tiers
//!
//! Tiers are totally ordered from cheapest to most capable. Escalation only
//! ever moves up this ladder; moving down is an explicit operator action.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Ordered capability/cost level used to bound which model families are eligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Small, fast, cheap models
    Mini,
    /// General-purpose models
    Standard,
    /// Models with extended reasoning
    Thinking,
    /// Frontier models
    Pro,
    /// Most capable (and most expensive) configuration
    Max,
}

impl Tier {
    /// All tiers in ascending order.
    pub fn all() -> &'static [Tier] {
        &[
            Tier::Mini,
            Tier::Standard,
            Tier::Thinking,
            Tier::Pro,
            Tier::Max,
        ]
    }

    /// The tier directly above this one, if any.
    pub fn next(&self) -> Option<Tier> {
        match self {
            Self::Mini => Some(Self::Standard),
            Self::Standard => Some(Self::Thinking),
            Self::Thinking => Some(Self::Pro),
            Self::Pro => Some(Self::Max),
            Self::Max => None,
        }
    }

    /// Tiers strictly above this one, ascending.
    pub fn above(&self) -> impl Iterator<Item = Tier> + '_ {
        Tier::all().iter().copied().filter(move |t| t > self)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mini => "mini",
            Self::Standard => "standard",
            Self::Thinking => "thinking",
            Self::Pro => "pro",
            Self::Max => "max",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mini" => Ok(Self::Mini),
            "standard" => Ok(Self::Standard),
            "thinking" => Ok(Self::Thinking),
            "pro" => Ok(Self::Pro),
            "max" => Ok(Self::Max),
            other => Err(format!("unknown tier '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_total_order() {
        assert!(Tier::Mini < Tier::Standard);
        assert!(Tier::Standard < Tier::Thinking);
        assert!(Tier::Thinking < Tier::Pro);
        assert!(Tier::Pro < Tier::Max);
    }

    #[test]
    fn test_tier_next() {
        assert_eq!(Tier::Standard.next(), Some(Tier::Thinking));
        assert_eq!(Tier::Max.next(), None);
    }

    #[test]
    fn test_tier_above() {
        let above: Vec<Tier> = Tier::Thinking.above().collect();
        assert_eq!(above, vec![Tier::Pro, Tier::Max]);
        assert_eq!(Tier::Max.above().count(), 0);
    }

    #[test]
    fn test_tier_parse_and_display() {
        for tier in Tier::all() {
            assert_eq!(tier.to_string().parse::<Tier>().unwrap(), *tier);
        }
        assert_eq!(" PRO ".parse::<Tier>().unwrap(), Tier::Pro);
        assert!("ultra".parse::<Tier>().is_err());
    }
}
