//! Harness error types
//!
//! Configuration problems are caught at startup and reported as
//! [`ConfigError`]. Provider failures are *not* errors at this level: they are
//! classified into an `ErrorKind` and recorded in the attempt history.

use std::path::PathBuf;
use thiserror::Error;

use crate::tier::Tier;

/// Result type alias for harness setup operations
pub type HarnessResult<T> = Result<T, ConfigError>;

/// Errors raised while loading or validating harness configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for the expected schema
    #[error("Invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A model family was registered twice
    #[error("Duplicate model family: {family}")]
    DuplicateFamily { family: String },

    /// A version pattern failed to compile
    #[error("Invalid version pattern for family '{family}': {message}")]
    InvalidPattern { family: String, message: String },

    /// Two families' version patterns overlap
    #[error("Overlapping version patterns: '{family}' is matched by the pattern of '{shadowed_by}'")]
    OverlappingPatterns { family: String, shadowed_by: String },

    /// A provider was declared twice
    #[error("Duplicate provider: {provider}")]
    DuplicateProvider { provider: String },

    /// A fallback chain references a provider that is not declared
    #[error("Fallback chain for tier '{tier}' references unknown provider '{provider}'")]
    UnknownProvider { tier: Tier, provider: String },

    /// A required tier has no fallback chain
    #[error("Missing fallback chain for tier '{tier}'")]
    MissingChain { tier: Tier },

    /// A numeric or structural setting is out of range
    #[error("Configuration error: {message}")]
    Invalid { message: String },
}

impl ConfigError {
    /// Create a generic validation error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create a read error for a config path
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }
}

/// Transport-level failure raised by a `ProviderAdapter` before any
/// response was produced (spawn failure, connection refused, ...).
///
/// The orchestrator classifies these from their message text, so the
/// message should carry the underlying cause verbatim.
#[derive(Error, Debug)]
pub enum AdapterError {
    /// The provider process could not be started or supervised
    #[error("Failed to spawn provider process: {0}")]
    Spawn(#[from] std::io::Error),

    /// Network or protocol error talking to a direct API
    #[error("Transport error: {0}")]
    Transport(String),

    /// The provider is misconfigured for this adapter
    #[error("Adapter misconfigured: {0}")]
    Misconfigured(String),
}
