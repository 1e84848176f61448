//! Provider orchestration harness
//!
//! Routes tasks to unreliable AI providers (CLI processes, HTTP APIs,
//! subscription services) and keeps requests moving when they misbehave:
//!
//! - **Model registry**: versioned model names resolved to families and tiers
//! - **Error classification**: exit codes, HTTP statuses and diagnostic text
//!   mapped to a small set of error kinds
//! - **Retry policy**: per-kind backoff, provider switching or failure
//! - **Circuit breaker**: per-provider CLOSED / OPEN / HALF_OPEN health
//! - **Rate-limit tracking**: reset hints parsed into cooldowns
//! - **Thinking depth**: per-stream tier escalation on repeated failure or
//!   growing complexity
//! - **Orchestrator**: the state machine tying it all together behind
//!   [`Orchestrator::execute`]
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use coordination::{ExecutionRequest, HarnessConfig, Orchestrator, TaskPayload};
//! # async fn run(adapter: coordination::SharedAdapter) -> Result<(), Box<dyn std::error::Error>> {
//! let config = HarnessConfig::load("harness.toml")?;
//! let orchestrator = Orchestrator::new(&config, adapter)?;
//! let outcome = orchestrator
//!     .execute(ExecutionRequest::new(TaskPayload::new("fix the failing test")))
//!     .await;
//! println!("{}", outcome.terminal);
//! # Ok(())
//! # }
//! ```
//!
//! Process spawning and HTTP transport live in adapters outside this crate;
//! see [`ProviderAdapter`].

#![allow(clippy::uninlined_format_args)]

pub mod adapter;
pub mod clock;
pub mod config;
pub mod error;
pub mod escalation;
pub mod feedback;
pub mod orchestrator;
pub mod registry;
pub mod resilience;
pub mod router;
pub mod state;
pub mod tier;

// Re-export the entry points
pub use adapter::{ProviderAdapter, ProviderResponse, SharedAdapter, TaskPayload};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::HarnessConfig;
pub use error::{AdapterError, ConfigError, HarnessResult};
pub use orchestrator::{
    AttemptOutcome, AttemptRecord, ExecutionOutcome, ExecutionRequest, ExecutionState,
    ExhaustedReason, Orchestrator, TerminalState,
};
pub use tier::Tier;

// Re-export registry types
pub use registry::{
    Capability, ModelFamilySpec, ModelInfo, ModelRegistry, ProviderId, ProviderKind,
    ProviderRegistry, ProviderSpec,
};

// Re-export resilience types
pub use feedback::{ErrorClassifier, ErrorKind, RawOutcome};
pub use resilience::{FailReason, RetryDecision, RetryPolicy, RetryStrategy, SwitchCause};
pub use router::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, FallbackChains, RateLimitConfig,
    RateLimitTracker,
};
pub use state::{ProviderRuntimeState, ProviderStateStore, SharedProviderStateStore};

// Re-export escalation types
pub use escalation::{
    ComplexitySignals, EscalationConfig, EscalationReason, EscalationRecord, EscalationSignal,
    EscalationState, ThinkingDepthManager,
};
