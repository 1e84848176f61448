//! Provider Router Module
//!
//! Everything that decides whether a provider may take the next attempt:
//!
//! ```text
//! Check              | Source                | Clears when
//! -------------------|-----------------------|-----------------------------
//! Circuit OPEN       | CircuitBreaker        | timeout elapses (HALF_OPEN)
//! Cooling down       | RateLimitTracker      | hinted/default reset passes
//! Chain membership   | FallbackChains        | configuration only
//! ```

pub mod circuit_breaker;
pub mod fallback;
pub mod rate_limit;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState, CircuitTransition};
pub use fallback::FallbackChains;
pub use rate_limit::{RateLimitConfig, RateLimitTracker};
