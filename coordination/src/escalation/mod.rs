//! Escalation: tier management for task streams
//!
//! A task stream starts at the configured initial tier and only moves up.
//! Moving down is an explicit call, never a side effect.
//!
//! # Escalation Ladder
//!
//! ```text
//! current tier
//!     │
//!     ├─ failure (not rate limit)   → failures_at_tier += 1
//!     ├─ failures_at_tier >= on_fail_attempts
//!     │      ├─ higher configured tier <= max_tier → escalate, reset count
//!     │      └─ none                               → tier exhausted (request fails)
//!     ├─ files/modules threshold newly crossed → escalate one tier
//!     ▼
//! next configured tier
//! ```

pub mod engine;
pub mod state;

pub use engine::{EscalationConfig, EscalationSignal, ThinkingDepthManager};
pub use state::{ComplexitySignals, EscalationReason, EscalationRecord, EscalationState};
