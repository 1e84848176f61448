//! Feedback Module
//!
//! Turns raw provider outcomes into the single failure kind that drives
//! retry, circuit-breaker and escalation decisions.

pub mod error_classifier;

pub use error_classifier::{ErrorClassifier, ErrorKind, RawOutcome, Signature};
