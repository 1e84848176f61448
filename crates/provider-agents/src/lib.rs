//! Provider adapters and runner support for the `coordination` harness.
//!
//! - [`adapters`]: process, HTTP and subscription adapters behind
//!   [`coordination::ProviderAdapter`], plus a kind-based router
//! - [`config`]: config file discovery and `HARNESS_*` overrides
//! - [`telemetry`]: tracing initialisation and the JSONL outcome log

pub mod adapters;
pub mod config;
pub mod telemetry;

pub use adapters::{HttpAdapter, ProcessAdapter, RoutingAdapter, SubscriptionAdapter};
