//! Provider adapter seam
//!
//! The orchestrator never spawns processes or opens sockets itself. It hands
//! a provider, a concrete model and the task payload to a [`ProviderAdapter`]
//! and gets back a status/output/diagnostic triple.
//!
//! ## Contract
//!
//! ```text
//! invoke(provider, model, payload, timeout)
//!   → Ok(response)   status == 0 → success, anything else is classified
//!   → Err(AdapterError)          nothing was produced; classified from the message
//! ```
//!
//! The harness also wraps every call in its own timeout, so an adapter that
//! ignores `timeout` still cannot hang a request.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AdapterError;
use crate::registry::ProviderSpec;

/// Opaque task input. The harness never inspects the prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPayload {
    pub prompt: String,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Caller-defined key/value pairs passed through to the adapter
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl TaskPayload {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// What a provider produced for one attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// Exit code or HTTP status; 0 means success
    pub status: i32,
    pub output: String,
    /// stderr or error body
    pub diagnostic: String,
    pub duration: Duration,
}

impl ProviderResponse {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            status: 0,
            output: output.into(),
            ..Default::default()
        }
    }

    pub fn failure(status: i32, diagnostic: impl Into<String>) -> Self {
        Self {
            status,
            diagnostic: diagnostic.into(),
            ..Default::default()
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == 0
    }
}

/// Invokes one provider/model with a task payload.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    async fn invoke(
        &self,
        provider: &ProviderSpec,
        model: &str,
        payload: &TaskPayload,
        timeout: Duration,
    ) -> Result<ProviderResponse, AdapterError>;
}

/// Shared reference to an adapter
pub type SharedAdapter = Arc<dyn ProviderAdapter>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_builder() {
        let payload = TaskPayload::new("fix the bug")
            .with_working_dir("/tmp/repo")
            .with_metadata("issue", "42");
        assert_eq!(payload.prompt, "fix the bug");
        assert_eq!(payload.working_dir, Some(PathBuf::from("/tmp/repo")));
        assert_eq!(payload.metadata.get("issue").map(String::as_str), Some("42"));
    }

    #[test]
    fn test_response_status() {
        assert!(ProviderResponse::success("ok").is_success());
        let failed = ProviderResponse::failure(429, "Too Many Requests");
        assert!(!failed.is_success());
        assert_eq!(failed.diagnostic, "Too Many Requests");
    }
}
