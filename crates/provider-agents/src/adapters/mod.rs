//! Concrete [`ProviderAdapter`] implementations.
//!
//! | Kind           | Adapter                 | Transport                     |
//! |----------------|-------------------------|-------------------------------|
//! | `process`      | [`ProcessAdapter`]      | `tokio::process`, prompt on stdin |
//! | `api`          | [`HttpAdapter`]         | `reqwest`, chat completions   |
//! | `subscription` | [`SubscriptionAdapter`] | credential check, then process |
//!
//! [`RoutingAdapter`] picks one per call from the provider's kind and is what
//! the runner hands to the orchestrator.

pub mod http;
pub mod process;
pub mod subscription;

use std::time::Duration;

use async_trait::async_trait;
use coordination::{
    AdapterError, ProviderAdapter, ProviderKind, ProviderResponse, ProviderSpec, TaskPayload,
};

pub use http::HttpAdapter;
pub use process::ProcessAdapter;
pub use subscription::SubscriptionAdapter;

/// Dispatches on [`ProviderKind`].
#[derive(Debug, Clone)]
pub struct RoutingAdapter {
    process: ProcessAdapter,
    http: HttpAdapter,
    subscription: SubscriptionAdapter,
}

impl RoutingAdapter {
    pub fn new() -> Result<Self, AdapterError> {
        let process = ProcessAdapter::new();
        Ok(Self {
            subscription: SubscriptionAdapter::new(process.clone()),
            http: HttpAdapter::new()?,
            process,
        })
    }
}

#[async_trait]
impl ProviderAdapter for RoutingAdapter {
    async fn invoke(
        &self,
        provider: &ProviderSpec,
        model: &str,
        payload: &TaskPayload,
        timeout: Duration,
    ) -> Result<ProviderResponse, AdapterError> {
        match provider.kind {
            ProviderKind::Process => self.process.invoke(provider, model, payload, timeout).await,
            ProviderKind::Api => self.http.invoke(provider, model, payload, timeout).await,
            ProviderKind::Subscription => {
                self.subscription
                    .invoke(provider, model, payload, timeout)
                    .await
            }
        }
    }
}
