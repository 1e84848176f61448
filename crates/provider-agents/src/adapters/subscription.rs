//! Subscription-gated CLI providers.
//!
//! Same process contract as [`ProcessAdapter`], but the provider is only
//! usable while its subscription credential is present in the environment.
//! A missing credential is reported as a 401 so the harness drops the
//! provider for the rest of the request instead of retrying it.

use std::time::Duration;

use async_trait::async_trait;
use coordination::{AdapterError, ProviderAdapter, ProviderResponse, ProviderSpec, TaskPayload};
use tracing::warn;

use super::process::ProcessAdapter;

#[derive(Debug, Clone, Default)]
pub struct SubscriptionAdapter {
    process: ProcessAdapter,
}

impl SubscriptionAdapter {
    pub fn new(process: ProcessAdapter) -> Self {
        Self { process }
    }
}

fn credential_present(var: &str) -> bool {
    std::env::var_os(var).is_some_and(|v| !v.is_empty())
}

#[async_trait]
impl ProviderAdapter for SubscriptionAdapter {
    async fn invoke(
        &self,
        provider: &ProviderSpec,
        model: &str,
        payload: &TaskPayload,
        timeout: Duration,
    ) -> Result<ProviderResponse, AdapterError> {
        if let Some(var) = &provider.subscription_env {
            if !credential_present(var) {
                warn!(provider = %provider.id, env = %var, "Subscription credential missing");
                return Ok(ProviderResponse::failure(
                    401,
                    format!("subscription not active: ${var} is not set"),
                ));
            }
        }
        self.process.invoke(provider, model, payload, timeout).await
    }
}
