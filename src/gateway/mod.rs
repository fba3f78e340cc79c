//! Provider gateway for Anthropic chat completions.
//!
//! The gateway is the only I/O boundary in the crate: one outbound HTTP call
//! per coding request, bounded by the client timeout. Transient failures are
//! retried with exponential backoff; permanent ones surface immediately.

pub mod anthropic;
pub mod error;
pub mod types;

use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

use anthropic::{AnthropicAdapter, ChatProvider};

pub use error::{ErrorContext, ProviderError};
pub use types::*;

#[async_trait::async_trait]
pub trait ChatGateway: Send + Sync {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError>;
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_base_delay: Duration::from_secs(1),
        }
    }
}

pub struct ProviderGateway {
    adapter: AnthropicAdapter,
    config: GatewayConfig,
}

#[async_trait::async_trait]
impl ChatGateway for ProviderGateway {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError> {
        ProviderGateway::chat(self, req).await
    }
}

impl ProviderGateway {
    pub fn from_env() -> Result<Self, ProviderError> {
        let adapter = AnthropicAdapter::from_env()?;
        Ok(Self {
            adapter,
            config: GatewayConfig::default(),
        })
    }

    pub fn with_config(adapter: AnthropicAdapter, config: GatewayConfig) -> Self {
        Self { adapter, config }
    }

    pub async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let mut last_error: Option<ProviderError> = None;

        for attempt in 0..=self.config.max_retries {
            match self.adapter.chat(&req).await {
                Ok(resp) => return Ok(resp),
                Err(err) => {
                    if !err.is_retryable() || attempt == self.config.max_retries {
                        return Err(err);
                    }

                    let delay = backoff_delay(self.config.retry_base_delay, attempt);
                    warn!(error = %err, code = err.code(), attempt, "provider call failed; retrying");
                    last_error = Some(err);
                    sleep(delay).await;
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| ProviderError::provider("anthropic", "unknown error", false)))
    }
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let multiplier = 2u64.pow(attempt.min(5));
    base * multiplier as u32
}
