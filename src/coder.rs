//! The coding façade: one (question, response) pair in, one validated
//! [`CodingResult`] out.
//!
//! `code_response` never returns an error. Transport failures, parse
//! failures, and hallucinated codes all resolve to a normally shaped result,
//! so the caller has a single rendering path.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cache::{SessionCache, DEFAULT_CAPACITY};
use crate::codeframe::Codeframe;
use crate::gateway::{ChatGateway, ChatRequest};
use crate::interpret::{interpret, CodingResult};
use crate::normalize::clean;
use crate::prompts::build_coding_prompt;

/// Per-call model configuration, passed in at construction. No process-wide
/// defaults are consulted at call time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoderConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for CoderConfig {
    fn default() -> Self {
        Self {
            model: "claude-3-opus-20240229".to_string(),
            max_tokens: 4000,
            temperature: 0.7,
        }
    }
}

/// One coding request. Ephemeral; constructed per call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodingRequest {
    pub question: String,
    pub response: String,
}

impl CodingRequest {
    pub fn new(question: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            response: response.into(),
        }
    }
}

/// One batch output row, pairing the input with its coding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItem {
    pub question: String,
    pub response: String,
    pub coding: CodingResult,
}

/// Codes consultation responses against a fixed codeframe via an LLM.
pub struct ConsultationCoder {
    gateway: Arc<dyn ChatGateway>,
    codeframe: Codeframe,
    config: CoderConfig,
    cache: SessionCache,
}

impl ConsultationCoder {
    pub fn new(gateway: Arc<dyn ChatGateway>, codeframe: Codeframe, config: CoderConfig) -> Self {
        Self::with_cache_capacity(gateway, codeframe, config, DEFAULT_CAPACITY)
    }

    pub fn with_cache_capacity(
        gateway: Arc<dyn ChatGateway>,
        codeframe: Codeframe,
        config: CoderConfig,
        cache_capacity: usize,
    ) -> Self {
        Self {
            gateway,
            codeframe,
            config,
            cache: SessionCache::new(cache_capacity),
        }
    }

    pub fn codeframe(&self) -> &Codeframe {
        &self.codeframe
    }

    /// Code a single response.
    ///
    /// Identical `(question, response)` pairs are served from the session
    /// cache without a new LLM round trip. Never returns an error: failures
    /// come back as a result with a populated `error` field.
    pub async fn code_response(&self, question: &str, response: &str) -> CodingResult {
        self.cache
            .get_or_compute(question, response, || self.code_uncached(question, response))
            .await
    }

    async fn code_uncached(&self, question: &str, response: &str) -> CodingResult {
        let cleaned = clean(response);
        let prompt = build_coding_prompt(question, &cleaned, &self.codeframe);

        let request = ChatRequest::new(&self.config.model, prompt.to_messages())
            .system(&prompt.system)
            .temperature(self.config.temperature)
            .max_tokens(self.config.max_tokens);

        match self.gateway.chat(request).await {
            Ok(reply) => interpret(&reply.content, &self.codeframe),
            Err(err) => {
                warn!(error = %err, code = err.code(), "LLM call failed");
                CodingResult::from_error(format!("LLM call failed ({}): {err}", err.code()))
            }
        }
    }

    /// Code a sequence of requests, strictly sequentially, preserving order.
    ///
    /// One LLM round trip per distinct pair; pairs already seen this session
    /// are served from the cache.
    pub async fn batch_code_responses(&self, items: &[CodingRequest]) -> Vec<BatchItem> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            let coding = self.code_response(&item.question, &item.response).await;
            out.push(BatchItem {
                question: item.question.clone(),
                response: item.response.clone(),
                coding,
            });
        }
        out
    }
}
