//! LLM 客户端抽象
//!
//! 所有后端（OpenAI / Gemini 兼容端点 / Mock）实现 LlmClient::complete（非流式）。
//! LlmError 区分可重试的传输类错误与不可重试的配置错误（如缺少 API Key）。

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::llm::retry::Retryable;
use crate::memory::Message;

/// LLM 传输层错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    /// 配置错误（缺少凭据、模型不支持等），致命，不重试
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timeout after {0}s")]
    Timeout(u64),

    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Empty response from model")]
    EmptyResponse,
}

impl LlmError {
    pub fn is_config(&self) -> bool {
        matches!(self, LlmError::Config(_))
    }
}

impl Retryable for LlmError {
    fn is_retryable(&self) -> bool {
        !self.is_config()
    }
}

/// 累计 token 使用（写入运行摘要）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成，返回首个 choice 的文本
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;

    /// 模型名（写入审计日志）
    fn model(&self) -> &str;

    /// 累计 token 使用；不上报用量的后端返回全 0
    fn token_usage(&self) -> TokenUsage {
        TokenUsage::default()
    }
}
