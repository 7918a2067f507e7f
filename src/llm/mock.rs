//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 按脚本依次返回预设结果；脚本耗尽后返回 ApiError。记录每次收到的消息便于断言。
//! 可设置每次成功响应计入的 token 数，用于验证用量汇总。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError, TokenUsage};
use crate::memory::Message;

/// 脚本化 Mock 客户端
#[derive(Debug, Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    requests: Mutex<Vec<Vec<Message>>>,
    calls: AtomicUsize,
    usage_per_call: (u64, u64),
    prompt_tokens: AtomicU64,
    completion_tokens: AtomicU64,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以给定结果序列构造
    pub fn scripted(responses: impl IntoIterator<Item = Result<String, LlmError>>) -> Self {
        Self {
            script: Mutex::new(responses.into_iter().collect()),
            ..Self::default()
        }
    }

    /// 每次成功响应计入 (prompt, completion) 个 token
    pub fn with_usage_per_call(mut self, prompt: u64, completion: u64) -> Self {
        self.usage_per_call = (prompt, completion);
        self
    }

    /// 追加一条成功响应
    pub fn push_ok(&self, text: impl Into<String>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Ok(text.into()));
        }
    }

    pub fn push_err(&self, err: LlmError) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Err(err));
        }
    }

    /// complete 被调用的次数（每次传输尝试计一次）
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 所有收到的消息列表（按调用顺序）
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    fn model(&self) -> &str {
        "mock"
    }

    fn token_usage(&self) -> TokenUsage {
        TokenUsage::new(
            self.prompt_tokens.load(Ordering::SeqCst),
            self.completion_tokens.load(Ordering::SeqCst),
        )
    }

    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(messages.to_vec());
        }
        let result = self
            .script
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or_else(|| Err(LlmError::ApiError("mock script exhausted".to_string())));
        if result.is_ok() {
            let (prompt, completion) = self.usage_per_call;
            self.prompt_tokens.fetch_add(prompt, Ordering::SeqCst);
            self.completion_tokens.fetch_add(completion, Ordering::SeqCst);
        }
        result
    }
}
