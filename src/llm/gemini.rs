//! Gemini 客户端（走 Google 提供的 OpenAI 兼容端点）
//!
//! - Base URL: https://generativelanguage.googleapis.com/v1beta/openai/
//! - 凭据: 环境变量 `GOOGLE_API_KEY`

use std::time::Duration;

use crate::llm::openai::read_api_key;
use crate::llm::{LlmError, OpenAiClient};

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai/";
pub const GEMINI_API_KEY_ENV: &str = "GOOGLE_API_KEY";
pub const GEMINI_PRO: &str = "gemini-2.5-pro";

/// 创建 Gemini 客户端；缺少 GOOGLE_API_KEY 时返回配置错误
pub fn create_gemini_client(
    model: Option<&str>,
    base_url: Option<&str>,
    request_timeout: Duration,
) -> Result<OpenAiClient, LlmError> {
    let api_key = read_api_key(GEMINI_API_KEY_ENV)?;
    let model = model.unwrap_or(GEMINI_PRO);
    OpenAiClient::new(
        Some(base_url.unwrap_or(GEMINI_BASE_URL)),
        model,
        &api_key,
        request_timeout,
    )
}
