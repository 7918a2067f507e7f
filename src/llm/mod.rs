//! LLM 层：客户端抽象、重试策略与实现（OpenAI 兼容 / Gemini / Mock）

pub mod gemini;
pub mod mock;
pub mod openai;
pub mod retry;
pub mod traits;

pub use gemini::{create_gemini_client, GEMINI_BASE_URL, GEMINI_PRO};
pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, DEFAULT_OPENAI_MODEL};
pub use retry::{RetryConfig, RetryOutcome, Retryable, MAX_RETRY_DELAY};
pub use traits::{LlmClient, LlmError, TokenUsage};
