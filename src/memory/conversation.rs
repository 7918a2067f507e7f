//! 规划对话记忆
//!
//! 每次调用规划服务（无论成功与否）产生一条 ConversationTurn，创建后不再修改。
//! 审计日志持有全部记录（不淘汰）；上下文窗口只保存最近 K 条记录的下标，供下一次请求拼接上下文。
//! 每条记录写入后立即 flush 到 AuditSink，崩溃时最多丢失正在进行的那一条。

use std::collections::VecDeque;
use std::path::PathBuf;

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::persistence::AuditSink;
use crate::planner::{Plan, ReplanReason, ResponseAnalysis};
use crate::swarm::CollisionPair;

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Assistant,
    System,
}

/// 图像附件（PNG 等编码后的字节）
#[derive(Clone, Debug, PartialEq)]
pub struct ImageAttachment {
    pub mime: String,
    pub data: Vec<u8>,
}

impl ImageAttachment {
    pub fn png(data: Vec<u8>) -> Self {
        Self {
            mime: "image/png".to_string(),
            data,
        }
    }

    /// data:{mime};base64,... 形式，直接作为 image_url 发送
    pub fn to_data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime,
            base64::engine::general_purpose::STANDARD.encode(&self.data)
        )
    }
}

/// 单条消息；仅 User 消息可能附带图像
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(skip)]
    pub image: Option<ImageAttachment>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            image: None,
        }
    }

    pub fn user_with_image(content: impl Into<String>, image: ImageAttachment) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            image: Some(image),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            image: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            image: None,
        }
    }
}

/// 一次规划调用的完整记录（审计日志中的一项）
#[derive(Clone, Debug, Serialize)]
pub struct ConversationTurn {
    pub step: u64,
    pub timestamp: DateTime<Utc>,
    pub llm_call_reason: ReplanReason,
    /// 发送给规划服务的状态快照（已转为纯 JSON）
    pub input_data: serde_json::Value,
    /// 解析成功的计划；失败为 null
    pub response: Option<Plan>,
    /// 模型原始输出（解析失败时便于排查）
    pub raw_output: Option<String>,
    pub has_image: bool,
    pub image_path: Option<PathBuf>,
    pub model_name: String,
    pub use_vision: bool,
    pub response_time_seconds: f64,
    /// 实际传输尝试次数（含重试）
    pub attempts: u32,
    pub success: bool,
    pub error_message: Option<String>,
    pub drone_count: usize,
    pub target_count: usize,
    pub collision_detected: bool,
    pub collision_pairs: Vec<CollisionPair>,
    pub response_analysis: Option<ResponseAnalysis>,
}

/// 对话历史：无界审计日志 + 有界上下文窗口（保存下标）
pub struct ConversationHistory {
    turns: Vec<ConversationTurn>,
    window: VecDeque<usize>,
    capacity: usize,
    sink: Option<Box<dyn AuditSink>>,
}

impl ConversationHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            turns: Vec::new(),
            window: VecDeque::with_capacity(capacity),
            capacity,
            sink: None,
        }
    }

    /// 每次 record 后把完整审计日志写入 sink
    pub fn with_sink(mut self, sink: Box<dyn AuditSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 追加一条记录；窗口超出容量时淘汰最旧的下标
    pub fn record(&mut self, turn: ConversationTurn) {
        let index = self.turns.len();
        self.turns.push(turn);
        self.window.push_back(index);
        while self.window.len() > self.capacity {
            self.window.pop_front();
        }
        if let Some(sink) = self.sink.as_mut() {
            if let Err(e) = sink.flush(&self.turns) {
                tracing::warn!(error = %e, "Failed to flush conversation log");
            }
        }
    }

    /// 按时间顺序返回上下文窗口内的记录
    pub fn context_window(&self) -> impl Iterator<Item = &ConversationTurn> + '_ {
        self.window.iter().map(move |&i| &self.turns[i])
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// 完整审计日志
    pub fn audit_log(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

impl std::fmt::Debug for ConversationHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationHistory")
            .field("turns", &self.turns.len())
            .field("window", &self.window)
            .field("capacity", &self.capacity)
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}

#[cfg(test)]
pub(crate) fn test_turn(step: u64, success: bool) -> ConversationTurn {
    ConversationTurn {
        step,
        timestamp: Utc::now(),
        llm_call_reason: ReplanReason::Scheduled,
        input_data: serde_json::json!({ "step": step }),
        response: None,
        raw_output: None,
        has_image: false,
        image_path: None,
        model_name: "mock".to_string(),
        use_vision: false,
        response_time_seconds: 0.5,
        attempts: 1,
        success,
        error_message: (!success).then(|| "boom".to_string()),
        drone_count: 3,
        target_count: 3,
        collision_detected: false,
        collision_pairs: Vec::new(),
        response_analysis: None,
    }
}
