//! 记忆层：规划对话历史（上下文窗口 + 审计日志）与持久化

pub mod conversation;
pub mod persistence;

pub use conversation::{ConversationHistory, ConversationTurn, ImageAttachment, Message, Role};
pub use persistence::{
    write_json_atomic, AuditSink, ConversationStats, FileAuditSink, RunSummary, SimulationInfo,
    TickStats,
};
