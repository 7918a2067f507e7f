//! 控制器错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：规划调用失败时决定回退到贪心分配还是终止运行。

use thiserror::Error;

use crate::llm::LlmError;

/// 控制环运行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum SwarmError {
    #[error("Config error: {0}")]
    Config(String),

    /// 规划服务的致命错误（如缺少凭据）；普通调用失败不会走到这里
    #[error("Advisory error: {0}")]
    Advisory(#[from] LlmError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Simulation error: {0}")]
    Simulation(String),

    #[error("Invalid scenario: {0}")]
    InvalidScenario(String),
}

/// 恢复引擎根据失败类型给出的动作
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryAction {
    /// 丢弃当前计划，立即重新计算贪心分配
    FallbackToGreedy,
    /// 携带致命的传输层错误终止运行
    Abort(LlmError),
}
