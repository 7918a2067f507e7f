//! 错误恢复引擎
//!
//! 把一次失败的规划调用映射为 RecoveryAction：配置错误终止运行，其余（传输失败、响应格式错误）回退到贪心分配。

use crate::core::RecoveryAction;
use crate::llm::LlmError;
use crate::planner::{CallFailure, FailureKind};

#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, failure: &CallFailure) -> RecoveryAction {
        match &failure.kind {
            FailureKind::Transport(e @ LlmError::Config(_)) => RecoveryAction::Abort(e.clone()),
            FailureKind::Transport(_) | FailureKind::Parse(_) => RecoveryAction::FallbackToGreedy,
        }
    }
}
