//! 审计日志与运行摘要持久化
//!
//! FileAuditSink 每次都把完整审计日志写成一个 JSON 数组；所有写入都先写临时文件再 rename，
//! 保证文件要么是旧内容要么是新内容。RunSummary 在运行结束时写一次。

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::llm::TokenUsage;
use crate::memory::ConversationTurn;
use crate::planner::{ReplanReason, ResponseAnalysis};

/// 审计日志落盘接口（由外部提供存储）
pub trait AuditSink: Send {
    fn flush(&mut self, turns: &[ConversationTurn]) -> anyhow::Result<()>;
}

/// 原子写 JSON：写入同目录的 .tmp 文件再 rename；父目录不存在时自动创建
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, serde_json::to_string_pretty(value)?)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// 单文件 JSON 审计日志
#[derive(Debug)]
pub struct FileAuditSink {
    path: PathBuf,
}

impl FileAuditSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for FileAuditSink {
    fn flush(&mut self, turns: &[ConversationTurn]) -> anyhow::Result<()> {
        write_json_atomic(&self.path, turns)?;
        tracing::debug!(turns = turns.len(), path = %self.path.display(), "Conversation log flushed");
        Ok(())
    }
}

/// 运行摘要中的仿真信息
#[derive(Debug, Clone, Serialize)]
pub struct SimulationInfo {
    pub run_id: uuid::Uuid,
    pub model_name: String,
    pub provider: String,
    pub use_vision: bool,
    pub use_llm: bool,
    pub n_drones: usize,
    pub n_targets: usize,
    pub llm_replan_interval: u64,
    pub collision_llm_interval: u64,
    pub min_distance: f64,
    pub target_threshold: f64,
}

/// 规划调用统计
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ConversationStats {
    pub total_interactions: usize,
    pub successful_responses: usize,
    pub failed_responses: usize,
    pub vision_enabled_calls: usize,
    pub collision_triggered_calls: usize,
    pub scheduled_calls: usize,
    pub expired_calls: usize,
    pub no_plan_calls: usize,
    /// 回退到贪心分配的次数（= failed_responses）
    pub fallback_activations: usize,
    pub avg_response_time: f64,
    /// 规划服务累计 token 用量（后端不上报时为 0）
    pub token_usage: TokenUsage,
}

impl ConversationStats {
    pub fn from_turns(turns: &[ConversationTurn]) -> Self {
        let count = |reason: ReplanReason| turns.iter().filter(|t| t.llm_call_reason == reason).count();
        let successful = turns.iter().filter(|t| t.success).count();
        let failed = turns.len() - successful;
        let avg_response_time = if turns.is_empty() {
            0.0
        } else {
            turns.iter().map(|t| t.response_time_seconds).sum::<f64>() / turns.len() as f64
        };
        Self {
            total_interactions: turns.len(),
            successful_responses: successful,
            failed_responses: failed,
            vision_enabled_calls: turns.iter().filter(|t| t.has_image).count(),
            collision_triggered_calls: count(ReplanReason::Collision),
            scheduled_calls: count(ReplanReason::Scheduled),
            expired_calls: count(ReplanReason::Expired),
            no_plan_calls: count(ReplanReason::NoPlan),
            fallback_activations: failed,
            avg_response_time,
            token_usage: TokenUsage::default(),
        }
    }
}

/// tick 层面的统计
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct TickStats {
    pub total_steps: u64,
    pub targets_completed: usize,
    pub total_targets: usize,
    /// 检测到碰撞风险的 tick 数
    pub collision_count: u64,
    pub collision_triggered_calls: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEntry {
    pub step: u64,
    pub error: String,
    pub reason: ReplanReason,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuccessEntry {
    pub step: u64,
    pub reason: ReplanReason,
    pub analysis: Option<ResponseAnalysis>,
}

/// 运行结束时写出的摘要
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub simulation_info: SimulationInfo,
    pub conversation_stats: ConversationStats,
    pub tick_stats: TickStats,
    pub error_analysis: Vec<ErrorEntry>,
    pub successful_responses: Vec<SuccessEntry>,
}

impl RunSummary {
    pub fn build(info: SimulationInfo, turns: &[ConversationTurn], tick_stats: TickStats) -> Self {
        Self {
            simulation_info: info,
            conversation_stats: ConversationStats::from_turns(turns),
            tick_stats,
            error_analysis: turns
                .iter()
                .filter_map(|t| {
                    t.error_message.as_ref().map(|e| ErrorEntry {
                        step: t.step,
                        error: e.clone(),
                        reason: t.llm_call_reason,
                    })
                })
                .collect(),
            successful_responses: turns
                .iter()
                .filter(|t| t.success)
                .map(|t| SuccessEntry {
                    step: t.step,
                    reason: t.llm_call_reason,
                    analysis: t.response_analysis.clone(),
                })
                .collect(),
        }
    }

    pub fn with_token_usage(mut self, usage: TokenUsage) -> Self {
        self.conversation_stats.token_usage = usage;
        self
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        write_json_atomic(path, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::conversation::test_turn;

    #[test]
    fn test_file_sink_writes_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("conversation.json");
        let mut sink = FileAuditSink::new(&path);
        sink.flush(&[test_turn(0, true), test_turn(5, false)]).unwrap();

        let data = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&data).unwrap();
        let arr = value.as_array().unwrap();
        assert_eq!(arr.len(), 2);
        assert_eq!(arr[1]["step"], 5);
        assert_eq!(arr[1]["llm_call_reason"], "scheduled");
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_stats_from_turns() {
        let mut collision = test_turn(3, true);
        collision.llm_call_reason = ReplanReason::Collision;
        collision.response_time_seconds = 1.5;
        let turns = vec![test_turn(0, true), test_turn(5, false), collision];

        let stats = ConversationStats::from_turns(&turns);
        assert_eq!(stats.total_interactions, 3);
        assert_eq!(stats.successful_responses, 2);
        assert_eq!(stats.failed_responses, 1);
        assert_eq!(stats.fallback_activations, 1);
        assert_eq!(stats.collision_triggered_calls, 1);
        assert_eq!(stats.scheduled_calls, 2);
        assert!((stats.avg_response_time - (0.5 + 0.5 + 1.5) / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_stats() {
        let stats = ConversationStats::from_turns(&[]);
        assert_eq!(stats, ConversationStats::default());
    }

    #[test]
    fn test_summary_error_analysis() {
        let turns = vec![test_turn(0, true), test_turn(5, false)];
        let info = SimulationInfo {
            run_id: uuid::Uuid::new_v4(),
            model_name: "mock".into(),
            provider: "mock".into(),
            use_vision: false,
            use_llm: true,
            n_drones: 3,
            n_targets: 3,
            llm_replan_interval: 5,
            collision_llm_interval: 20,
            min_distance: 0.3,
            target_threshold: 0.1,
        };
        let summary = RunSummary::build(info, &turns, TickStats::default())
            .with_token_usage(TokenUsage::new(300, 120));
        assert_eq!(summary.error_analysis.len(), 1);
        assert_eq!(summary.error_analysis[0].step, 5);
        assert_eq!(summary.successful_responses.len(), 1);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");
        summary.save(&path).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["conversation_stats"]["failed_responses"], 1);
        assert_eq!(value["conversation_stats"]["token_usage"]["total_tokens"], 420);
    }
}
