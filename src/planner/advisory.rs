//! 规划服务客户端
//!
//! 把控制器状态转成纯 JSON 请求，拼接上下文窗口与可选图像，按 RetryConfig 调用 LlmClient，
//! 解析响应为 Plan。每次调用（无论成败）恰好向 ConversationHistory 追加一条记录。
//! 调用结果总是 Plan 或 CallFailure；是否终止运行由上层的 RecoveryEngine 决定。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;

use crate::llm::{LlmClient, LlmError, RetryConfig, TokenUsage};
use crate::memory::{ConversationHistory, ConversationTurn, ImageAttachment};
use crate::planner::prompt::{build_messages, build_user_prompt};
use crate::planner::{parse_plan_response, Plan, PlanParseError, ReplanReason};
use crate::sim::AgentState;
use crate::swarm::{distance, Assignment, CollisionPair, Vec3};

/// 单架无人机的状态条目
#[derive(Debug, Clone, Serialize)]
pub struct DroneStateEntry {
    pub drone_id: usize,
    pub position: Vec3,
    pub velocity: Vec3,
    pub attitude: Vec3,
}

/// 单架无人机的完成情况；未分配时 distance_to_target 为 null
#[derive(Debug, Clone, Serialize)]
pub struct DroneProgress {
    pub drone_id: usize,
    pub assigned_target: i64,
    pub distance_to_target: Option<f64>,
    pub completed: bool,
}

/// 发送给规划服务的状态快照
#[derive(Debug, Clone, Serialize)]
pub struct AdvisoryRequest {
    pub step: u64,
    pub targets: Vec<Vec3>,
    /// 每个目标是否已被到达
    pub completed: Vec<bool>,
    pub drone_states: Vec<DroneStateEntry>,
    pub completed_drones: Vec<DroneProgress>,
    pub min_distance: f64,
    pub target_threshold: f64,
    pub n_drones: usize,
    pub collision_detected: bool,
    pub collision_pairs: Vec<CollisionPair>,
}

/// 组装请求所需的控制器状态
#[derive(Debug, Clone, Copy)]
pub struct AdvisorySnapshot<'a> {
    pub step: u64,
    pub agents: &'a [AgentState],
    pub targets: &'a [Vec3],
    pub target_completed: &'a [bool],
    pub assignment: &'a Assignment,
    pub agent_completed: &'a [bool],
    pub collisions: &'a [CollisionPair],
    pub min_distance: f64,
    pub target_threshold: f64,
}

impl AdvisorySnapshot<'_> {
    pub fn to_request(&self) -> AdvisoryRequest {
        let drone_states = self
            .agents
            .iter()
            .enumerate()
            .map(|(i, s)| DroneStateEntry {
                drone_id: i,
                position: s.position,
                velocity: s.velocity,
                attitude: s.attitude,
            })
            .collect();
        let completed_drones = self
            .agents
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let target = self
                    .assignment
                    .target_of(i)
                    .and_then(|t| self.targets.get(t));
                DroneProgress {
                    drone_id: i,
                    assigned_target: self.assignment.as_slice().get(i).copied().unwrap_or(-1),
                    distance_to_target: target.map(|t| distance(&s.position, t)),
                    completed: self.agent_completed.get(i).copied().unwrap_or(false),
                }
            })
            .collect();
        AdvisoryRequest {
            step: self.step,
            targets: self.targets.to_vec(),
            completed: self.target_completed.to_vec(),
            drone_states,
            completed_drones,
            min_distance: self.min_distance,
            target_threshold: self.target_threshold,
            n_drones: self.agents.len(),
            collision_detected: !self.collisions.is_empty(),
            collision_pairs: self.collisions.to_vec(),
        }
    }
}

/// 失败原因
#[derive(Debug, Clone, PartialEq)]
pub enum FailureKind {
    /// 传输层错误（重试耗尽或不可重试）
    Transport(LlmError),
    /// 传输成功但响应不可用
    Parse(PlanParseError),
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Transport(e) => write!(f, "{}", e),
            FailureKind::Parse(e) => write!(f, "{}", e),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallFailure {
    pub kind: FailureKind,
    pub raw_output: Option<String>,
    pub attempts: u32,
}

/// 一次规划调用的结果
#[derive(Debug, Clone, PartialEq)]
pub enum AdvisoryOutcome {
    Plan(Plan),
    Failure(CallFailure),
}

/// 规划服务客户端
pub struct AdvisoryClient {
    llm: Arc<dyn LlmClient>,
    retry: RetryConfig,
    system_prompt: String,
    /// 无历史时建议的 n_steps
    default_n_steps: u64,
    use_vision: bool,
}

impl AdvisoryClient {
    pub fn new(llm: Arc<dyn LlmClient>, retry: RetryConfig, system_prompt: impl Into<String>) -> Self {
        Self {
            llm,
            retry,
            system_prompt: system_prompt.into(),
            default_n_steps: 5,
            use_vision: false,
        }
    }

    pub fn with_default_n_steps(mut self, n: u64) -> Self {
        self.default_n_steps = n;
        self
    }

    pub fn with_vision(mut self, enabled: bool) -> Self {
        self.use_vision = enabled;
        self
    }

    pub fn use_vision(&self) -> bool {
        self.use_vision
    }

    pub fn model(&self) -> &str {
        self.llm.model()
    }

    /// 底层客户端累计的 token 用量
    pub fn token_usage(&self) -> TokenUsage {
        self.llm.token_usage()
    }

    /// 调用规划服务并把结果记入 history
    pub async fn request_plan(
        &self,
        reason: ReplanReason,
        request: &AdvisoryRequest,
        image: Option<ImageAttachment>,
        image_path: Option<PathBuf>,
        history: &mut ConversationHistory,
    ) -> AdvisoryOutcome {
        let input_data = serde_json::to_value(request).unwrap_or(serde_json::Value::Null);
        let image = if self.use_vision { image } else { None };
        let has_image = image.is_some();
        let user_prompt = build_user_prompt(request, self.default_n_steps);
        let messages = build_messages(
            &self.system_prompt,
            history.context_window(),
            user_prompt,
            image,
        );

        let started = Instant::now();
        let retried = self.retry.run(|_| self.llm.complete(&messages)).await;
        let latency = started.elapsed().as_secs_f64();
        let attempts = retried.attempts;

        let (outcome, raw_output) = match retried.result {
            Ok(text) => match parse_plan_response(&text) {
                Ok(plan) => (AdvisoryOutcome::Plan(plan), Some(text)),
                Err(e) => (
                    AdvisoryOutcome::Failure(CallFailure {
                        kind: FailureKind::Parse(e),
                        raw_output: Some(text.clone()),
                        attempts,
                    }),
                    Some(text),
                ),
            },
            Err(e) => (
                AdvisoryOutcome::Failure(CallFailure {
                    kind: FailureKind::Transport(e),
                    raw_output: None,
                    attempts,
                }),
                None,
            ),
        };

        match &outcome {
            AdvisoryOutcome::Plan(plan) => tracing::info!(
                step = request.step,
                reason = %reason,
                latency_secs = latency,
                attempts,
                assignments = plan.assignments.len(),
                waypoints = plan.waypoints.len(),
                n_steps = ?plan.n_steps,
                "Advisory call succeeded"
            ),
            AdvisoryOutcome::Failure(f) => tracing::warn!(
                step = request.step,
                reason = %reason,
                latency_secs = latency,
                attempts,
                error = %f.kind,
                raw_output = ?f.raw_output,
                "Advisory call failed"
            ),
        }

        let (response, error_message, response_analysis) = match &outcome {
            AdvisoryOutcome::Plan(plan) => (Some(plan.clone()), None, Some(plan.analysis())),
            AdvisoryOutcome::Failure(f) => (None, Some(f.kind.to_string()), None),
        };
        history.record(ConversationTurn {
            step: request.step,
            timestamp: Utc::now(),
            llm_call_reason: reason,
            input_data,
            success: response.is_some(),
            response,
            raw_output,
            has_image,
            image_path: if has_image { image_path } else { None },
            model_name: self.llm.model().to_string(),
            use_vision: self.use_vision,
            response_time_seconds: latency,
            attempts,
            error_message,
            drone_count: request.n_drones,
            target_count: request.targets.len(),
            collision_detected: request.collision_detected,
            collision_pairs: request.collision_pairs.clone(),
            response_analysis,
        });

        outcome
    }
}

impl std::fmt::Debug for AdvisoryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdvisoryClient")
            .field("model", &self.llm.model())
            .field("retry", &self.retry)
            .field("use_vision", &self.use_vision)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use std::time::Duration;

    const PLAN: &str = r#"{"assignments": [{"drone_id": 0, "target_id": 0}],
        "waypoints": [{"drone_id": 0, "waypoint": [1.0, 1.0, 0.5]}], "n_steps": 10, "reasoning": "go"}"#;

    fn fast_retry() -> RetryConfig {
        RetryConfig::new(3, Duration::from_millis(1), 2.0)
    }

    fn request() -> AdvisoryRequest {
        let agents = [AgentState::at([0.0, 0.0, 0.0]), AgentState::at([0.1, 0.0, 0.0])];
        let targets = [[1.0, 1.0, 0.5]];
        let assignment = Assignment::from_vec(vec![0, -1]);
        let collisions = [CollisionPair {
            drone_1: 0,
            drone_2: 1,
            distance: 0.1,
        }];
        AdvisorySnapshot {
            step: 3,
            agents: &agents,
            targets: &targets,
            target_completed: &[false],
            assignment: &assignment,
            agent_completed: &[false, false],
            collisions: &collisions,
            min_distance: 0.3,
            target_threshold: 0.1,
        }
        .to_request()
    }

    #[test]
    fn test_request_payload_is_plain_json() {
        let value = serde_json::to_value(request()).unwrap();
        assert_eq!(value["step"], 3);
        assert_eq!(value["n_drones"], 2);
        assert_eq!(value["collision_detected"], true);
        assert_eq!(value["collision_pairs"][0]["drone_2"], 1);
        assert_eq!(value["drone_states"][1]["position"][0], 0.1);
        assert!(value["completed_drones"][1]["distance_to_target"].is_null());
        assert_eq!(value["completed_drones"][1]["assigned_target"], -1);
        assert!(value["completed_drones"][0]["distance_to_target"].is_number());
    }

    #[tokio::test]
    async fn test_success_records_one_turn() {
        let mock = Arc::new(MockLlmClient::scripted(vec![Ok(format!("Plan:\n{}", PLAN))]));
        let client = AdvisoryClient::new(mock.clone(), fast_retry(), "sys");
        let mut history = ConversationHistory::new(5);

        let outcome = client
            .request_plan(ReplanReason::Collision, &request(), None, None, &mut history)
            .await;
        assert!(matches!(outcome, AdvisoryOutcome::Plan(ref p) if p.horizon() == Some(10)));
        assert_eq!(history.len(), 1);
        let turn = &history.audit_log()[0];
        assert!(turn.success);
        assert_eq!(turn.llm_call_reason, ReplanReason::Collision);
        assert!(turn.collision_detected);
        assert_eq!(turn.response_analysis.as_ref().unwrap().num_assignments, 1);
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let mock = Arc::new(MockLlmClient::scripted(vec![
            Err(LlmError::Network("reset".into())),
            Ok(PLAN.to_string()),
        ]));
        let client = AdvisoryClient::new(mock.clone(), fast_retry(), "sys");
        let mut history = ConversationHistory::new(5);
        let outcome = client
            .request_plan(ReplanReason::Scheduled, &request(), None, None, &mut history)
            .await;
        assert!(matches!(outcome, AdvisoryOutcome::Plan(_)));
        assert_eq!(mock.call_count(), 2);
        assert_eq!(history.len(), 1);
        assert_eq!(history.audit_log()[0].attempts, 2);
    }

    #[tokio::test]
    async fn test_exhausted_retries_is_failure() {
        let mock = Arc::new(MockLlmClient::new());
        let client = AdvisoryClient::new(mock.clone(), fast_retry(), "sys");
        let mut history = ConversationHistory::new(5);
        let outcome = client
            .request_plan(ReplanReason::Scheduled, &request(), None, None, &mut history)
            .await;
        match outcome {
            AdvisoryOutcome::Failure(f) => {
                assert_eq!(f.attempts, 3);
                assert!(matches!(f.kind, FailureKind::Transport(LlmError::ApiError(_))));
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(mock.call_count(), 3);
        assert_eq!(history.len(), 1);
        assert!(!history.audit_log()[0].success);
        assert!(history.audit_log()[0].error_message.is_some());
    }

    #[tokio::test]
    async fn test_prose_without_braces_is_failure() {
        let mock = Arc::new(MockLlmClient::scripted(vec![Ok("I cannot plan this.".to_string())]));
        let client = AdvisoryClient::new(mock.clone(), fast_retry(), "sys");
        let mut history = ConversationHistory::new(5);
        let outcome = client
            .request_plan(ReplanReason::NoPlan, &request(), None, None, &mut history)
            .await;
        match outcome {
            AdvisoryOutcome::Failure(f) => {
                assert_eq!(f.kind, FailureKind::Parse(PlanParseError::NoJsonObject));
                assert_eq!(f.raw_output.as_deref(), Some("I cannot plan this."));
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(mock.call_count(), 1);
        assert_eq!(
            history.audit_log()[0].raw_output.as_deref(),
            Some("I cannot plan this.")
        );
    }

    #[tokio::test]
    async fn test_config_error_not_retried() {
        let mock = Arc::new(MockLlmClient::scripted(vec![Err(LlmError::Config(
            "GOOGLE_API_KEY environment variable not set".into(),
        ))]));
        let client = AdvisoryClient::new(mock.clone(), fast_retry(), "sys");
        let mut history = ConversationHistory::new(5);
        let outcome = client
            .request_plan(ReplanReason::NoPlan, &request(), None, None, &mut history)
            .await;
        assert!(matches!(
            outcome,
            AdvisoryOutcome::Failure(CallFailure {
                kind: FailureKind::Transport(LlmError::Config(_)),
                attempts: 1,
                ..
            })
        ));
        assert_eq!(mock.call_count(), 1);
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_history_is_replayed_in_next_request() {
        let mock = Arc::new(MockLlmClient::scripted(vec![
            Ok("nope".to_string()),
            Ok(PLAN.to_string()),
        ]));
        let client = AdvisoryClient::new(mock.clone(), fast_retry(), "sys");
        let mut history = ConversationHistory::new(5);
        client
            .request_plan(ReplanReason::NoPlan, &request(), None, None, &mut history)
            .await;
        client
            .request_plan(ReplanReason::NoPlan, &request(), None, None, &mut history)
            .await;
        let requests = mock.requests();
        assert_eq!(requests[0].len(), 2);
        // system + 1 对历史 + 本次
        assert_eq!(requests[1].len(), 4);
    }

    #[tokio::test]
    async fn test_image_only_sent_with_vision() {
        let mock = Arc::new(MockLlmClient::scripted(vec![Ok(PLAN.to_string()), Ok(PLAN.to_string())]));
        let img = ImageAttachment::png(vec![1, 2, 3]);

        let client = AdvisoryClient::new(mock.clone(), fast_retry(), "sys");
        let mut history = ConversationHistory::new(5);
        client
            .request_plan(ReplanReason::Scheduled, &request(), Some(img.clone()), None, &mut history)
            .await;
        assert!(!history.audit_log()[0].has_image);

        let client = client.with_vision(true);
        client
            .request_plan(
                ReplanReason::Scheduled,
                &request(),
                Some(img),
                Some(PathBuf::from("pictures/snapshot_0003.png")),
                &mut history,
            )
            .await;
        assert!(history.audit_log()[1].has_image);
        assert!(mock.requests()[1].last().unwrap().image.is_some());
    }
}
