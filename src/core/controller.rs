//! 控制环：每个 tick 依次执行
//! 读取状态 → 更新完成标记 → 碰撞检测 → 重规划决策 → (调用规划服务 / 回退) → 解析航点 → 下发指令 → 记录 → 推进仿真。
//!
//! 单任务顺序执行；规划服务调用在 tick 内 await，期间整个编队停顿。
//! 取消只在 tick 边界生效：已开始的 tick 总会完整执行。

use std::path::PathBuf;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::core::snapshot::{AgentTickEntry, StateRecorder, TickRecord};
use crate::core::{ControllerState, RecoveryAction, RecoveryEngine, SwarmError};
use crate::llm::TokenUsage;
use crate::memory::{ConversationHistory, RunSummary, SimulationInfo, TickStats};
use crate::planner::{
    AdvisoryClient, AdvisoryOutcome, AdvisorySnapshot, ReplanReason,
};
use crate::sim::{AgentState, MotionController, Simulation};
use crate::swarm::{
    detect_collisions, distance, greedy_assign, resolve_waypoints, CollisionPair, ResolvedWaypoint,
    Vec3,
};

/// 控制环参数
#[derive(Debug, Clone)]
pub struct LoopParams {
    pub safety_margin: f64,
    pub target_threshold: f64,
    pub max_ticks: u64,
    pub use_vision: bool,
}

/// 输出位置；None 表示不落盘
#[derive(Debug, Clone, Default)]
pub struct OutputPaths {
    pub states_dir: Option<PathBuf>,
    pub pictures_dir: Option<PathBuf>,
    pub summary_file: Option<PathBuf>,
}

impl OutputPaths {
    /// 标准布局：states/、pictures/、summary.json
    pub fn under(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            states_dir: Some(root.join("states")),
            pictures_dir: Some(root.join("pictures")),
            summary_file: Some(root.join("summary.json")),
        }
    }
}

/// 单个 tick 的结果
#[derive(Debug, Clone)]
pub struct TickOutcome {
    pub tick: u64,
    pub reason: Option<ReplanReason>,
    pub collisions: Vec<CollisionPair>,
    pub collision_suppressed: bool,
    /// 本 tick 是否回退到贪心分配
    pub fallback: bool,
    pub waypoints: Vec<ResolvedWaypoint>,
}

/// 运行结束时的统计
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: uuid::Uuid,
    pub ticks: u64,
    pub targets_completed: usize,
    pub total_targets: usize,
    pub all_completed: bool,
    pub cancelled: bool,
    pub collision_count: u64,
    pub collision_calls: u64,
    pub advisory_calls: usize,
    pub fallbacks: u64,
    pub token_usage: TokenUsage,
}

/// 运行元信息（写入摘要）
#[derive(Debug, Clone, Default)]
pub struct RunMeta {
    pub provider: String,
    pub model: String,
}

pub struct ControlLoop<S: Simulation, M: MotionController> {
    sim: S,
    motion: M,
    targets: Vec<Vec3>,
    params: LoopParams,
    advisory: Option<AdvisoryClient>,
    history: ConversationHistory,
    state: ControllerState,
    recovery: RecoveryEngine,
    recorder: Option<StateRecorder>,
    outputs: OutputPaths,
    meta: RunMeta,
    run_id: uuid::Uuid,
    cancel: CancellationToken,
}

impl<S: Simulation, M: MotionController> ControlLoop<S, M> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sim: S,
        motion: M,
        targets: Vec<Vec3>,
        params: LoopParams,
        state: ControllerState,
        advisory: Option<AdvisoryClient>,
        history: ConversationHistory,
        outputs: OutputPaths,
        meta: RunMeta,
        cancel: CancellationToken,
    ) -> Self {
        let recorder = outputs.states_dir.as_ref().map(StateRecorder::new);
        Self {
            sim,
            motion,
            targets,
            params,
            advisory,
            history,
            state,
            recovery: RecoveryEngine::new(),
            recorder,
            outputs,
            meta,
            run_id: uuid::Uuid::new_v4(),
            cancel,
        }
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn sim(&self) -> &S {
        &self.sim
    }

    pub fn sim_mut(&mut self) -> &mut S {
        &mut self.sim
    }

    pub fn targets(&self) -> &[Vec3] {
        &self.targets
    }

    fn read_states(&self) -> Result<Vec<AgentState>, SwarmError> {
        (0..self.sim.agent_count())
            .map(|i| self.sim.agent_state(i))
            .collect()
    }

    /// 视觉模式下截图并保存为 pictures/snapshot_{tick:04}.png
    fn capture(&mut self, tick: u64) -> (Option<crate::memory::ImageAttachment>, Option<PathBuf>) {
        if !self.params.use_vision {
            return (None, None);
        }
        let Some(frame) = self.sim.capture_frame() else {
            return (None, None);
        };
        let path = self.outputs.pictures_dir.as_ref().and_then(|dir| {
            let path = dir.join(format!("snapshot_{:04}.png", tick));
            let written = std::fs::create_dir_all(dir).and_then(|_| std::fs::write(&path, &frame.data));
            match written {
                Ok(()) => Some(path),
                Err(e) => {
                    tracing::warn!(tick, error = %e, "Failed to save snapshot");
                    None
                }
            }
        });
        (Some(frame), path)
    }

    /// 执行一个完整 tick
    pub async fn tick(&mut self) -> Result<TickOutcome, SwarmError> {
        let tick = self.state.tick;
        let agents = self.read_states()?;
        let positions: Vec<Vec3> = agents.iter().map(|a| a.position).collect();
        let threshold = self.params.target_threshold;

        if !self.state.initialized {
            self.state.assignment = greedy_assign(&positions, &self.targets);
            self.state.initialized = true;
            tracing::info!(
                assignments = ?self.state.assignment.as_slice(),
                "Initial greedy assignment"
            );
        }

        self.state
            .update_target_completion(&positions, &self.targets, threshold);
        let (frame, frame_path) = self.capture(tick);

        let collisions = detect_collisions(&positions, self.params.safety_margin);
        let collision = !collisions.is_empty();
        if collision {
            self.state.collision_count += 1;
            tracing::warn!(tick, pairs = collisions.len(), "Collision risk detected");
        }

        let decision = self.state.policy.decide(tick, collision);
        if decision.collision_suppressed {
            tracing::debug!(
                tick,
                ticks_until_next = ?decision.ticks_until_collision_call,
                "Collision detected but inside cooldown, skipping collision call"
            );
        }

        let mut fallback = false;
        if let (Some(reason), Some(advisory)) = (decision.reason, self.advisory.as_ref()) {
            if reason == ReplanReason::Collision {
                self.state.collision_calls += 1;
            }
            self.state
                .update_agent_completion(&positions, &self.targets, threshold);
            let request = AdvisorySnapshot {
                step: tick,
                agents: &agents,
                targets: &self.targets,
                target_completed: &self.state.target_completed,
                assignment: &self.state.assignment,
                agent_completed: &self.state.agent_completed,
                collisions: &collisions,
                min_distance: self.params.safety_margin,
                target_threshold: threshold,
            }
            .to_request();
            tracing::info!(tick, reason = %reason, "Calling advisory service");

            let outcome = advisory
                .request_plan(reason, &request, frame, frame_path, &mut self.history)
                .await;
            match outcome {
                AdvisoryOutcome::Plan(plan) => {
                    self.state.apply_plan(plan, self.targets.len());
                }
                AdvisoryOutcome::Failure(failure) => match self.recovery.handle(&failure) {
                    RecoveryAction::Abort(e) => {
                        tracing::error!(tick, error = %e, "Fatal advisory error, aborting run");
                        return Err(SwarmError::Advisory(e));
                    }
                    RecoveryAction::FallbackToGreedy => {
                        self.state.fall_back(&positions, &self.targets);
                        fallback = true;
                        tracing::warn!(
                            tick,
                            reason = %reason,
                            assignments = ?self.state.assignment.as_slice(),
                            "Advisory call failed, falling back to greedy assignment"
                        );
                    }
                },
            }
        }

        self.state
            .update_agent_completion(&positions, &self.targets, threshold);
        let waypoints = resolve_waypoints(
            &positions,
            &self.targets,
            &self.state.assignment,
            self.state.plan.as_ref(),
            &self.state.agent_completed,
        );

        let mut entries = Vec::with_capacity(agents.len());
        for (i, (agent, wp)) in agents.iter().zip(&waypoints).enumerate() {
            let command = self.motion.command(i, agent, &wp.point);
            self.sim.apply_command(i, &command)?;
            entries.push(AgentTickEntry {
                drone_id: i,
                position: agent.position,
                velocity: agent.velocity,
                attitude: agent.attitude,
                target: wp.point,
                target_source: wp.source,
                actuators: command.actuators,
                drone_completed: self.state.agent_completed[i],
                distance_to_target: self
                    .state
                    .assignment
                    .target_of(i)
                    .and_then(|t| self.targets.get(t))
                    .map(|t| distance(&agent.position, t)),
            });
        }

        if let Some(recorder) = &self.recorder {
            let record = TickRecord {
                step: tick,
                targets: self.targets.clone(),
                completed: self.state.target_completed.clone(),
                drone_states: entries,
                plan: self.state.plan.clone(),
                assignments: self.state.assignment.clone(),
                collision_detected: collision,
                llm_call_reason: decision.reason.filter(|_| self.advisory.is_some()),
                policy_phase: self.state.phase(),
                ticks_remaining: self.state.policy.ticks_remaining(),
                collision_count: self.state.collision_count,
                collision_triggered_calls: self.state.collision_calls,
            };
            if let Err(e) = recorder.record(&record) {
                tracing::warn!(tick, error = %e, "Failed to write tick record");
            }
        }

        self.sim.step()?;
        self.state.policy.advance();
        self.state.tick += 1;

        Ok(TickOutcome {
            tick,
            reason: decision.reason.filter(|_| self.advisory.is_some()),
            collisions,
            collision_suppressed: decision.collision_suppressed,
            fallback,
            waypoints,
        })
    }

    /// 运行到所有目标完成、达到 tick 上限或收到取消信号；结束时写出摘要
    pub async fn run(&mut self) -> Result<RunReport, SwarmError> {
        self.run_with(|_| {}).await
    }

    /// 同 run，每个 tick 结束后回调 on_tick
    pub async fn run_with<F>(&mut self, mut on_tick: F) -> Result<RunReport, SwarmError>
    where
        F: FnMut(&TickOutcome),
    {
        tracing::info!(
            run_id = %self.run_id,
            n_drones = self.sim.agent_count(),
            n_targets = self.targets.len(),
            max_ticks = self.params.max_ticks,
            advisory = self.advisory.is_some(),
            "Control loop started"
        );
        let mut cancelled = false;
        while !self.state.all_targets_completed() && self.state.tick < self.params.max_ticks {
            if self.cancel.is_cancelled() {
                tracing::info!(tick = self.state.tick, "Cancellation requested, stopping");
                cancelled = true;
                break;
            }
            let outcome = self.tick().await?;
            on_tick(&outcome);
        }

        let report = self.report(cancelled);
        tracing::info!(
            ticks = report.ticks,
            targets_completed = report.targets_completed,
            total_targets = report.total_targets,
            advisory_calls = report.advisory_calls,
            fallbacks = report.fallbacks,
            total_tokens = report.token_usage.total_tokens,
            "Control loop finished"
        );
        self.write_summary();
        Ok(report)
    }

    pub fn report(&self, cancelled: bool) -> RunReport {
        RunReport {
            run_id: self.run_id,
            ticks: self.state.tick,
            targets_completed: self.state.targets_completed(),
            total_targets: self.targets.len(),
            all_completed: self.state.all_targets_completed(),
            cancelled,
            collision_count: self.state.collision_count,
            collision_calls: self.state.collision_calls,
            advisory_calls: self.history.len(),
            fallbacks: self.state.fallback_count,
            token_usage: self.token_usage(),
        }
    }

    fn token_usage(&self) -> TokenUsage {
        self.advisory
            .as_ref()
            .map(AdvisoryClient::token_usage)
            .unwrap_or_default()
    }

    pub fn summary(&self) -> RunSummary {
        let policy = &self.state.policy;
        let info = SimulationInfo {
            run_id: self.run_id,
            model_name: self.meta.model.clone(),
            provider: self.meta.provider.clone(),
            use_vision: self.params.use_vision,
            use_llm: self.advisory.is_some(),
            n_drones: self.sim.agent_count(),
            n_targets: self.targets.len(),
            llm_replan_interval: policy.replan_interval(),
            collision_llm_interval: policy.collision_interval(),
            min_distance: self.params.safety_margin,
            target_threshold: self.params.target_threshold,
        };
        let tick_stats = TickStats {
            total_steps: self.state.tick,
            targets_completed: self.state.targets_completed(),
            total_targets: self.targets.len(),
            collision_count: self.state.collision_count,
            collision_triggered_calls: self.state.collision_calls,
        };
        RunSummary::build(info, self.history.audit_log(), tick_stats)
            .with_token_usage(self.token_usage())
    }

    fn write_summary(&self) {
        let Some(path) = &self.outputs.summary_file else {
            return;
        };
        match self.summary().save(path) {
            Ok(()) => tracing::info!(path = %path.display(), "Run summary saved"),
            Err(e) => tracing::warn!(error = %e, "Failed to save run summary"),
        }
    }
}
