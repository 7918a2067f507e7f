//! 控制器状态
//!
//! ControllerState 只由 ControlLoop 持有，只在 tick 内修改；不跨线程共享。

use crate::planner::{Plan, PolicyPhase, ReplanPolicy};
use crate::swarm::{distance, greedy_assign, Assignment, Vec3};

#[derive(Debug, Clone)]
pub struct ControllerState {
    pub tick: u64,
    pub assignment: Assignment,
    /// 当前生效的计划；调用失败时清空
    pub plan: Option<Plan>,
    /// ticks_remaining 与上次碰撞调用 tick 由策略维护
    pub policy: ReplanPolicy,
    pub agent_completed: Vec<bool>,
    /// 目标是否已被任意无人机到达（一旦为 true 不再回退）
    pub target_completed: Vec<bool>,
    /// 检测到碰撞风险的 tick 数
    pub collision_count: u64,
    pub collision_calls: u64,
    pub fallback_count: u64,
    pub initialized: bool,
}

impl ControllerState {
    pub fn new(n_agents: usize, n_targets: usize, policy: ReplanPolicy) -> Self {
        Self {
            tick: 0,
            assignment: Assignment::unassigned(n_agents),
            plan: None,
            policy,
            agent_completed: vec![false; n_agents],
            target_completed: vec![false; n_targets],
            collision_count: 0,
            collision_calls: 0,
            fallback_count: 0,
            initialized: false,
        }
    }

    /// 任意无人机进入阈值即标记目标完成
    pub fn update_target_completion(&mut self, positions: &[Vec3], targets: &[Vec3], threshold: f64) {
        for (t, target) in targets.iter().enumerate() {
            if self.target_completed[t] {
                continue;
            }
            if positions.iter().any(|p| distance(p, target) < threshold) {
                self.target_completed[t] = true;
                tracing::info!(tick = self.tick, target = t, "Target reached");
            }
        }
    }

    /// 每架无人机是否已到达其当前分配的目标
    pub fn update_agent_completion(&mut self, positions: &[Vec3], targets: &[Vec3], threshold: f64) {
        for (agent, position) in positions.iter().enumerate() {
            self.agent_completed[agent] = self
                .assignment
                .target_of(agent)
                .and_then(|t| targets.get(t))
                .map(|target| distance(position, target) < threshold)
                .unwrap_or(false);
        }
    }

    pub fn all_targets_completed(&self) -> bool {
        self.target_completed.iter().all(|&c| c)
    }

    pub fn targets_completed(&self) -> usize {
        self.target_completed.iter().filter(|&&c| c).count()
    }

    /// 采用新计划：分配整体替换为计划给出的分配
    pub fn apply_plan(&mut self, plan: Plan, n_targets: usize) {
        self.assignment = plan.to_assignment(self.agent_completed.len(), n_targets);
        self.policy.on_success(plan.horizon());
        self.plan = Some(plan);
    }

    /// 回退：清空计划并立即重算贪心分配
    pub fn fall_back(&mut self, positions: &[Vec3], targets: &[Vec3]) {
        self.assignment = greedy_assign(positions, targets);
        self.plan = None;
        self.policy.on_failure();
        self.fallback_count += 1;
    }

    pub fn phase(&self) -> PolicyPhase {
        self.policy.phase(self.tick)
    }
}
