//! 重规划策略（状态机）
//!
//! 每个 tick 按优先级决定是否调用规划服务：
//! 碰撞（冷却期外）> 碰撞冷却期内跳过本 tick > 定时（tick % replan_interval == 0）
//! > 计划到期（ticks_remaining <= 0）> 从未获得过计划 > 不调用。
//! 冷却期内检测到碰撞时本 tick 不调用，保持当前计划状态。replan_interval 为 0 表示禁用规划服务。

use serde::{Deserialize, Serialize};

/// 本次调用的触发原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplanReason {
    Collision,
    Scheduled,
    Expired,
    NoPlan,
}

impl ReplanReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplanReason::Collision => "collision",
            ReplanReason::Scheduled => "scheduled",
            ReplanReason::Expired => "expired",
            ReplanReason::NoPlan => "no_plan",
        }
    }
}

impl std::fmt::Display for ReplanReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 策略所处阶段（投影到 tick 日志）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyPhase {
    Idle,
    Active,
    Expired,
    CollisionHold,
}

/// 单个 tick 的决策
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplanDecision {
    pub reason: Option<ReplanReason>,
    /// 检测到碰撞但处于冷却期，未因碰撞调用
    pub collision_suppressed: bool,
    /// 冷却期内距离下一次允许碰撞调用的 tick 数
    pub ticks_until_collision_call: Option<u64>,
}

impl ReplanDecision {
    fn none() -> Self {
        Self {
            reason: None,
            collision_suppressed: false,
            ticks_until_collision_call: None,
        }
    }

    pub fn should_call(&self) -> bool {
        self.reason.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct ReplanPolicy {
    replan_interval: u64,
    collision_interval: u64,
    last_collision_call: Option<u64>,
    ticks_remaining: i64,
    plan_obtained: bool,
    plan_active: bool,
}

impl ReplanPolicy {
    pub fn new(replan_interval: u64, collision_interval: u64) -> Self {
        Self {
            replan_interval,
            collision_interval,
            last_collision_call: None,
            ticks_remaining: 0,
            plan_obtained: false,
            plan_active: false,
        }
    }

    /// replan_interval > 0 时才会调用规划服务
    pub fn enabled(&self) -> bool {
        self.replan_interval > 0
    }

    pub fn replan_interval(&self) -> u64 {
        self.replan_interval
    }

    pub fn collision_interval(&self) -> u64 {
        self.collision_interval
    }

    pub fn ticks_remaining(&self) -> i64 {
        self.ticks_remaining
    }

    pub fn last_collision_call(&self) -> Option<u64> {
        self.last_collision_call
    }

    fn in_collision_hold(&self, tick: u64) -> bool {
        match self.last_collision_call {
            Some(last) => tick.saturating_sub(last) < self.collision_interval,
            None => false,
        }
    }

    /// 评估本 tick 是否调用；碰撞触发时记录基线 tick，进入冷却
    pub fn decide(&mut self, tick: u64, collision: bool) -> ReplanDecision {
        if !self.enabled() {
            return ReplanDecision::none();
        }

        let mut decision = ReplanDecision::none();
        if collision {
            if !self.in_collision_hold(tick) {
                self.last_collision_call = Some(tick);
                decision.reason = Some(ReplanReason::Collision);
                return decision;
            }
            decision.collision_suppressed = true;
            decision.ticks_until_collision_call = self
                .last_collision_call
                .map(|last| self.collision_interval - tick.saturating_sub(last));
            return decision;
        }

        decision.reason = if tick % self.replan_interval == 0 {
            Some(ReplanReason::Scheduled)
        } else if self.ticks_remaining <= 0 {
            Some(ReplanReason::Expired)
        } else if !self.plan_obtained {
            Some(ReplanReason::NoPlan)
        } else {
            None
        };
        decision
    }

    /// 调用成功：有效期取计划给出的 n_steps，否则取 replan_interval
    pub fn on_success(&mut self, horizon: Option<u64>) {
        let horizon = horizon.unwrap_or(self.replan_interval);
        self.ticks_remaining = i64::try_from(horizon).unwrap_or(i64::MAX);
        self.plan_obtained = true;
        self.plan_active = true;
    }

    /// 调用失败：调用方回退到贪心分配，有效期重置为 replan_interval
    pub fn on_failure(&mut self) {
        self.ticks_remaining = i64::try_from(self.replan_interval).unwrap_or(i64::MAX);
        self.plan_active = false;
    }

    /// tick 结束时推进计时
    pub fn advance(&mut self) {
        self.ticks_remaining = self.ticks_remaining.saturating_sub(1);
    }

    pub fn phase(&self, tick: u64) -> PolicyPhase {
        if self.in_collision_hold(tick) {
            PolicyPhase::CollisionHold
        } else if !self.plan_active {
            PolicyPhase::Idle
        } else if self.ticks_remaining > 0 {
            PolicyPhase::Active
        } else {
            PolicyPhase::Expired
        }
    }
}
