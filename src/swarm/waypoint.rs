//! 航点解析：把当前计划、完成状态与分配合并为每架无人机本 tick 的唯一目标点
//!
//! 优先级：计划显式航点 > 已完成则悬停在所分配目标 > 已分配则飞向目标 > 原地悬停。
//! 保证每架无人机都得到一个确定的点，即使计划缺项或部分损坏。

use serde::Serialize;

use crate::planner::Plan;
use crate::swarm::{Assignment, Vec3};

/// 航点来源（写入 tick 日志，便于审计回退路径的使用频率）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WaypointSource {
    PlanWaypoint,
    HoldAtTarget,
    AssignedTarget,
    HoverInPlace,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedWaypoint {
    pub point: Vec3,
    pub source: WaypointSource,
}

/// 为每架无人机解析航点；返回长度与 positions 相同
pub fn resolve_waypoints(
    positions: &[Vec3],
    targets: &[Vec3],
    assignment: &Assignment,
    plan: Option<&Plan>,
    agent_completed: &[bool],
) -> Vec<ResolvedWaypoint> {
    positions
        .iter()
        .enumerate()
        .map(|(agent, position)| {
            if let Some(point) = plan.and_then(|p| p.waypoint_for(agent)) {
                return ResolvedWaypoint {
                    point,
                    source: WaypointSource::PlanWaypoint,
                };
            }
            let target = assignment
                .target_of(agent)
                .and_then(|t| targets.get(t).copied());
            match target {
                Some(point) if agent_completed.get(agent).copied().unwrap_or(false) => {
                    ResolvedWaypoint {
                        point,
                        source: WaypointSource::HoldAtTarget,
                    }
                }
                Some(point) => ResolvedWaypoint {
                    point,
                    source: WaypointSource::AssignedTarget,
                },
                None => ResolvedWaypoint {
                    point: *position,
                    source: WaypointSource::HoverInPlace,
                },
            }
        })
        .collect()
}
