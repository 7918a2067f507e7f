//! 每个 tick 的状态快照
//!
//! 写到 `<output_dir>/states/step_{tick:05}.json`；写入失败只记 warn，不影响控制环。

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::memory::write_json_atomic;
use crate::planner::{Plan, PolicyPhase, ReplanReason};
use crate::swarm::{Assignment, Vec3, WaypointSource};

/// 单架无人机在本 tick 的状态、目标与指令
#[derive(Debug, Clone, Serialize)]
pub struct AgentTickEntry {
    pub drone_id: usize,
    pub position: Vec3,
    pub velocity: Vec3,
    pub attitude: Vec3,
    pub target: Vec3,
    pub target_source: WaypointSource,
    pub actuators: [f64; 4],
    pub drone_completed: bool,
    pub distance_to_target: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TickRecord {
    pub step: u64,
    pub targets: Vec<Vec3>,
    pub completed: Vec<bool>,
    pub drone_states: Vec<AgentTickEntry>,
    pub plan: Option<Plan>,
    pub assignments: Assignment,
    pub collision_detected: bool,
    pub llm_call_reason: Option<ReplanReason>,
    pub policy_phase: PolicyPhase,
    pub ticks_remaining: i64,
    pub collision_count: u64,
    pub collision_triggered_calls: u64,
}

/// tick 快照写入器
#[derive(Debug, Clone)]
pub struct StateRecorder {
    dir: PathBuf,
}

impl StateRecorder {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, tick: u64) -> PathBuf {
        self.dir.join(format!("step_{:05}.json", tick))
    }

    pub fn record(&self, record: &TickRecord) -> anyhow::Result<()> {
        write_json_atomic(&self.path_for(record.step), record)
    }
}
