//! 仿真协作方接口
//!
//! 控制环只通过 Simulation / MotionController 与物理世界交互：读取每架无人机的状态、
//! 下发 4 路执行器指令、推进一个 tick、可选地截取画面。物理积分与底层飞控不在本 crate 内。

pub mod kinematic;
pub mod mixer;
pub mod scenario;

use serde::Serialize;

use crate::core::SwarmError;
use crate::memory::ImageAttachment;
use crate::swarm::Vec3;

pub use kinematic::KinematicSim;
pub use mixer::{ThrustMixer, HOVER_RPM};
pub use scenario::{build_scenario, Scenario};

/// 单架无人机的实时状态（每 tick 从仿真读取，控制器不持有）
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AgentState {
    pub position: Vec3,
    pub velocity: Vec3,
    /// 欧拉角（roll, pitch, yaw）
    pub attitude: Vec3,
}

impl AgentState {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            velocity: [0.0; 3],
            attitude: [0.0; 3],
        }
    }
}

/// 下发给单架无人机的指令：解析后的航点与 4 路执行器值
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MotionCommand {
    pub waypoint: Vec3,
    pub actuators: [f64; 4],
}

/// 仿真环境
pub trait Simulation: Send {
    fn agent_count(&self) -> usize;

    fn agent_state(&self, agent: usize) -> Result<AgentState, SwarmError>;

    fn apply_command(&mut self, agent: usize, command: &MotionCommand) -> Result<(), SwarmError>;

    /// 同步推进一个 tick
    fn step(&mut self) -> Result<(), SwarmError>;

    /// 截取当前画面（已编码的图像）；不支持渲染时返回 None
    fn capture_frame(&mut self) -> Option<ImageAttachment> {
        None
    }
}

/// 航点 -> 执行器指令（PID、学习策略等都实现这一接口）
pub trait MotionController: Send {
    fn command(&mut self, agent: usize, state: &AgentState, waypoint: &Vec3) -> MotionCommand;
}
