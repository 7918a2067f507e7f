//! 推力混控：把航点误差映射为 4 路旋翼转速（PD + X 型混控），限幅在悬停转速的 [0.9, 1.5] 倍

use crate::sim::{AgentState, MotionCommand, MotionController};
use crate::swarm::Vec3;

/// 悬停转速（RPM）
pub const HOVER_RPM: f64 = 14468.429183500699;
const MIN_RPM_RATIO: f64 = 0.9;
const MAX_RPM_RATIO: f64 = 1.5;

#[derive(Debug, Clone)]
pub struct ThrustMixer {
    pub base_rpm: f64,
    pub kp_xy: f64,
    pub kd_xy: f64,
    pub kp_z: f64,
    pub kd_z: f64,
}

impl Default for ThrustMixer {
    fn default() -> Self {
        Self {
            base_rpm: HOVER_RPM,
            kp_xy: 0.05,
            kd_xy: 0.02,
            kp_z: 0.2,
            kd_z: 0.05,
        }
    }
}

impl ThrustMixer {
    pub fn min_rpm(&self) -> f64 {
        MIN_RPM_RATIO * self.base_rpm
    }

    pub fn max_rpm(&self) -> f64 {
        MAX_RPM_RATIO * self.base_rpm
    }

    /// 截断到整数后限幅
    pub fn clamp_rpm(&self, rpm: f64) -> f64 {
        if !rpm.is_finite() {
            return self.base_rpm;
        }
        rpm.trunc().clamp(self.min_rpm(), self.max_rpm())
    }

    /// 顺序：前左、前右、后左、后右
    pub fn mix(&self, state: &AgentState, waypoint: &Vec3) -> [f64; 4] {
        let err = [
            waypoint[0] - state.position[0],
            waypoint[1] - state.position[1],
            waypoint[2] - state.position[2],
        ];
        let throttle = self.kp_z * err[2] - self.kd_z * state.velocity[2];
        let pitch = self.kp_xy * err[0] - self.kd_xy * state.velocity[0];
        let roll = self.kp_xy * err[1] - self.kd_xy * state.velocity[1];
        let raw = [
            1.0 + throttle - pitch + roll,
            1.0 + throttle - pitch - roll,
            1.0 + throttle + pitch + roll,
            1.0 + throttle + pitch - roll,
        ];
        raw.map(|r| self.clamp_rpm(r * self.base_rpm))
    }
}

impl MotionController for ThrustMixer {
    fn command(&mut self, _agent: usize, state: &AgentState, waypoint: &Vec3) -> MotionCommand {
        MotionCommand {
            waypoint: *waypoint,
            actuators: self.mix(state, waypoint),
        }
    }
}
