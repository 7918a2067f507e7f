//! 运动学质点仿真：每个 tick 以不超过 max_speed 的速度直线飞向最近一次下发的航点
//!
//! 只用于离线演示与端到端测试，不模拟动力学；执行器指令被忽略。

use crate::core::SwarmError;
use crate::sim::{AgentState, MotionCommand, Simulation};
use crate::swarm::geometry::{norm, sub};
use crate::swarm::Vec3;

#[derive(Debug, Clone)]
pub struct KinematicSim {
    positions: Vec<Vec3>,
    velocities: Vec<Vec3>,
    waypoints: Vec<Option<Vec3>>,
    dt: f64,
    max_speed: f64,
    ticks: u64,
}

impl KinematicSim {
    pub fn new(spawn: Vec<Vec3>, dt: f64, max_speed: f64) -> Self {
        let n = spawn.len();
        Self {
            positions: spawn,
            velocities: vec![[0.0; 3]; n],
            waypoints: vec![None; n],
            dt,
            max_speed,
            ticks: 0,
        }
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    /// 直接设置位置（测试中制造碰撞等场景）
    pub fn set_position(&mut self, agent: usize, position: Vec3) {
        if let Some(p) = self.positions.get_mut(agent) {
            *p = position;
        }
    }

    fn check(&self, agent: usize) -> Result<(), SwarmError> {
        if agent < self.positions.len() {
            Ok(())
        } else {
            Err(SwarmError::Simulation(format!(
                "agent {} out of range ({} agents)",
                agent,
                self.positions.len()
            )))
        }
    }
}

impl Simulation for KinematicSim {
    fn agent_count(&self) -> usize {
        self.positions.len()
    }

    fn agent_state(&self, agent: usize) -> Result<AgentState, SwarmError> {
        self.check(agent)?;
        Ok(AgentState {
            position: self.positions[agent],
            velocity: self.velocities[agent],
            attitude: [0.0; 3],
        })
    }

    fn apply_command(&mut self, agent: usize, command: &MotionCommand) -> Result<(), SwarmError> {
        self.check(agent)?;
        self.waypoints[agent] = Some(command.waypoint);
        Ok(())
    }

    fn step(&mut self) -> Result<(), SwarmError> {
        let max_step = self.max_speed * self.dt;
        for i in 0..self.positions.len() {
            let Some(target) = self.waypoints[i] else {
                self.velocities[i] = [0.0; 3];
                continue;
            };
            let delta = sub(&target, &self.positions[i]);
            let dist = norm(&delta);
            let step = if dist <= max_step || dist == 0.0 {
                delta
            } else {
                let scale = max_step / dist;
                [delta[0] * scale, delta[1] * scale, delta[2] * scale]
            };
            for k in 0..3 {
                self.positions[i][k] += step[k];
                self.velocities[i][k] = if self.dt > 0.0 { step[k] / self.dt } else { 0.0 };
            }
        }
        self.ticks += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swarm::distance;

    fn command(waypoint: Vec3) -> MotionCommand {
        MotionCommand {
            waypoint,
            actuators: [0.0; 4],
        }
    }

    #[test]
    fn test_moves_toward_waypoint_capped() {
        let mut sim = KinematicSim::new(vec![[0.0, 0.0, 0.0]], 0.1, 1.0);
        sim.apply_command(0, &command([1.0, 0.0, 0.0])).unwrap();
        sim.step().unwrap();
        let s = sim.agent_state(0).unwrap();
        assert!((s.position[0] - 0.1).abs() < 1e-9);
        assert!((s.velocity[0] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_snaps_when_close() {
        let mut sim = KinematicSim::new(vec![[0.0, 0.0, 0.0]], 0.1, 1.0);
        sim.apply_command(0, &command([0.05, 0.0, 0.0])).unwrap();
        sim.step().unwrap();
        assert!(distance(&sim.positions()[0], &[0.05, 0.0, 0.0]) < 1e-12);
    }

    #[test]
    fn test_out_of_range_agent() {
        let sim = KinematicSim::new(vec![[0.0; 3]], 0.1, 1.0);
        assert!(matches!(sim.agent_state(3), Err(SwarmError::Simulation(_))));
    }
}
