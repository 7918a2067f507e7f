//! 贪心目标分配
//!
//! 先算 N×M 距离矩阵，再按无人机 id 升序为每架选择最近的、尚未被占用的目标；
//! 距离相同时取较小的目标下标。目标数少于无人机数时，末尾的无人机保持未分配（-1）。

use serde::{Deserialize, Serialize};

use crate::swarm::geometry::{distance, Vec3};

/// 未分配标记（与日志 / LLM 协议保持一致）
pub const UNASSIGNED: i64 = -1;

/// 无人机 -> 目标下标 的距离矩阵，rows = 无人机，cols = 目标
#[derive(Debug, Clone)]
pub struct DistanceMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl DistanceMatrix {
    pub fn compute(agents: &[Vec3], targets: &[Vec3]) -> Self {
        let rows = agents.len();
        let cols = targets.len();
        let mut data = Vec::with_capacity(rows * cols);
        for a in agents {
            for t in targets {
                data.push(distance(a, t));
            }
        }
        Self { rows, cols, data }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, agent: usize, target: usize) -> f64 {
        self.data[agent * self.cols + target]
    }

    pub fn row(&self, agent: usize) -> &[f64] {
        &self.data[agent * self.cols..(agent + 1) * self.cols]
    }
}

/// 分配结果：下标为无人机 id，值为目标下标或 -1
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Assignment(Vec<i64>);

impl Assignment {
    /// 全部未分配
    pub fn unassigned(n_agents: usize) -> Self {
        Self(vec![UNASSIGNED; n_agents])
    }

    pub fn from_vec(v: Vec<i64>) -> Self {
        Self(v)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 某架无人机的目标下标；未分配或越界返回 None
    pub fn target_of(&self, agent: usize) -> Option<usize> {
        match self.0.get(agent) {
            Some(&t) if t >= 0 => Some(t as usize),
            _ => None,
        }
    }

    pub fn set(&mut self, agent: usize, target: Option<usize>) {
        if let Some(slot) = self.0.get_mut(agent) {
            *slot = target.map(|t| t as i64).unwrap_or(UNASSIGNED);
        }
    }

    pub fn as_slice(&self) -> &[i64] {
        &self.0
    }

    /// 已分配的目标是否两两不同
    pub fn is_injective(&self) -> bool {
        let mut seen = std::collections::HashSet::new();
        self.0.iter().filter(|&&t| t >= 0).all(|t| seen.insert(*t))
    }
}

/// 贪心最近目标分配（纯函数）
pub fn greedy_assign(agents: &[Vec3], targets: &[Vec3]) -> Assignment {
    let matrix = DistanceMatrix::compute(agents, targets);
    let mut taken = vec![false; matrix.cols()];
    let mut assignment = Assignment::unassigned(matrix.rows());

    for agent in 0..matrix.rows() {
        let row = matrix.row(agent);
        let mut best: Option<usize> = None;
        for (target, &d) in row.iter().enumerate() {
            if taken[target] {
                continue;
            }
            // 严格小于：相等时保留更小的目标下标
            match best {
                Some(b) if d >= row[b] => {}
                _ => best = Some(target),
            }
        }
        if let Some(target) = best {
            taken[target] = true;
            assignment.set(agent, Some(target));
        }
    }
    assignment
}
