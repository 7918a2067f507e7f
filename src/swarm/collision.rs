//! 碰撞风险检测：两两扫描，距离严格小于安全距离的无人机对

use serde::{Deserialize, Serialize};

use crate::swarm::geometry::{distance, Vec3};

/// 无序无人机对（drone_1 < drone_2）及其实测距离
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollisionPair {
    pub drone_1: usize,
    pub drone_2: usize,
    pub distance: f64,
}

/// O(N²) 扫描，结果按 (drone_1, drone_2) 升序
pub fn detect_collisions(positions: &[Vec3], safety_margin: f64) -> Vec<CollisionPair> {
    let mut pairs = Vec::new();
    for i in 0..positions.len() {
        for j in (i + 1)..positions.len() {
            let d = distance(&positions[i], &positions[j]);
            if d < safety_margin {
                pairs.push(CollisionPair {
                    drone_1: i,
                    drone_2: j,
                    distance: d,
                });
            }
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_pair_reported() {
        let pairs = detect_collisions(&[[0.0, 0.0, 0.0], [0.1, 0.0, 0.0], [5.0, 0.0, 0.0]], 0.3);
        assert_eq!(pairs.len(), 1);
        assert_eq!((pairs[0].drone_1, pairs[0].drone_2), (0, 1));
        assert!((pairs[0].distance - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_exactly_at_margin_not_reported() {
        let pairs = detect_collisions(&[[0.0, 0.0, 0.0], [0.5, 0.0, 0.0]], 0.5);
        assert!(pairs.is_empty());
    }

    #[test]
    fn test_moving_apart_clears_pair() {
        let mut positions = vec![[0.0, 0.0, 0.0], [0.05, 0.0, 0.0]];
        assert_eq!(detect_collisions(&positions, 0.3).len(), 1);
        positions[1] = [100.0, 0.0, 0.0];
        assert!(detect_collisions(&positions, 0.3).is_empty());
    }

    #[test]
    fn test_all_pairs_in_cluster() {
        let positions = [[0.0, 0.0, 0.0], [0.01, 0.0, 0.0], [0.0, 0.01, 0.0]];
        let pairs = detect_collisions(&positions, 0.3);
        let ids: Vec<(usize, usize)> = pairs.iter().map(|p| (p.drone_1, p.drone_2)).collect();
        assert_eq!(ids, vec![(0, 1), (0, 2), (1, 2)]);
    }

    #[test]
    fn test_single_agent_or_empty() {
        assert!(detect_collisions(&[], 1.0).is_empty());
        assert!(detect_collisions(&[[0.0, 0.0, 0.0]], 1.0).is_empty());
    }
}
