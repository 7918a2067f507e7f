//! 集群几何层：距离矩阵与贪心分配、碰撞检测、航点解析

pub mod assign;
pub mod collision;
pub mod geometry;
pub mod waypoint;

pub use assign::{greedy_assign, Assignment, DistanceMatrix, UNASSIGNED};
pub use collision::{detect_collisions, CollisionPair};
pub use geometry::{distance, Vec3};
pub use waypoint::{resolve_waypoints, ResolvedWaypoint, WaypointSource};
