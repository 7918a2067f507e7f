//! 规划服务返回的 Plan 及其解析
//!
//! parse_plan_response 从模型输出文本中截取最外层 `{ ... }` 并解析；
//! 找不到 JSON 对象、JSON 非法、或缺少 assignments / waypoints 时视为调用失败。

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::swarm::{geometry, Assignment, Vec3};

/// 单条重分配：drone_id -> target_id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PlanAssignment {
    pub drone_id: i64,
    pub target_id: i64,
}

/// 单条航点：drone_id -> 绝对坐标 [x, y, z]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PlanWaypoint {
    pub drone_id: i64,
    pub waypoint: Vec<f64>,
}

/// 可用的计划：assignments 与 waypoints 必须同时存在
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Plan {
    pub assignments: Vec<PlanAssignment>,
    pub waypoints: Vec<PlanWaypoint>,
    /// 计划有效的 tick 数；缺省或非正数时由调用方使用 replan_interval
    #[serde(default)]
    pub n_steps: Option<i64>,
    #[serde(default)]
    pub reasoning: Option<String>,
}

/// 计划解析失败原因
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanParseError {
    #[error("No JSON object found in model output")]
    NoJsonObject,

    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),
}

/// 成功响应的统计（写入审计日志）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseAnalysis {
    pub num_assignments: usize,
    pub num_waypoints: usize,
    pub n_steps_value: Option<i64>,
    pub reasoning_length: usize,
}

impl Plan {
    /// 该无人机的第一条合法航点（三个有限分量）；缺失或格式不对返回 None
    pub fn waypoint_for(&self, agent: usize) -> Option<Vec3> {
        let entry = self
            .waypoints
            .iter()
            .find(|w| w.drone_id >= 0 && w.drone_id as usize == agent)?;
        if entry.waypoint.len() != 3 {
            return None;
        }
        let point = [entry.waypoint[0], entry.waypoint[1], entry.waypoint[2]];
        geometry::is_finite(&point).then_some(point)
    }

    /// 有效期（tick）；非正数视为未提供
    pub fn horizon(&self) -> Option<u64> {
        self.n_steps.filter(|&n| n > 0).map(|n| n as u64)
    }

    /// 转为 Assignment：越界的 drone / target 丢弃，同一目标只保留第一个认领者，未出现的无人机为 -1
    pub fn to_assignment(&self, n_agents: usize, n_targets: usize) -> Assignment {
        let mut assignment = Assignment::unassigned(n_agents);
        let mut taken = vec![false; n_targets];
        for a in &self.assignments {
            let in_range = a.drone_id >= 0
                && (a.drone_id as usize) < n_agents
                && a.target_id >= 0
                && (a.target_id as usize) < n_targets;
            if !in_range {
                tracing::warn!(
                    drone_id = a.drone_id,
                    target_id = a.target_id,
                    "Dropping out-of-range plan assignment"
                );
                continue;
            }
            let (drone, target) = (a.drone_id as usize, a.target_id as usize);
            if taken[target] {
                tracing::warn!(drone, target, "Target already claimed in plan, leaving drone unassigned");
                continue;
            }
            if let Some(prev) = assignment.target_of(drone) {
                taken[prev] = false;
            }
            taken[target] = true;
            assignment.set(drone, Some(target));
        }
        assignment
    }

    pub fn analysis(&self) -> ResponseAnalysis {
        ResponseAnalysis {
            num_assignments: self.assignments.len(),
            num_waypoints: self.waypoints.len(),
            n_steps_value: self.n_steps,
            reasoning_length: self.reasoning.as_deref().map(str::len).unwrap_or(0),
        }
    }

    /// 响应格式的 JSON Schema（拼入 prompt）
    pub fn json_schema() -> String {
        let schema = schemars::schema_for!(Plan);
        serde_json::to_string_pretty(&schema).unwrap_or_default()
    }
}

/// 从模型输出中截取最外层大括号之间的内容并解析为 Plan
pub fn parse_plan_response(output: &str) -> Result<Plan, PlanParseError> {
    let trimmed = output.trim();
    let (start, end) = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(s), Some(e)) if e > s => (s, e),
        _ => return Err(PlanParseError::NoJsonObject),
    };
    let json_str = &trimmed[start..=end];

    let value: serde_json::Value =
        serde_json::from_str(json_str).map_err(|e| PlanParseError::InvalidJson(e.to_string()))?;
    let obj = value
        .as_object()
        .ok_or_else(|| PlanParseError::InvalidJson("top-level value is not an object".into()))?;
    for field in ["assignments", "waypoints"] {
        if obj.get(field).map_or(true, |v| v.is_null()) {
            return Err(PlanParseError::MissingField(field));
        }
    }

    serde_json::from_value(value).map_err(|e| PlanParseError::InvalidJson(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "assignments": [{"drone_id": 0, "target_id": 1}, {"drone_id": 1, "target_id": 0}],
        "waypoints": [{"drone_id": 0, "waypoint": [0.1, 0.5, 0.1]}, {"drone_id": 1, "waypoint": [0.7, 0.2, 0.2]}],
        "n_steps": 200,
        "reasoning": "swap to shorten paths"
    }"#;

    #[test]
    fn test_parse_plain_json() {
        let plan = parse_plan_response(SAMPLE).unwrap();
        assert_eq!(plan.assignments.len(), 2);
        assert_eq!(plan.horizon(), Some(200));
        assert_eq!(plan.waypoint_for(1), Some([0.7, 0.2, 0.2]));
    }

    #[test]
    fn test_parse_json_embedded_in_prose() {
        let text = format!("Sure! Here is the plan:\n```json\n{}\n```\nLet me know.", SAMPLE);
        let plan = parse_plan_response(&text).unwrap();
        assert_eq!(plan.reasoning.as_deref(), Some("swap to shorten paths"));
    }

    #[test]
    fn test_no_braces_is_error() {
        assert_eq!(
            parse_plan_response("I cannot help with that."),
            Err(PlanParseError::NoJsonObject)
        );
        assert_eq!(parse_plan_response("} backwards {"), Err(PlanParseError::NoJsonObject));
    }

    #[test]
    fn test_invalid_json_is_error() {
        let err = parse_plan_response("{ assignments: oops }").unwrap_err();
        assert!(matches!(err, PlanParseError::InvalidJson(_)));
    }

    #[test]
    fn test_missing_waypoints_is_error() {
        let err = parse_plan_response(r#"{"assignments": [], "n_steps": 5}"#).unwrap_err();
        assert_eq!(err, PlanParseError::MissingField("waypoints"));
    }

    #[test]
    fn test_missing_optional_fields_ok() {
        let plan = parse_plan_response(r#"{"assignments": [], "waypoints": []}"#).unwrap();
        assert_eq!(plan.horizon(), None);
        assert_eq!(plan.reasoning, None);
    }

    #[test]
    fn test_non_positive_horizon_treated_as_missing() {
        let plan =
            parse_plan_response(r#"{"assignments": [], "waypoints": [], "n_steps": 0}"#).unwrap();
        assert_eq!(plan.horizon(), None);
    }

    #[test]
    fn test_to_assignment_filters_and_dedups() {
        let plan = parse_plan_response(
            r#"{"assignments": [
                {"drone_id": 0, "target_id": 2},
                {"drone_id": 1, "target_id": 2},
                {"drone_id": 2, "target_id": 9},
                {"drone_id": 7, "target_id": 0}
            ], "waypoints": []}"#,
        )
        .unwrap();
        let a = plan.to_assignment(3, 3);
        assert_eq!(a.as_slice(), &[2, -1, -1]);
        assert!(a.is_injective());
    }

    #[test]
    fn test_json_schema_mentions_fields() {
        let schema = Plan::json_schema();
        assert!(schema.contains("assignments"));
        assert!(schema.contains("waypoints"));
    }
}
