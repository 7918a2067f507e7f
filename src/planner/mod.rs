//! 规划层：重规划策略、Plan 解析、提示词与规划服务客户端

pub mod advisory;
pub mod plan;
pub mod policy;
pub mod prompt;

pub use advisory::{
    AdvisoryClient, AdvisoryOutcome, AdvisoryRequest, AdvisorySnapshot, CallFailure, FailureKind,
};
pub use plan::{parse_plan_response, Plan, PlanAssignment, PlanParseError, PlanWaypoint, ResponseAnalysis};
pub use policy::{PolicyPhase, ReplanDecision, ReplanPolicy, ReplanReason};
