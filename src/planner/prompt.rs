//! 规划服务的提示词构建
//!
//! 消息顺序：system → 上下文窗口内的历史（user/assistant 成对）→ 本次 user（可附带图像）。

use crate::memory::{ConversationTurn, ImageAttachment, Message};
use crate::planner::advisory::AdvisoryRequest;
use crate::planner::Plan;

const DEFAULT_SYSTEM_PROMPT: &str = "You are an expert multi-agent path planner for drone teams in a 3D environment. \
Your task is to assign drones to targets and generate the next collision-free waypoint for each drone, \
so that each drone hovers at a target point.

Key Requirements:
- Drones can be reassigned to different targets between planning steps.
- Keep at least the minimum safe distance between all drones along their paths and at their waypoints.
- A drone has reached its assigned target when its distance to it is less than the specified threshold.
- Always provide waypoints for ALL drones, even if they have reached their targets.
- For drones that have completed their targets, set the waypoint to the assigned target position.
- For drones still moving, provide the next waypoint they should move toward.
- Decide how many steps these waypoints stay valid (n_steps) before replanning is needed.
- Provide clear reasoning for your assignments and waypoint choices.
- Your output must be valid JSON following the schema provided.
- Learn from previous interactions to improve your planning decisions.";

const NO_VALID_PLAN_NOTE: &str = "I was unable to provide a valid response for this request.";

/// 加载 system prompt：优先 config/prompts/planner_system.txt，否则使用内置文本
pub fn load_system_prompt() -> String {
    [
        "config/prompts/planner_system.txt",
        "../config/prompts/planner_system.txt",
    ]
    .into_iter()
    .find_map(|p| std::fs::read_to_string(p).ok())
    .filter(|s| !s.trim().is_empty())
    .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string())
}

/// 碰撞告警段落；未检测到碰撞时为空
pub fn collision_section(request: &AdvisoryRequest) -> String {
    if !request.collision_detected {
        return String::new();
    }
    let mut out = String::from("\nURGENT: COLLISION RISK DETECTED!\n");
    out.push_str("The following drone pairs are within the minimum safe distance:\n");
    for pair in &request.collision_pairs {
        out.push_str(&format!(
            "- Drones {} and {} are {:.3}m apart (min: {}m)\n",
            pair.drone_1, pair.drone_2, pair.distance, request.min_distance
        ));
    }
    out.push_str("IMMEDIATE collision avoidance is required! Prioritize separating these drones safely.\n");
    out
}

fn pretty(value: &impl serde::Serialize) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

/// 本次请求的 user prompt；default_n_steps 为无历史时建议的有效期
pub fn build_user_prompt(request: &AdvisoryRequest, default_n_steps: u64) -> String {
    format!(
        "Plan the next step for a team of drones to cover all targets in 3D space, following these rules:\n\
         - Targets and drones may be reassigned at any step.\n\
         - Drones should avoid colliding with each other.\n\
         - Minimum safe distance between drones: {min} (meters)\n\
         - A drone is considered at its target if within {thr} meters.\n\
         - Provide waypoints for ALL drones (including completed ones, set to the target position).\n\
         - Suggest n_steps (how many steps to follow these waypoints before the next planning round) \
         based on previous interactions. A default of {n_steps} is suggested if none are available.\n\
         - Output your reasoning.\n\
         {collision}\
         Current State (JSON):\n{state}\n\
         Your output must be a single JSON object following this JSON schema:\n{schema}\n",
        min = request.min_distance,
        thr = request.target_threshold,
        n_steps = default_n_steps,
        collision = collision_section(request),
        state = pretty(request),
        schema = Plan::json_schema(),
    )
}

/// 历史记录回放为 user/assistant 消息对；失败的记录回放为“未能给出有效计划”
pub fn history_messages<'a>(window: impl Iterator<Item = &'a ConversationTurn>) -> Vec<Message> {
    let mut messages = Vec::new();
    for turn in window {
        messages.push(Message::user(format!(
            "Previous planning request (Step {}):\n{}",
            turn.step,
            pretty(&turn.input_data)
        )));
        match &turn.response {
            Some(plan) if turn.success => messages.push(Message::assistant(pretty(plan))),
            _ => messages.push(Message::assistant(NO_VALID_PLAN_NOTE)),
        }
    }
    messages
}

/// 组装完整消息列表
pub fn build_messages<'a>(
    system_prompt: &str,
    window: impl Iterator<Item = &'a ConversationTurn>,
    user_prompt: String,
    image: Option<ImageAttachment>,
) -> Vec<Message> {
    let mut messages = vec![Message::system(system_prompt)];
    messages.extend(history_messages(window));
    messages.push(match image {
        Some(img) => Message::user_with_image(user_prompt, img),
        None => Message::user(user_prompt),
    });
    messages
}
