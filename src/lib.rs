//! SkyHive - 基于 LLM 规划服务的无人机编队目标分配与重规划控制器
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 控制环、控制器状态、错误与恢复、tick 快照、关闭信号
//! - **swarm**: 距离矩阵、贪心分配、碰撞检测、航点解析（纯函数）
//! - **planner**: 重规划策略、Plan 解析、提示词、规划服务客户端
//! - **llm**: LLM 客户端抽象、重试策略与实现（OpenAI 兼容 / Gemini / Mock）
//! - **memory**: 规划对话历史（上下文窗口 + 审计日志）与持久化
//! - **sim**: 仿真协作方接口与演示实现（运动学仿真、推力混控、场景生成）

pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod planner;
pub mod sim;
pub mod swarm;

pub use crate::core::{ControlLoop, RunReport, SwarmBuilder, SwarmError};
