//! 核心编排层：错误与恢复、控制器状态、tick 快照、关闭信号、控制环与构建器

pub mod builder;
pub mod controller;
pub mod error;
pub mod recovery;
pub mod shutdown;
pub mod snapshot;
pub mod state;

pub use builder::{create_llm_from_config, SwarmBuilder};
pub use controller::{ControlLoop, LoopParams, OutputPaths, RunMeta, RunReport, TickOutcome};
pub use error::{RecoveryAction, SwarmError};
pub use recovery::RecoveryEngine;
pub use shutdown::{ShutdownManager, ShutdownReason};
pub use snapshot::{AgentTickEntry, StateRecorder, TickRecord};
pub use state::ControllerState;
