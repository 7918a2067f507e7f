//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `SKYHIVE__*` 覆盖（双下划线表示嵌套，如 `SKYHIVE__PLANNER__REPLAN_INTERVAL=10`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::llm::RetryConfig;
use crate::swarm::Vec3;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub planner: PlannerSection,
    pub retry: RetrySection,
    pub scenario: ScenarioSection,
}

/// [app] 段：应用名、输出目录
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 对话日志、摘要、tick 快照与截图的根目录；未设置时不落盘
    pub output_dir: Option<PathBuf>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: Some("skyhive".to_string()),
            output_dir: None,
        }
    }
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：openai / gemini / mock
    pub provider: String,
    /// 未设置时按 provider 取默认模型
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: None,
            base_url: None,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// 单次请求超时（秒）
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 60 }
    }
}

impl LlmTimeoutsSection {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request.max(1))
    }
}

/// [planner] 段：控制环参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlannerSection {
    /// 无人机之间的最小安全距离（米）
    pub safety_margin: f64,
    /// 到达目标的判定阈值（米）
    pub target_threshold: f64,
    /// 定时重规划间隔（tick）；0 表示不使用规划服务，只用贪心分配
    pub replan_interval: u64,
    /// 碰撞触发调用的冷却间隔（tick）
    pub collision_interval: u64,
    /// 上下文窗口大小
    pub window_size: usize,
    /// tick 上限
    pub max_ticks: u64,
    pub use_vision: bool,
}

impl Default for PlannerSection {
    fn default() -> Self {
        Self {
            safety_margin: 0.3,
            target_threshold: 0.1,
            replan_interval: 5,
            collision_interval: 20,
            window_size: 5,
            max_ticks: 10_000,
            use_vision: false,
        }
    }
}

/// [retry] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2000,
            multiplier: 2.0,
        }
    }
}

impl RetrySection {
    /// 转为 RetryConfig；max_attempts 为 0 或 multiplier 非有限 / 小于 1 时报错
    pub fn to_retry_config(&self) -> Result<RetryConfig, config::ConfigError> {
        if self.max_attempts == 0 {
            return Err(config::ConfigError::Message(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(config::ConfigError::Message(format!(
                "retry.multiplier must be a finite number >= 1.0, got {}",
                self.multiplier
            )));
        }
        Ok(RetryConfig::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            self.multiplier,
        ))
    }
}

/// [scenario] 段：目标点与初始位置
///
/// targets 非空时直接使用；否则在 target_x/y/z 范围内按 seed 随机生成 n_targets 个。
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScenarioSection {
    pub n_drones: usize,
    pub targets: Vec<Vec3>,
    pub n_targets: usize,
    pub target_x: (f64, f64),
    pub target_y: (f64, f64),
    pub target_z: (f64, f64),
    /// 初始位置生成盒（与目标范围同样的格式）
    pub spawn_x: (f64, f64),
    pub spawn_y: (f64, f64),
    pub spawn_z: (f64, f64),
    pub seed: u64,
    /// 仿真步长（秒）
    pub dt: f64,
    /// 运动学仿真的最大速度（米/秒）
    pub max_speed: f64,
}

impl Default for ScenarioSection {
    fn default() -> Self {
        Self {
            n_drones: 3,
            targets: Vec::new(),
            n_targets: 3,
            target_x: (-1.5, 1.5),
            target_y: (-1.5, 1.5),
            target_z: (0.3, 1.2),
            spawn_x: (-1.0, 1.0),
            spawn_y: (-1.0, 1.0),
            spawn_z: (0.1, 0.2),
            seed: 42,
            dt: 0.01,
            max_speed: 1.0,
        }
    }
}

/// 从 config 目录加载配置，环境变量 SKYHIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path，则追加该文件（可覆盖前面的键）；显式指定但不存在时报错
/// 3. 最后叠加环境变量 SKYHIVE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(path) = config_path {
        builder = builder.add_source(config::File::from(path).required(true));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("SKYHIVE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.planner.replan_interval, 5);
        assert_eq!(cfg.planner.collision_interval, 20);
        assert_eq!(cfg.planner.window_size, 5);
        assert!((cfg.planner.safety_margin - 0.3).abs() < 1e-12);
        assert_eq!(cfg.retry.max_attempts, 3);
        assert_eq!(cfg.llm.timeouts.request, 60);
    }

    #[test]
    fn test_retry_section_conversion() {
        let retry = RetrySection::default().to_retry_config().unwrap();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.base_delay, Duration::from_secs(2));
    }

    #[test]
    fn test_retry_section_rejects_bad_values() {
        let zero = RetrySection {
            max_attempts: 0,
            ..RetrySection::default()
        };
        assert!(zero.to_retry_config().is_err());

        for multiplier in [0.5, f64::NAN, f64::INFINITY] {
            let bad = RetrySection {
                multiplier,
                ..RetrySection::default()
            };
            assert!(bad.to_retry_config().is_err(), "multiplier {multiplier} accepted");
        }

        let large = RetrySection {
            max_attempts: 100,
            ..RetrySection::default()
        };
        assert_eq!(large.to_retry_config().unwrap().max_attempts, 100);
    }

    #[test]
    fn test_load_explicit_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        std::fs::write(
            &path,
            r#"
[planner]
replan_interval = 0
max_ticks = 50

[scenario]
n_drones = 3
targets = [[1.0, 1.0, 0.5], [-1.0, 1.0, 0.7], [0.0, -1.0, 0.3]]
"#,
        )
        .unwrap();
        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.planner.replan_interval, 0);
        assert_eq!(cfg.planner.max_ticks, 50);
        assert_eq!(cfg.scenario.targets.len(), 3);
        assert_eq!(cfg.scenario.targets[1], [-1.0, 1.0, 0.7]);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        assert!(load_config(Some(PathBuf::from("/nonexistent/skyhive.toml"))).is_err());
    }
}
