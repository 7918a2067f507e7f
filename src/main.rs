//! SkyHive 命令行入口
//!
//! 加载配置与场景，构建运动学仿真 + 推力混控，运行控制环直到目标全部完成、达到 tick 上限或收到 Ctrl+C。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use skyhive::config::load_config;
use skyhive::core::{ShutdownManager, SwarmBuilder};
use skyhive::sim::{build_scenario, KinematicSim, ThrustMixer};

#[derive(Parser, Debug)]
#[command(name = "skyhive", version, about = "LLM-advised drone swarm assignment and replanning")]
struct Cli {
    /// 额外的配置文件（覆盖 config/default.toml）
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    max_ticks: Option<u64>,

    /// 0 表示不使用规划服务
    #[arg(long)]
    replan_interval: Option<u64>,

    /// openai | gemini | mock
    #[arg(long)]
    provider: Option<String>,

    /// 把截图附加到规划请求
    #[arg(long)]
    vision: bool,

    #[arg(short, long)]
    output_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    skyhive::observability::init();
    let cli = Cli::parse();

    let mut cfg = load_config(cli.config.clone()).context("Failed to load config")?;
    if let Some(n) = cli.max_ticks {
        cfg.planner.max_ticks = n;
    }
    if let Some(n) = cli.replan_interval {
        cfg.planner.replan_interval = n;
    }
    if let Some(p) = cli.provider {
        cfg.llm.provider = p;
    }
    if cli.vision {
        cfg.planner.use_vision = true;
    }
    if let Some(dir) = cli.output_dir {
        cfg.app.output_dir = Some(dir);
    }

    let scenario = build_scenario(&cfg.scenario).context("Invalid scenario")?;
    let sim = KinematicSim::new(scenario.spawn, cfg.scenario.dt, cfg.scenario.max_speed);

    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.install_signal_handlers();

    let mut control = SwarmBuilder::new(cfg)
        .with_cancellation(shutdown.token())
        .build(sim, ThrustMixer::default(), scenario.targets)
        .context("Failed to build control loop")?;

    let report = control.run().await.context("Control loop failed")?;
    if report.cancelled {
        tracing::info!(reason = ?shutdown.reason(), ticks = report.ticks, "Run stopped before completion");
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
