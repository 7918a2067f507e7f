//! 控制环构建器：从 AppConfig 组装规划服务客户端、对话历史、输出目录与 ControlLoop

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::core::controller::{ControlLoop, LoopParams, OutputPaths, RunMeta};
use crate::core::{ControllerState, SwarmError};
use crate::llm::{
    create_gemini_client, LlmClient, LlmError, MockLlmClient, OpenAiClient, RetryConfig,
    DEFAULT_OPENAI_MODEL, GEMINI_PRO,
};
use crate::memory::{ConversationHistory, FileAuditSink};
use crate::planner::prompt::load_system_prompt;
use crate::planner::{AdvisoryClient, ReplanPolicy};
use crate::sim::{MotionController, Simulation};
use crate::swarm::Vec3;

/// 按 [llm] 段创建 LLM 客户端；缺少凭据或 provider 未知时返回配置错误
pub fn create_llm_from_config(cfg: &AppConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    let provider = cfg.llm.provider.to_lowercase();
    let timeout = cfg.llm.timeouts.request_timeout();
    let base_url = cfg.llm.base_url.as_deref();
    match provider.as_str() {
        "gemini" => {
            let model = cfg.llm.model.as_deref().unwrap_or(GEMINI_PRO);
            tracing::info!("Using Gemini LLM ({})", model);
            Ok(Arc::new(create_gemini_client(Some(model), base_url, timeout)?))
        }
        "openai" => {
            let model = cfg.llm.model.as_deref().unwrap_or(DEFAULT_OPENAI_MODEL);
            tracing::info!("Using OpenAI LLM ({})", model);
            Ok(Arc::new(OpenAiClient::from_env(base_url, model, timeout)?))
        }
        "mock" => {
            tracing::warn!("Using Mock LLM, every advisory call will fail over to greedy assignment");
            Ok(Arc::new(MockLlmClient::new()))
        }
        other => Err(LlmError::Config(format!(
            "Model provider {} not supported",
            other
        ))),
    }
}

/// ControlLoop 构建器
pub struct SwarmBuilder {
    config: AppConfig,
    llm: Option<Arc<dyn LlmClient>>,
    system_prompt: Option<String>,
    cancel: CancellationToken,
}

impl SwarmBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            llm: None,
            system_prompt: None,
            cancel: CancellationToken::new(),
        }
    }

    /// 注入 LLM 客户端（不设置时按配置创建）
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_system_prompt(mut self, prompt: &str) -> Self {
        self.system_prompt = Some(prompt.to_string());
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn output_dir(&self) -> Option<PathBuf> {
        self.config.app.output_dir.clone()
    }

    pub fn build<S: Simulation, M: MotionController>(
        self,
        sim: S,
        motion: M,
        targets: Vec<Vec3>,
    ) -> Result<ControlLoop<S, M>, SwarmError> {
        let planner = &self.config.planner;
        if targets.is_empty() {
            return Err(SwarmError::InvalidScenario("no targets".into()));
        }
        if sim.agent_count() == 0 {
            return Err(SwarmError::InvalidScenario("no drones".into()));
        }
        if !(planner.safety_margin >= 0.0 && planner.target_threshold > 0.0) {
            return Err(SwarmError::Config(format!(
                "invalid thresholds: safety_margin={}, target_threshold={}",
                planner.safety_margin, planner.target_threshold
            )));
        }

        let policy = ReplanPolicy::new(planner.replan_interval, planner.collision_interval);
        let (advisory, meta) = if policy.enabled() {
            let retry = self
                .config
                .retry
                .to_retry_config()
                .map_err(|e| SwarmError::Config(e.to_string()))?;
            // 配置出的 mock 没有脚本，每次调用都会失败，重试无需等待
            let retry = if self.llm.is_none() && self.config.llm.provider.eq_ignore_ascii_case("mock") {
                RetryConfig::immediate(retry.max_attempts)
            } else {
                retry
            };
            let llm = match self.llm.clone() {
                Some(llm) => llm,
                None => create_llm_from_config(&self.config)?,
            };
            let meta = RunMeta {
                provider: self.config.llm.provider.clone(),
                model: llm.model().to_string(),
            };
            let prompt = self.system_prompt.clone().unwrap_or_else(load_system_prompt);
            let client = AdvisoryClient::new(llm, retry, prompt)
                .with_default_n_steps(planner.replan_interval)
                .with_vision(planner.use_vision);
            (Some(client), meta)
        } else {
            tracing::info!("Advisory service disabled, using greedy assignment only");
            (None, RunMeta::default())
        };

        let mut history = ConversationHistory::new(planner.window_size);
        let outputs = match self.output_dir() {
            Some(dir) => {
                std::fs::create_dir_all(&dir)?;
                history = history.with_sink(Box::new(FileAuditSink::new(dir.join("conversation_log.json"))));
                tracing::info!(dir = %dir.display(), "Writing run artifacts");
                OutputPaths::under(dir)
            }
            None => OutputPaths::default(),
        };

        let params = LoopParams {
            safety_margin: planner.safety_margin,
            target_threshold: planner.target_threshold,
            max_ticks: planner.max_ticks,
            use_vision: planner.use_vision,
        };
        let state = ControllerState::new(sim.agent_count(), targets.len(), policy);
        Ok(ControlLoop::new(
            sim, motion, targets, params, state, advisory, history, outputs, meta, self.cancel,
        ))
    }
}
