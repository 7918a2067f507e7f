//! 控制环端到端测试（运动学仿真 + 脚本化 Mock LLM）

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use skyhive::config::AppConfig;
    use skyhive::core::{SwarmBuilder, SwarmError};
    use skyhive::llm::{LlmError, MockLlmClient};
    use skyhive::planner::ReplanReason;
    use skyhive::sim::{KinematicSim, ThrustMixer};
    use skyhive::swarm::{greedy_assign, Vec3, WaypointSource};

    fn targets() -> Vec<Vec3> {
        vec![[1.0, 1.0, 0.5], [-1.0, 1.0, 0.7], [0.0, -1.0, 0.3]]
    }

    fn spawn() -> Vec<Vec3> {
        vec![[0.0, 0.0, 0.1], [0.5, 0.5, 0.1], [-0.5, 0.5, 0.1]]
    }

    fn config(replan_interval: u64) -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.planner.replan_interval = replan_interval;
        cfg.planner.max_ticks = 2000;
        cfg.retry.base_delay_ms = 1;
        cfg
    }

    fn sim() -> KinematicSim {
        KinematicSim::new(spawn(), 0.05, 1.0)
    }

    #[tokio::test]
    async fn test_greedy_only_run_reaches_all_targets() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(0);
        cfg.app.output_dir = Some(dir.path().to_path_buf());
        let mut control = SwarmBuilder::new(cfg)
            .build(sim(), ThrustMixer::default(), targets())
            .unwrap();

        let expected = greedy_assign(&spawn(), &targets());
        assert!(expected.is_injective());
        let targets = targets();
        let mut ticks_seen = 0u64;
        let report = control
            .run_with(|outcome| {
                ticks_seen += 1;
                assert_eq!(outcome.reason, None);
                for (agent, wp) in outcome.waypoints.iter().enumerate() {
                    let t = expected.target_of(agent).unwrap();
                    assert_eq!(wp.point, targets[t]);
                    assert_ne!(wp.source, WaypointSource::HoverInPlace);
                }
            })
            .await
            .unwrap();

        assert!(report.all_completed);
        assert!(!report.cancelled);
        assert_eq!(report.ticks, ticks_seen);
        assert!(report.ticks < 2000);
        assert_eq!(report.advisory_calls, 0);
        assert_eq!(control.state().assignment, expected);

        assert!(dir.path().join("summary.json").exists());
        assert!(dir.path().join("states").join("step_00000.json").exists());
        assert!(!dir.path().join("conversation_log.json").exists());
    }

    #[tokio::test]
    async fn test_advisory_failure_reverts_to_greedy() {
        let mock = Arc::new(MockLlmClient::scripted(vec![
            Err(LlmError::Network("connection reset".into())),
            Err(LlmError::Timeout(60)),
            Err(LlmError::ApiError("503".into())),
        ]));
        let mut control = SwarmBuilder::new(config(5))
            .with_llm(mock.clone())
            .build(sim(), ThrustMixer::default(), targets())
            .unwrap();

        let outcome = control.tick().await.unwrap();
        assert_eq!(outcome.reason, Some(ReplanReason::Scheduled));
        assert!(outcome.fallback);
        assert_eq!(mock.call_count(), 3);
        assert_eq!(control.state().assignment, greedy_assign(&spawn(), &targets()));
        assert!(control.state().plan.is_none());
        // 失败时置为 replan_interval，tick 结束推进一次
        assert_eq!(control.state().policy.ticks_remaining(), 5 - 1);

        let turn = &control.history().audit_log()[0];
        assert!(!turn.success);
        assert_eq!(turn.attempts, 3);
        assert!(turn.error_message.as_deref().unwrap().contains("503"));
    }

    #[tokio::test]
    async fn test_prose_wrapped_plan_is_applied() {
        let reply = r#"Here is my plan.
{
  "assignments": [
    {"drone_id": 0, "target_id": 1},
    {"drone_id": 1, "target_id": 0},
    {"drone_id": 2, "target_id": 2}
  ],
  "waypoints": [
    {"drone_id": 0, "waypoint": [-0.5, 0.5, 0.4]},
    {"drone_id": 1, "waypoint": [0.8, 0.8, 0.4]}
  ],
  "n_steps": 40,
  "reasoning": "swap drones 0 and 1"
}
Let me know if you need anything else."#;
        let mock = Arc::new(MockLlmClient::scripted(vec![Ok(reply.to_string())]));
        let mut control = SwarmBuilder::new(config(100))
            .with_llm(mock.clone())
            .build(sim(), ThrustMixer::default(), targets())
            .unwrap();

        let outcome = control.tick().await.unwrap();
        assert!(!outcome.fallback);
        assert_eq!(control.state().assignment.as_slice(), &[1, 0, 2]);
        assert_eq!(control.state().policy.ticks_remaining(), 39);
        assert_eq!(outcome.waypoints[0].point, [-0.5, 0.5, 0.4]);
        assert_eq!(outcome.waypoints[0].source, WaypointSource::PlanWaypoint);
        // 计划未给出航点的无人机飞向分配目标
        assert_eq!(outcome.waypoints[2].point, targets()[2]);
        assert_eq!(outcome.waypoints[2].source, WaypointSource::AssignedTarget);

        // 有效期内不再调用
        let next = control.tick().await.unwrap();
        assert_eq!(next.reason, None);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_reply_without_json_falls_back() {
        let mock = Arc::new(MockLlmClient::scripted(vec![Ok(
            "I am unable to produce a plan right now.".to_string(),
        )]));
        let mut control = SwarmBuilder::new(config(5))
            .with_llm(mock.clone())
            .build(sim(), ThrustMixer::default(), targets())
            .unwrap();

        let outcome = control.tick().await.unwrap();
        assert!(outcome.fallback);
        assert_eq!(mock.call_count(), 1);
        let turn = &control.history().audit_log()[0];
        assert!(!turn.success);
        assert_eq!(
            turn.raw_output.as_deref(),
            Some("I am unable to produce a plan right now.")
        );
    }

    #[tokio::test]
    async fn test_missing_credentials_abort_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(5);
        cfg.app.output_dir = Some(dir.path().to_path_buf());
        let mock = Arc::new(MockLlmClient::scripted(vec![Err(LlmError::Config(
            "GOOGLE_API_KEY environment variable not set".into(),
        ))]));
        let mut control = SwarmBuilder::new(cfg)
            .with_llm(mock.clone())
            .build(sim(), ThrustMixer::default(), targets())
            .unwrap();

        let err = control.run().await.unwrap_err();
        assert!(matches!(err, SwarmError::Advisory(LlmError::Config(_))));
        assert_eq!(mock.call_count(), 1);

        let log: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("conversation_log.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(log.as_array().unwrap().len(), 1);
        assert_eq!(log[0]["success"], false);
        assert_eq!(log[0]["llm_call_reason"], "scheduled");
    }

    #[tokio::test]
    async fn test_conversation_log_flushed_every_call() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(2);
        cfg.app.output_dir = Some(dir.path().to_path_buf());
        cfg.planner.max_ticks = 4;
        let plan = r#"{"assignments": [{"drone_id": 0, "target_id": 0}], "waypoints": [], "n_steps": 2}"#;
        let mock = Arc::new(MockLlmClient::scripted(vec![
            Ok(plan.to_string()),
            Err(LlmError::Timeout(60)),
            Err(LlmError::Timeout(60)),
            Err(LlmError::Timeout(60)),
        ]));
        let mut control = SwarmBuilder::new(cfg)
            .with_llm(mock)
            .build(sim(), ThrustMixer::default(), targets())
            .unwrap();

        let report = control.run().await.unwrap();
        assert_eq!(report.ticks, 4);
        assert_eq!(report.advisory_calls, 2);
        assert_eq!(report.fallbacks, 1);

        let log: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("conversation_log.json")).unwrap(),
        )
        .unwrap();
        let turns = log.as_array().unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0]["step"], 0);
        assert_eq!(turns[1]["step"], 2);
        assert_eq!(turns[1]["attempts"], 3);

        let summary: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("summary.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(summary["conversation_stats"]["total_interactions"], 2);
        assert_eq!(summary["conversation_stats"]["fallback_activations"], 1);
        assert_eq!(summary["tick_stats"]["total_steps"], 4);
    }
}
