//! 蜂群运行时集成测试：激活、桥接、工具调度、按任务停用

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::Value;
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    use swarm::bus::{InMemoryBus, MessageBus, Subscription};
    use swarm::config::AppConfig;
    use swarm::llm::MockBrain;
    use swarm::protocol::{AgentManifest, BlueprintTeam, MissionBlueprint};
    use swarm::swarm::{Soma, SomaBuilder};
    use swarm::tools::{ScopedToolExecutor, ServerId, ToolDispatch};
    use swarm::SwarmError;

    fn agent(id: &str, inputs: &[&str], outputs: &[&str], tools: &[&str]) -> AgentManifest {
        AgentManifest {
            id: id.into(),
            role: "analyst".into(),
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
            tools: tools.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn parallel_blueprint(teams: usize) -> MissionBlueprint {
        MissionBlueprint {
            mission_id: "mission-parallel".into(),
            intent: "parallel activation".into(),
            teams: (0..teams)
                .map(|i| BlueprintTeam {
                    name: format!("Team {}", i),
                    role: "worker".into(),
                    agents: vec![agent(&format!("worker-{}", i), &[], &[], &[])],
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    async fn recv(sub: &mut Subscription) -> String {
        tokio::time::timeout(Duration::from_secs(2), sub.next())
            .await
            .expect("timed out waiting for message")
            .expect("subscription closed")
            .payload_str()
            .into_owned()
    }

    /// 外部 capability server：weather 与 danger 两个 server
    struct FakeServers {
        weather: Uuid,
        danger: Uuid,
        calls: AtomicUsize,
    }

    impl FakeServers {
        fn new() -> Self {
            Self {
                weather: Uuid::new_v4(),
                danger: Uuid::new_v4(),
                calls: AtomicUsize::new(0),
            }
        }

        fn names(&self) -> HashMap<Uuid, String> {
            HashMap::from([
                (self.weather, "weather".to_string()),
                (self.danger, "danger".to_string()),
            ])
        }
    }

    #[async_trait]
    impl ToolDispatch for FakeServers {
        async fn find_tool_by_name(&self, name: &str) -> Result<(ServerId, String), SwarmError> {
            match name {
                "forecast" => Ok((ServerId::External(self.weather), name.to_string())),
                "delete_all" => Ok((ServerId::External(self.danger), name.to_string())),
                _ => Err(SwarmError::ToolNotFound(name.to_string())),
            }
        }

        async fn call_tool(&self, _server: ServerId, name: &str, _args: Value) -> Result<String, SwarmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("{}: sunny, 21C", name))
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_activation_spawns_each_team_once() {
        let bus = Arc::new(InMemoryBus::new());
        let soma = SomaBuilder::new(AppConfig::default(), bus).build(&CancellationToken::new());
        let blueprint = Arc::new(parallel_blueprint(3));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let soma = soma.clone();
                let blueprint = blueprint.clone();
                tokio::spawn(async move { soma.activate_blueprint(&blueprint, &HashMap::new()).await })
            })
            .collect();

        let mut spawned = 0;
        let mut skipped = 0;
        for handle in handles {
            let result = handle.await.unwrap();
            assert!(result.errors.is_empty());
            spawned += result.teams_spawned;
            skipped += result.teams_skipped;
        }
        assert_eq!(spawned, 3);
        assert_eq!(skipped, 8 * 3 - 3);
        assert_eq!(soma.team_count().await, 3);
        soma.shutdown().await;
    }

    #[tokio::test]
    async fn test_activated_team_bridges_inputs_and_deliveries() {
        let bus = Arc::new(InMemoryBus::new());
        let mut z = bus.subscribe("reports.z").await.unwrap();
        let soma = SomaBuilder::new(AppConfig::default(), bus.clone())
            .with_brain(Arc::new(MockBrain::new()))
            .build(&CancellationToken::new());

        let blueprint = MissionBlueprint {
            mission_id: "mission-alpha".into(),
            teams: vec![BlueprintTeam {
                name: "Alpha".into(),
                role: "analysis".into(),
                agents: vec![
                    agent("a1", &["jobs.alpha"], &["reports.x", "reports.y"], &[]),
                    agent("a2", &[], &["reports.y", "reports.z"], &[]),
                ],
                ..Default::default()
            }],
            ..Default::default()
        };
        let result = soma.activate_blueprint(&blueprint, &HashMap::new()).await;
        assert_eq!(result.teams_spawned, 1);

        bus.publish("jobs.alpha", b"summarize".to_vec()).await.unwrap();
        assert_eq!(recv(&mut z).await, "Echo from Mock: summarize");
        soma.shutdown().await;
    }

    #[tokio::test]
    async fn test_agent_uses_internal_tool_in_react_loop() {
        let bus = Arc::new(InMemoryBus::new());
        let brain = Arc::new(MockBrain::scripted(vec![
            r#"{"tool_call": {"name": "list_teams", "arguments": {}}}"#.into(),
            "One team is active.".into(),
        ]));
        let soma = SomaBuilder::new(AppConfig::default(), bus.clone())
            .with_brain(brain.clone())
            .build(&CancellationToken::new());
        let mut blueprint = parallel_blueprint(1);
        blueprint.teams[0].agents[0].tools = vec!["list_teams".into()];
        soma.activate_blueprint(&blueprint, &HashMap::new()).await;

        let mut responses = bus
            .subscribe("swarm.team.mission-parallel.team-0.internal.response")
            .await
            .unwrap();
        bus.publish("swarm.team.mission-parallel.team-0.internal.trigger", b"how many teams?".to_vec())
            .await
            .unwrap();

        assert_eq!(recv(&mut responses).await, "One team is active.");
        let prompts = brain.prompts();
        assert!(prompts[0].contains("## Available Tools"));
        assert!(prompts[1].contains("Tool result from list_teams:"));
        assert!(prompts[1].contains("mission-parallel.team-0"));
        soma.shutdown().await;
    }

    #[tokio::test]
    async fn test_agent_scope_limits_external_tools() {
        let bus = Arc::new(InMemoryBus::new());
        let servers = Arc::new(FakeServers::new());
        let brain = Arc::new(MockBrain::scripted(vec![
            r#"{"tool_call": {"name": "forecast", "arguments": {"city": "Oslo"}}}"#.into(),
            "It is sunny.".into(),
        ]));
        let soma = SomaBuilder::new(AppConfig::default(), bus.clone())
            .with_brain(brain)
            .with_external_tools(servers.clone(), servers.names())
            .build(&CancellationToken::new());
        let mut blueprint = parallel_blueprint(1);
        blueprint.teams[0].agents[0].tools = vec!["mcp:weather/forecast".into()];
        soma.activate_blueprint(&blueprint, &HashMap::new()).await;

        let reply = bus
            .request(
                "swarm.council.worker-0.request",
                b"weather?".to_vec(),
                Duration::from_secs(2),
            )
            .await
            .unwrap();
        assert_eq!(reply.payload_str(), "It is sunny.");
        assert_eq!(servers.calls.load(Ordering::SeqCst), 1);
        soma.shutdown().await;

        let scoped = ScopedToolExecutor::for_agent(
            servers.clone(),
            &["mcp:weather/forecast".to_string()],
            Arc::new(servers.names()),
        );
        let err = scoped.find_tool_by_name("delete_all").await.unwrap_err();
        assert_eq!(
            err,
            SwarmError::ToolNotAuthorized {
                tool: "delete_all".into(),
                server: "danger".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_deactivate_then_reactivate_mission() {
        let bus = Arc::new(InMemoryBus::new());
        let soma: Arc<Soma> = SomaBuilder::new(AppConfig::default(), bus).build(&CancellationToken::new());

        assert_eq!(soma.activate_blueprint(&parallel_blueprint(2), &HashMap::new()).await.teams_spawned, 2);
        assert_eq!(soma.deactivate_mission("mission-parallel").await, 2);
        assert_eq!(soma.team_count().await, 0);

        let again = soma.activate_blueprint(&parallel_blueprint(2), &HashMap::new()).await;
        assert_eq!(again.teams_spawned, 2);
        assert_eq!(again.teams_skipped, 0);
        soma.shutdown().await;
    }

    #[tokio::test]
    async fn test_global_broadcast_reaches_every_team() {
        let bus = Arc::new(InMemoryBus::new());
        let mut responses = bus.subscribe("swarm.team.*.*.internal.response").await.unwrap();
        let soma = SomaBuilder::new(AppConfig::default(), bus.clone())
            .with_brain(Arc::new(MockBrain::new()))
            .build(&CancellationToken::new());
        soma.start(Vec::new()).await.unwrap();
        soma.activate_blueprint(&parallel_blueprint(2), &HashMap::new()).await;

        bus.publish("swarm.global.broadcast", b"all hands".to_vec()).await.unwrap();
        for _ in 0..2 {
            assert_eq!(recv(&mut responses).await, "Echo from Mock: all hands");
        }
        soma.shutdown().await;
    }
}
