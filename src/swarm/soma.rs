//! Soma：执行中枢
//!
//! 持有团队注册表（单把异步读写锁），所有外部输入先经 Guard 再交给 Axon 路由；
//! 负责团队的创建、列举、按任务停用、全体广播与整体关闭。蓝图激活见 activation.rs。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::bus::MessageBus;
use crate::config::AppConfig;
use crate::core::{ShutdownCleanup, SwarmError};
use crate::governance::{Guard, IngressGuard};
use crate::llm::Brain;
use crate::protocol::{topics, BroadcastReply, TeamManifest};
use crate::swarm::axon::Axon;
use crate::swarm::team::{Team, TeamContext};
use crate::tools::{register_builtin_tools, CompositeToolExecutor, SwarmControl, ToolDispatch, ToolRegistry};

/// Soma 构建器：统一装配总线、Guard、Brain 与工具层
pub struct SomaBuilder {
    config: AppConfig,
    bus: Arc<dyn MessageBus>,
    guard: Option<Arc<dyn IngressGuard>>,
    brain: Option<Arc<dyn Brain>>,
    external: Option<Arc<dyn ToolDispatch>>,
    server_names: HashMap<Uuid, String>,
}

impl SomaBuilder {
    pub fn new(config: AppConfig, bus: Arc<dyn MessageBus>) -> Self {
        Self {
            config,
            bus,
            guard: None,
            brain: None,
            external: None,
            server_names: HashMap::new(),
        }
    }

    /// 未设置时使用按 [guard] 段构造的默认 Guard
    pub fn with_guard(mut self, guard: Arc<dyn IngressGuard>) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn with_brain(mut self, brain: Arc<dyn Brain>) -> Self {
        self.brain = Some(brain);
        self
    }

    /// 接入外部 capability server 池；server_names 用于 agent 的工具范围校验
    pub fn with_external_tools(
        mut self,
        external: Arc<dyn ToolDispatch>,
        server_names: HashMap<Uuid, String>,
    ) -> Self {
        self.external = Some(external);
        self.server_names = server_names;
        self
    }

    /// 根 token 由 parent 派生（通常是 ShutdownManager 的 token）
    pub fn build(self, parent: &CancellationToken) -> Arc<Soma> {
        let guard = self
            .guard
            .unwrap_or_else(|| Arc::new(Guard::from_config(&self.config.guard)));

        Arc::new_cyclic(|weak: &Weak<Soma>| {
            let control: Weak<dyn SwarmControl> = weak.clone();
            let mut registry = ToolRegistry::new();
            register_builtin_tools(&mut registry, self.bus.clone(), control, &self.config.tools);
            let descriptions = registry.descriptions();
            let composite = CompositeToolExecutor::new(
                Arc::new(registry),
                self.external,
                self.config.tools.tool_timeout_secs,
            );

            let mut team_ctx = TeamContext::new(self.bus.clone())
                .with_tools(Arc::new(composite), descriptions)
                .with_swarm_settings(&self.config.swarm);
            team_ctx.server_names = Arc::new(self.server_names);
            team_ctx.sensor = self.config.sensor.clone();
            if let Some(brain) = self.brain {
                team_ctx = team_ctx.with_brain(brain);
            }

            Soma {
                id: Uuid::new_v4().to_string(),
                axon: Axon::new(self.bus.clone(), &self.config.swarm),
                bus: self.bus,
                guard,
                team_ctx,
                teams: RwLock::new(HashMap::new()),
                token: parent.child_token(),
                broadcast_timeout: self.config.swarm.broadcast_timeout(),
                tasks: Mutex::new(Vec::new()),
            }
        })
    }
}

pub struct Soma {
    id: String,
    bus: Arc<dyn MessageBus>,
    guard: Arc<dyn IngressGuard>,
    axon: Axon,
    pub(crate) team_ctx: TeamContext,
    pub(crate) teams: RwLock<HashMap<String, Team>>,
    pub(crate) token: CancellationToken,
    broadcast_timeout: Duration,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Soma {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn bus(&self) -> &Arc<dyn MessageBus> {
        &self.bus
    }

    pub fn axon(&self) -> &Axon {
        &self.axon
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// 上线：先启动常驻团队，再订阅全局入口与广播主题并启动 Axon。
    /// 常驻团队启动失败只记日志。
    pub async fn start(self: &Arc<Self>, standing: Vec<TeamManifest>) -> Result<(), SwarmError> {
        tracing::info!(soma = %self.id, "Soma online, listening for input");

        for manifest in standing {
            let id = manifest.id.clone();
            if let Err(e) = self.spawn_team(manifest).await {
                tracing::error!(team = %id, error = %e, "Failed to start standing team");
            }
        }

        let ingress = self.spawn_ingress().await?;
        let activity = self.axon.start(self.token.child_token()).await?;
        let fanout = self.spawn_broadcast_fanout().await?;

        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.extend([ingress, activity, fanout]);
        }
        Ok(())
    }

    async fn spawn_ingress(self: &Arc<Self>) -> Result<JoinHandle<()>, SwarmError> {
        let mut sub = self.bus.subscribe(topics::GLOBAL_INPUT_WILDCARD).await?;
        let weak = Arc::downgrade(self);
        let token = self.token.clone();

        Ok(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    msg = sub.next() => {
                        let Some(msg) = msg else { break };
                        let Some(soma) = weak.upgrade() else { break };
                        soma.handle_global_input(&msg.subject, msg.payload).await;
                    }
                }
            }
        }))
    }

    /// Guard 拒绝的输入直接丢弃
    pub async fn handle_global_input(&self, subject: &str, payload: Vec<u8>) {
        if let Err(e) = self.guard.validate_ingress(subject, &payload) {
            tracing::warn!(subject, error = %e, "Guard blocked input");
            return;
        }
        tracing::info!(subject, payload = %String::from_utf8_lossy(&payload), "Soma received input");
        if let Err(e) = self.axon.process_signal(payload).await {
            tracing::warn!(subject, error = %e, "Axon routing failed");
        }
    }

    /// `swarm.global.broadcast` 上的消息原样投递到每个团队的触发主题
    async fn spawn_broadcast_fanout(self: &Arc<Self>) -> Result<JoinHandle<()>, SwarmError> {
        let mut sub = self.bus.subscribe(topics::GLOBAL_BROADCAST).await?;
        let weak = Arc::downgrade(self);
        let token = self.token.clone();

        Ok(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    msg = sub.next() => {
                        let Some(msg) = msg else { break };
                        let Some(soma) = weak.upgrade() else { break };
                        for id in soma.team_ids().await {
                            if let Err(e) = soma.bus.publish(&topics::team_trigger(&id), msg.payload.clone()).await {
                                tracing::warn!(team = %id, error = %e, "Broadcast fan-out failed");
                            }
                        }
                    }
                }
            }
        }))
    }

    /// 非幂等：同 id 团队已存在时返回 TeamExists
    pub async fn spawn_team(&self, manifest: TeamManifest) -> Result<(), SwarmError> {
        let mut teams = self.teams.write().await;
        if teams.contains_key(&manifest.id) {
            return Err(SwarmError::TeamExists(manifest.id));
        }

        let id = manifest.id.clone();
        let mut team = Team::new(manifest, self.team_ctx.clone(), &self.token);
        team.start().await?;
        teams.insert(id.clone(), team);
        tracing::info!(team = %id, "Soma spawned team");
        Ok(())
    }

    /// 活跃团队清单快照
    pub async fn list_teams(&self) -> Vec<TeamManifest> {
        self.teams
            .read()
            .await
            .values()
            .map(|t| t.manifest().clone())
            .collect()
    }

    pub async fn team_count(&self) -> usize {
        self.teams.read().await.len()
    }

    pub async fn has_team(&self, id: &str) -> bool {
        self.teams.read().await.contains_key(id)
    }

    async fn team_ids(&self) -> Vec<String> {
        self.teams.read().await.keys().cloned().collect()
    }

    /// 停止并移除 id 以 `<mission_id>.` 开头的所有团队，返回数量
    pub async fn deactivate_mission(&self, mission_id: &str) -> usize {
        let prefix = format!("{}.", mission_id);
        let mut teams = self.teams.write().await;
        let ids: Vec<String> = teams
            .keys()
            .filter(|id| id.starts_with(&prefix))
            .cloned()
            .collect();
        for id in &ids {
            if let Some(team) = teams.remove(id) {
                team.stop();
            }
        }
        if !ids.is_empty() {
            tracing::info!(mission = mission_id, stopped = ids.len(), "Mission deactivated");
        }
        ids.len()
    }

    /// 并发向每个团队的触发主题发起请求，逐个收集应答（顺序按团队 id 排序）
    pub async fn broadcast(&self, content: &str, timeout: Duration) -> Vec<BroadcastReply> {
        let mut ids = self.team_ids().await;
        ids.sort();

        let requests = ids.into_iter().map(|team_id| async move {
            let subject = topics::team_trigger(&team_id);
            tracing::info!(team = %team_id, subject = %subject, "Broadcast request");
            match self
                .bus
                .request(&subject, content.as_bytes().to_vec(), timeout)
                .await
            {
                Ok(reply) => BroadcastReply {
                    content: reply.payload_str().into_owned(),
                    team_id,
                    error: None,
                },
                Err(e) => {
                    tracing::warn!(team = %team_id, error = %e, "Team did not respond to broadcast");
                    BroadcastReply {
                        team_id,
                        content: String::new(),
                        error: Some(e.to_string()),
                    }
                }
            }
        });
        join_all(requests).await
    }

    /// 停止全部团队并取消根 token
    pub async fn shutdown(&self) {
        // 先出锁再等待：actor 的工具调用可能正在读注册表
        let teams: Vec<(String, Team)> = self.teams.write().await.drain().collect();
        for (_, team) in &teams {
            team.stop();
        }
        for (id, team) in teams {
            tracing::info!(team = %id, "Soma shutting down team");
            team.shutdown().await;
        }
        self.token.cancel();

        let tasks: Vec<JoinHandle<()>> = match self.tasks.lock() {
            Ok(mut tasks) => tasks.drain(..).collect(),
            Err(poisoned) => poisoned.into_inner().drain(..).collect(),
        };
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!(soma = %self.id, error = %e, "Soma task ended abnormally");
            }
        }
        tracing::info!(soma = %self.id, "Soma offline");
    }
}

#[async_trait]
impl SwarmControl for Soma {
    async fn team_manifests(&self) -> Vec<TeamManifest> {
        self.list_teams().await
    }

    async fn broadcast_all(&self, content: &str) -> Vec<BroadcastReply> {
        self.broadcast(content, self.broadcast_timeout).await
    }
}

#[async_trait]
impl ShutdownCleanup for Soma {
    async fn cleanup(&self) -> anyhow::Result<()> {
        self.shutdown().await;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "soma"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryBus;
    use crate::llm::MockBrain;
    use crate::protocol::AgentManifest;

    fn team(id: &str, inputs: &[&str]) -> TeamManifest {
        TeamManifest {
            id: id.into(),
            name: id.into(),
            members: vec![AgentManifest {
                id: format!("{}-agent", id),
                role: "worker".into(),
                ..Default::default()
            }],
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn soma(bus: Arc<InMemoryBus>, brain: MockBrain) -> Arc<Soma> {
        SomaBuilder::new(AppConfig::default(), bus)
            .with_brain(Arc::new(brain))
            .build(&CancellationToken::new())
    }

    #[tokio::test]
    async fn test_spawn_team_rejects_duplicate() {
        let bus = Arc::new(InMemoryBus::new());
        let soma = soma(bus, MockBrain::new());

        soma.spawn_team(team("ops", &[])).await.unwrap();
        let err = soma.spawn_team(team("ops", &[])).await.unwrap_err();
        assert_eq!(err, SwarmError::TeamExists("ops".into()));
        assert_eq!(soma.team_count().await, 1);
        soma.shutdown().await;
    }

    #[tokio::test]
    async fn test_ingress_routed_through_guard_and_axon() {
        let bus = Arc::new(InMemoryBus::new());
        let mut command = bus.subscribe("swarm.team.genesis.internal.command").await.unwrap();
        let soma = soma(bus.clone(), MockBrain::new());
        soma.start(Vec::new()).await.unwrap();

        bus.publish(topics::GLOBAL_INPUT_USER, b"Hello Soma".to_vec()).await.unwrap();
        let msg = tokio::time::timeout(Duration::from_secs(1), command.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(msg.payload_str(), "Hello Soma");
        soma.shutdown().await;
    }

    #[tokio::test]
    async fn test_guard_drops_oversize_input() {
        let bus = Arc::new(InMemoryBus::new());
        let mut command = bus.subscribe("swarm.team.genesis.internal.command").await.unwrap();
        let soma = SomaBuilder::new(AppConfig::default(), bus.clone())
            .with_guard(Arc::new(Guard::new(4, vec![topics::GLOBAL_INPUT_PREFIX.to_string()])))
            .build(&CancellationToken::new());
        soma.start(Vec::new()).await.unwrap();

        bus.publish(topics::GLOBAL_INPUT_USER, b"far too long".to_vec()).await.unwrap();
        assert!(tokio::time::timeout(Duration::from_millis(100), command.next())
            .await
            .is_err());
        soma.shutdown().await;
    }

    #[tokio::test]
    async fn test_standing_team_receives_routed_command() {
        let bus = Arc::new(InMemoryBus::new());
        let mut responses = bus.subscribe("swarm.team.genesis.internal.response").await.unwrap();
        let soma = soma(bus.clone(), MockBrain::with_response("genesis here"));
        soma.start(vec![team("genesis", &["swarm.team.genesis.internal.command"])])
            .await
            .unwrap();

        bus.publish("swarm.global.input.cli", b"status?".to_vec()).await.unwrap();
        let msg = tokio::time::timeout(Duration::from_secs(1), responses.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(msg.payload_str(), "genesis here");
        soma.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_survives_panicked_background_task() {
        let bus = Arc::new(InMemoryBus::new());
        let soma = soma(bus, MockBrain::new());
        soma.start(Vec::new()).await.unwrap();
        soma.tasks
            .lock()
            .unwrap()
            .push(tokio::spawn(async { panic!("background task failed") }));

        soma.shutdown().await;
        assert!(soma.token().is_cancelled());
        assert!(soma.tasks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deactivate_mission_only_matching_prefix() {
        let bus = Arc::new(InMemoryBus::new());
        let soma = soma(bus, MockBrain::new());
        soma.spawn_team(team("m1.alpha", &[])).await.unwrap();
        soma.spawn_team(team("m1.beta", &[])).await.unwrap();
        soma.spawn_team(team("m10.alpha", &[])).await.unwrap();

        assert_eq!(soma.deactivate_mission("m1").await, 2);
        assert_eq!(soma.team_count().await, 1);
        assert!(soma.has_team("m10.alpha").await);
        assert_eq!(soma.deactivate_mission("m1").await, 0);
        soma.shutdown().await;
    }

    #[tokio::test]
    async fn test_broadcast_collects_reply_per_team() {
        let bus = Arc::new(InMemoryBus::new());
        let soma = soma(bus, MockBrain::with_response("ack"));
        soma.spawn_team(team("a", &[])).await.unwrap();
        soma.spawn_team(team("b", &[])).await.unwrap();

        let replies = soma.broadcast("status?", Duration::from_secs(1)).await;
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0].team_id, "a");
        assert!(replies.iter().all(|r| r.content == "ack" && r.error.is_none()));
        soma.shutdown().await;
    }

    #[tokio::test]
    async fn test_list_teams_tool_sees_registry() {
        let bus = Arc::new(InMemoryBus::new());
        let soma = soma(bus, MockBrain::new());
        soma.spawn_team(team("ops", &[])).await.unwrap();

        let (server, name) = soma
            .team_ctx
            .tools
            .as_ref()
            .unwrap()
            .find_tool_by_name("list_teams")
            .await
            .unwrap();
        assert!(server.is_internal());
        let out = soma
            .team_ctx
            .tools
            .as_ref()
            .unwrap()
            .call_tool(server, &name, serde_json::json!({}))
            .await
            .unwrap();
        assert!(out.contains("\"id\":\"ops\""));
        soma.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_everything() {
        let bus = Arc::new(InMemoryBus::new());
        let soma = soma(bus, MockBrain::new());
        soma.start(vec![team("genesis", &[])]).await.unwrap();
        assert_eq!(soma.team_count().await, 1);

        soma.shutdown().await;
        assert_eq!(soma.team_count().await, 0);
        assert!(soma.token().is_cancelled());
    }
}
