//! 团队：持有成员 actor，把外部触发桥接到团队内部总线
//!
//! 生命周期由一个 CancellationToken 表示（Soma 根 token 的子 token）；取消即停止全部成员、
//! 桥接任务与调度器。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::bus::{MessageBus, Subscription};
use crate::config::{SensorSection, SwarmSection};
use crate::core::SwarmError;
use crate::llm::Brain;
use crate::protocol::{topics, TeamManifest};
use crate::swarm::agent::Agent;
use crate::swarm::scheduler::TeamScheduler;
use crate::swarm::sensor::{SensorAgent, SensorConfig};
use crate::tools::{ScopedToolExecutor, ToolDispatch};

/// 构造团队所需的共享依赖
#[derive(Clone)]
pub struct TeamContext {
    pub bus: Arc<dyn MessageBus>,
    pub brain: Option<Arc<dyn Brain>>,
    /// 组合执行器；每个 agent 会在其上包一层 ScopedToolExecutor
    pub tools: Option<Arc<dyn ToolDispatch>>,
    pub tool_descriptions: Arc<HashMap<String, String>>,
    pub server_names: Arc<HashMap<Uuid, String>>,
    pub heartbeat_interval: Duration,
    pub min_schedule_interval: Duration,
    pub sensor: SensorSection,
}

impl TeamContext {
    pub fn new(bus: Arc<dyn MessageBus>) -> Self {
        let swarm = SwarmSection::default();
        Self {
            bus,
            brain: None,
            tools: None,
            tool_descriptions: Arc::new(HashMap::new()),
            server_names: Arc::new(HashMap::new()),
            heartbeat_interval: swarm.heartbeat_interval(),
            min_schedule_interval: swarm.min_schedule_interval(),
            sensor: SensorSection::default(),
        }
    }

    pub fn with_brain(mut self, brain: Arc<dyn Brain>) -> Self {
        self.brain = Some(brain);
        self
    }

    pub fn with_tools(
        mut self,
        tools: Arc<dyn ToolDispatch>,
        descriptions: HashMap<String, String>,
    ) -> Self {
        self.tools = Some(tools);
        self.tool_descriptions = Arc::new(descriptions);
        self
    }

    pub fn with_swarm_settings(mut self, swarm: &SwarmSection) -> Self {
        self.heartbeat_interval = swarm.heartbeat_interval();
        self.min_schedule_interval = swarm.min_schedule_interval();
        self
    }
}

pub struct Team {
    manifest: TeamManifest,
    ctx: TeamContext,
    token: CancellationToken,
    sensor_configs: HashMap<String, SensorConfig>,
    agents: Vec<Arc<Agent>>,
    sensors: Vec<Arc<SensorAgent>>,
    scheduler: Option<TeamScheduler>,
    tasks: Vec<JoinHandle<()>>,
    started: bool,
}

impl Team {
    pub fn new(manifest: TeamManifest, ctx: TeamContext, parent: &CancellationToken) -> Self {
        Self {
            manifest,
            ctx,
            token: parent.child_token(),
            sensor_configs: HashMap::new(),
            agents: Vec::new(),
            sensors: Vec::new(),
            scheduler: None,
            tasks: Vec::new(),
            started: false,
        }
    }

    /// agent id → 传感器配置；命中的成员以 SensorAgent 启动
    pub fn set_sensor_configs(&mut self, configs: HashMap<String, SensorConfig>) {
        self.sensor_configs = configs;
    }

    pub fn manifest(&self) -> &TeamManifest {
        &self.manifest
    }

    pub fn id(&self) -> &str {
        &self.manifest.id
    }

    pub fn actor_count(&self) -> usize {
        self.agents.len() + self.sensors.len()
    }

    pub fn sensor_count(&self) -> usize {
        self.sensors.len()
    }

    pub fn has_scheduler(&self) -> bool {
        self.scheduler.is_some()
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 任一订阅失败时取消已启动的部分并返回 TeamStartFailed
    pub async fn start(&mut self) -> Result<(), SwarmError> {
        if self.started {
            return Ok(());
        }
        if let Err(e) = self.try_start().await {
            self.token.cancel();
            return Err(SwarmError::TeamStartFailed {
                team: self.manifest.id.clone(),
                reason: e.to_string(),
            });
        }
        self.started = true;
        tracing::info!(
            team = %self.manifest.id,
            actors = self.actor_count(),
            sensors = self.sensors.len(),
            inputs = ?self.manifest.inputs,
            "Team started"
        );
        Ok(())
    }

    async fn try_start(&mut self) -> Result<(), SwarmError> {
        let bus = self.ctx.bus.clone();
        let team_id = self.manifest.id.clone();

        let mut input_subs = Vec::with_capacity(self.manifest.inputs.len());
        for input in &self.manifest.inputs {
            input_subs.push(bus.subscribe(input).await?);
        }
        let response_sub = bus.subscribe(&topics::team_response(&team_id)).await?;

        for member in &self.manifest.members {
            if let Some(config) = self.sensor_configs.get(&member.id) {
                let sensor = Arc::new(
                    SensorAgent::new(
                        member.clone(),
                        &team_id,
                        config.clone(),
                        bus.clone(),
                        self.ctx.sensor.clone(),
                        &self.token,
                    )
                    .with_heartbeat_interval(self.ctx.heartbeat_interval),
                );
                self.tasks.extend(sensor.clone().start());
                self.sensors.push(sensor);
                continue;
            }

            let mut agent = Agent::new(
                member.clone(),
                &team_id,
                bus.clone(),
                self.ctx.brain.clone(),
                &self.token,
            )
            .with_heartbeat_interval(self.ctx.heartbeat_interval)
            .with_tool_descriptions(&self.ctx.tool_descriptions);
            if let Some(tools) = &self.ctx.tools {
                let scoped = ScopedToolExecutor::for_agent(
                    tools.clone(),
                    &member.tools,
                    self.ctx.server_names.clone(),
                );
                agent = agent.with_tools(Arc::new(scoped));
            }
            let agent = Arc::new(agent);
            self.tasks.extend(agent.clone().start().await?);
            self.agents.push(agent);
        }

        let trigger = topics::team_trigger(&team_id);
        for sub in input_subs {
            self.tasks.push(spawn_bridge(
                bus.clone(),
                sub,
                vec![trigger.clone()],
                self.token.clone(),
            ));
        }
        if !self.manifest.deliveries.is_empty() {
            self.tasks.push(spawn_bridge(
                bus.clone(),
                response_sub,
                self.manifest.deliveries.clone(),
                self.token.clone(),
            ));
        }

        self.start_scheduler();
        Ok(())
    }

    fn start_scheduler(&mut self) {
        let Some(schedule) = &self.manifest.schedule else {
            return;
        };
        let interval = match schedule.parse_interval() {
            Ok(Some(interval)) => interval,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(team = %self.manifest.id, error = %e, "Ignoring team schedule");
                return;
            }
        };
        if interval.is_zero() && self.ctx.min_schedule_interval.is_zero() {
            tracing::warn!(team = %self.manifest.id, "Ignoring zero schedule interval");
            return;
        }
        let interval = if interval < self.ctx.min_schedule_interval {
            tracing::warn!(
                team = %self.manifest.id,
                requested = ?interval,
                minimum = ?self.ctx.min_schedule_interval,
                "Schedule interval below minimum, clamping"
            );
            self.ctx.min_schedule_interval
        } else {
            interval
        };

        let scheduler = TeamScheduler::new(&self.manifest.id, interval, self.ctx.bus.clone(), &self.token);
        self.tasks.push(scheduler.start());
        self.scheduler = Some(scheduler);
    }

    pub fn stop(&self) {
        if !self.token.is_cancelled() {
            tracing::info!(team = %self.manifest.id, "Team stopping");
        }
        self.token.cancel();
    }

    /// 停止并等待全部任务退出
    pub async fn shutdown(mut self) {
        self.stop();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                tracing::warn!(team = %self.manifest.id, error = %e, "Team task ended abnormally");
            }
        }
    }
}

impl Drop for Team {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// 把一个订阅上的消息原样转发到若干目标主题
fn spawn_bridge(
    bus: Arc<dyn MessageBus>,
    mut sub: Subscription,
    targets: Vec<String>,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                msg = sub.next() => {
                    let Some(msg) = msg else { break };
                    for target in &targets {
                        if let Err(e) = bus.publish(target, msg.payload.clone()).await {
                            tracing::warn!(from = %msg.subject, to = %target, error = %e, "Bridge publish failed");
                        }
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryBus;
    use crate::llm::MockBrain;
    use crate::protocol::{AgentManifest, ScheduleConfig};

    fn manifest(inputs: &[&str], deliveries: &[&str]) -> TeamManifest {
        TeamManifest {
            id: "m1.alpha".into(),
            name: "Alpha".into(),
            members: vec![AgentManifest {
                id: "a1".into(),
                role: "analyst".into(),
                ..Default::default()
            }],
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            deliveries: deliveries.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    async fn recv(sub: &mut Subscription) -> String {
        tokio::time::timeout(Duration::from_secs(1), sub.next())
            .await
            .unwrap()
            .unwrap()
            .payload_str()
            .into_owned()
    }

    #[tokio::test]
    async fn test_input_bridged_to_trigger_unchanged() {
        let bus = Arc::new(InMemoryBus::new());
        let mut trigger = bus.subscribe("swarm.team.m1.alpha.internal.trigger").await.unwrap();
        let root = CancellationToken::new();
        let mut team = Team::new(manifest(&["news.raw"], &[]), TeamContext::new(bus.clone()), &root);
        team.start().await.unwrap();
        assert_eq!(team.actor_count(), 1);

        bus.publish("news.raw", b"{\"headline\":\"x\"}".to_vec()).await.unwrap();
        assert_eq!(recv(&mut trigger).await, "{\"headline\":\"x\"}");
        root.cancel();
        assert!(team.is_stopped());
    }

    #[tokio::test]
    async fn test_response_forwarded_to_deliveries() {
        let bus = Arc::new(InMemoryBus::new());
        let mut delivery = bus.subscribe("reports.daily").await.unwrap();
        let ctx = TeamContext::new(bus.clone())
            .with_brain(Arc::new(MockBrain::with_response("summary ready")));
        let root = CancellationToken::new();
        let mut team = Team::new(manifest(&["news.raw"], &["reports.daily"]), ctx, &root);
        team.start().await.unwrap();

        bus.publish("news.raw", b"go".to_vec()).await.unwrap();
        assert_eq!(recv(&mut delivery).await, "summary ready");
        team.shutdown().await;
    }

    #[tokio::test]
    async fn test_sensor_member_and_scheduler() {
        let bus = Arc::new(InMemoryBus::new());
        let mut trigger = bus.subscribe("swarm.team.m1.alpha.internal.trigger").await.unwrap();
        let mut m = manifest(&[], &[]);
        m.members.push(AgentManifest {
            id: "probe".into(),
            role: "Sensor".into(),
            ..Default::default()
        });
        m.schedule = Some(ScheduleConfig {
            kind: "interval".into(),
            interval: "1s".into(),
            ..Default::default()
        });

        let root = CancellationToken::new();
        let mut team = Team::new(m, TeamContext::new(bus.clone()), &root);
        team.set_sensor_configs(HashMap::from([("probe".to_string(), SensorConfig::heartbeat_only())]));
        team.start().await.unwrap();

        assert_eq!(team.actor_count(), 2);
        assert_eq!(team.sensor_count(), 1);
        assert!(team.has_scheduler());
        let payload: serde_json::Value = serde_json::from_str(&recv(&mut trigger).await).unwrap();
        assert_eq!(payload["triggered_by"], "scheduler");
        team.shutdown().await;
    }

    #[tokio::test]
    async fn test_zero_schedule_without_minimum_is_ignored() {
        let bus = Arc::new(InMemoryBus::new());
        let mut m = manifest(&[], &[]);
        m.schedule = Some(ScheduleConfig {
            kind: "interval".into(),
            interval: "0s".into(),
            ..Default::default()
        });
        let mut ctx = TeamContext::new(bus);
        ctx.min_schedule_interval = Duration::ZERO;

        let mut team = Team::new(m, ctx, &CancellationToken::new());
        team.start().await.unwrap();
        assert!(!team.has_scheduler());
        team.shutdown().await;
    }

    #[tokio::test]
    async fn test_bad_schedule_is_ignored() {
        let bus = Arc::new(InMemoryBus::new());
        let mut m = manifest(&[], &[]);
        m.schedule = Some(ScheduleConfig {
            kind: "interval".into(),
            interval: "soon".into(),
            ..Default::default()
        });
        let mut team = Team::new(m, TeamContext::new(bus), &CancellationToken::new());
        team.start().await.unwrap();
        assert!(!team.has_scheduler());
    }

    #[tokio::test]
    async fn test_invalid_input_fails_start() {
        let bus = Arc::new(InMemoryBus::new());
        let root = CancellationToken::new();
        let mut team = Team::new(manifest(&["bad..subject"], &[]), TeamContext::new(bus), &root);

        let err = team.start().await.unwrap_err();
        assert!(matches!(err, SwarmError::TeamStartFailed { ref team, .. } if team == "m1.alpha"));
        assert!(team.is_stopped());
        assert!(!root.is_cancelled());
    }
}
