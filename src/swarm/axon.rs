//! Axon：入口信号路由
//!
//! 无状态：根据负载决定目标主题并转发。另外监听所有团队的内部总线，
//! 把每条内部消息转成活动事件广播给本地订阅者（例如 CLI 或管理端）。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::bus::MessageBus;
use crate::config::SwarmSection;
use crate::core::SwarmError;
use crate::protocol::topics;

/// 活动流缓冲条数；慢订阅者会丢失最旧的事件
const ACTIVITY_BUFFER: usize = 256;

/// 触发状态路由的负载
pub const STATUS_SIGNAL: &str = "system_status";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub topic: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

pub struct Axon {
    bus: Arc<dyn MessageBus>,
    default_team: String,
    status_team: String,
    activity: broadcast::Sender<ActivityEvent>,
}

impl Axon {
    pub fn new(bus: Arc<dyn MessageBus>, settings: &SwarmSection) -> Self {
        let (activity, _) = broadcast::channel(ACTIVITY_BUFFER);
        Self {
            bus,
            default_team: settings.default_team.clone(),
            status_team: settings.status_team.clone(),
            activity,
        }
    }

    /// 负载 → 目标主题
    pub fn route(&self, payload: &[u8]) -> String {
        if String::from_utf8_lossy(payload).trim() == STATUS_SIGNAL {
            topics::team_signal_status(&self.status_team)
        } else {
            topics::team_command(&self.default_team)
        }
    }

    pub async fn process_signal(&self, payload: Vec<u8>) -> Result<String, SwarmError> {
        let target = self.route(&payload);
        self.bus.publish(&target, payload).await?;
        tracing::debug!(target = %target, "Axon routed signal");
        Ok(target)
    }

    pub fn subscribe_activity(&self) -> broadcast::Receiver<ActivityEvent> {
        self.activity.subscribe()
    }

    /// 监听 `swarm.team.*.internal.>` 并转为活动事件
    pub async fn start(&self, token: CancellationToken) -> Result<JoinHandle<()>, SwarmError> {
        let mut sub = self.bus.subscribe(topics::TEAM_INTERNAL_WILDCARD).await?;
        let activity = self.activity.clone();
        tracing::info!(pattern = topics::TEAM_INTERNAL_WILDCARD, "Axon listening");

        Ok(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    msg = sub.next() => {
                        let Some(msg) = msg else { break };
                        let event = ActivityEvent {
                            kind: "activity".to_string(),
                            message: msg.payload_str().into_owned(),
                            topic: msg.subject,
                            timestamp: Utc::now(),
                        };
                        // 没有订阅者时 send 返回 Err，忽略
                        let _ = activity.send(event);
                    }
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryBus;
    use std::time::Duration;

    #[test]
    fn test_route() {
        let bus = Arc::new(InMemoryBus::new());
        let axon = Axon::new(bus, &SwarmSection::default());
        assert_eq!(axon.route(b"hello"), "swarm.team.genesis.internal.command");
        assert_eq!(axon.route(b"system_status"), "swarm.team.telemetry.signal.status");
        assert_eq!(axon.route(b" system_status\n"), "swarm.team.telemetry.signal.status");
    }

    #[tokio::test]
    async fn test_process_signal_publishes_to_route() {
        let bus = Arc::new(InMemoryBus::new());
        let mut sub = bus.subscribe("swarm.team.genesis.internal.command").await.unwrap();
        let axon = Axon::new(bus.clone(), &SwarmSection::default());

        let target = axon.process_signal(b"Hello Soma".to_vec()).await.unwrap();
        assert_eq!(target, "swarm.team.genesis.internal.command");
        let msg = sub.next().await.unwrap();
        assert_eq!(msg.payload_str(), "Hello Soma");
    }

    #[tokio::test]
    async fn test_activity_stream() {
        let bus = Arc::new(InMemoryBus::new());
        let axon = Axon::new(bus.clone(), &SwarmSection::default());
        let mut events = axon.subscribe_activity();
        let token = CancellationToken::new();
        let handle = axon.start(token.clone()).await.unwrap();

        bus.publish("swarm.team.ops.internal.response", b"done".to_vec())
            .await
            .unwrap();
        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.kind, "activity");
        assert_eq!(event.topic, "swarm.team.ops.internal.response");
        assert_eq!(event.message, "done");

        token.cancel();
        handle.await.unwrap();
    }
}
