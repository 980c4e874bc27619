//! 轮询型 actor
//!
//! 两个循环：心跳，以及按 interval 轮询（启动即轮询一次）。http_poll 且配置了 endpoint 时发起
//! 有界 HTTP GET，否则产出固定的 heartbeat_only 负载。成功时在团队遥测主题发布 sensor_data 信封，
//! 并把原始负载写到 agent 的每个 output 主题；失败只影响本轮，发布一条 error 信封后继续。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::bus::MessageBus;
use crate::config::SensorSection;
use crate::protocol::{topics, AgentManifest, CtsEnvelope, SignalType, TRUST_SCORE_SENSORY};
use crate::swarm::agent::spawn_heartbeat;

/// 没有外部端点时的固定负载
pub const HEARTBEAT_ONLY_PAYLOAD: &[u8] = br#"{"status":"online","mode":"heartbeat_only"}"#;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorType {
    #[default]
    HttpPoll,
    Internal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorConfig {
    #[serde(rename = "type", default)]
    pub sensor_type: SensorType,
    #[serde(default)]
    pub endpoint: String,
    /// 为空时使用 [sensor].default_interval_secs
    #[serde(default, with = "humantime_serde")]
    pub interval: Option<Duration>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl SensorConfig {
    /// 角色名含 "sensor" 但没有显式配置时的默认值
    pub fn heartbeat_only() -> Self {
        Self {
            sensor_type: SensorType::Internal,
            ..Default::default()
        }
    }

    fn polls_http(&self) -> bool {
        self.sensor_type == SensorType::HttpPoll && !self.endpoint.is_empty()
    }
}

pub struct SensorAgent {
    manifest: AgentManifest,
    team_id: String,
    config: SensorConfig,
    bus: Arc<dyn MessageBus>,
    client: reqwest::Client,
    settings: SensorSection,
    heartbeat_interval: Duration,
    token: CancellationToken,
}

impl SensorAgent {
    pub fn new(
        manifest: AgentManifest,
        team_id: &str,
        config: SensorConfig,
        bus: Arc<dyn MessageBus>,
        settings: SensorSection,
        parent: &CancellationToken,
    ) -> Self {
        Self {
            manifest,
            team_id: team_id.to_string(),
            config,
            bus,
            client: reqwest::Client::new(),
            settings,
            heartbeat_interval: Duration::from_secs(5),
            token: parent.child_token(),
        }
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn id(&self) -> &str {
        &self.manifest.id
    }

    pub fn poll_interval(&self) -> Duration {
        self.config
            .interval
            .filter(|d| !d.is_zero())
            .unwrap_or_else(|| self.settings.default_interval())
    }

    pub fn start(self: Arc<Self>) -> Vec<JoinHandle<()>> {
        tracing::info!(
            sensor = %self.manifest.id,
            team = %self.team_id,
            sensor_type = ?self.config.sensor_type,
            endpoint = %self.config.endpoint,
            interval = ?self.poll_interval(),
            "Sensor started"
        );

        let heartbeat = spawn_heartbeat(
            self.bus.clone(),
            self.manifest.id.clone(),
            self.team_id.clone(),
            self.heartbeat_interval,
            self.token.clone(),
        );
        let poller = tokio::spawn(async move { self.poll_loop().await });
        vec![heartbeat, poller]
    }

    pub fn stop(&self) {
        self.token.cancel();
    }

    async fn poll_loop(&self) {
        let mut ticker = tokio::time::interval(self.poll_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = self.token.cancelled() => {
                    tracing::info!(sensor = %self.manifest.id, "Sensor stopped");
                    break;
                }
                _ = ticker.tick() => self.poll_once().await,
            }
        }
    }

    /// 执行一轮轮询并发布结果
    pub async fn poll_once(&self) {
        match self.fetch().await {
            Ok(body) => self.publish_data(body).await,
            Err(e) => {
                tracing::warn!(sensor = %self.manifest.id, error = %e, "Sensor poll failed");
                self.publish_telemetry(SignalType::Error, serde_json::json!({ "error": e }))
                    .await;
            }
        }
    }

    async fn fetch(&self) -> Result<Vec<u8>, String> {
        if !self.config.polls_http() {
            return Ok(HEARTBEAT_ONLY_PAYLOAD.to_vec());
        }

        let mut req = self
            .client
            .get(&self.config.endpoint)
            .timeout(Duration::from_secs(self.settings.http_timeout_secs));
        for (key, value) in &self.config.headers {
            req = req.header(key, value);
        }

        let mut resp = req.send().await.map_err(|e| format!("request failed: {}", e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(format!("unexpected status {}", status));
        }

        let limit = self.settings.max_body_bytes;
        if resp.content_length().is_some_and(|len| len as usize > limit) {
            return Err(format!("response body exceeds {} bytes", limit));
        }
        let mut body = Vec::new();
        while let Some(chunk) = resp
            .chunk()
            .await
            .map_err(|e| format!("reading body failed: {}", e))?
        {
            if body.len() + chunk.len() > limit {
                return Err(format!("response body exceeds {} bytes", limit));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }

    async fn publish_data(&self, body: Vec<u8>) {
        let payload = serde_json::from_slice::<Value>(&body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into_owned()));
        self.publish_telemetry(SignalType::SensorData, payload).await;

        for output in &self.manifest.outputs {
            if let Err(e) = self.bus.publish(output, body.clone()).await {
                tracing::warn!(sensor = %self.manifest.id, subject = %output, error = %e, "Sensor output publish failed");
            }
        }
    }

    async fn publish_telemetry(&self, signal: SignalType, payload: Value) {
        let envelope = CtsEnvelope::new(&self.manifest.id, signal, TRUST_SCORE_SENSORY, payload);
        let bytes = match envelope.to_bytes() {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(sensor = %self.manifest.id, error = %e, "Envelope encode failed");
                return;
            }
        };
        if let Err(e) = self
            .bus
            .publish(&topics::team_telemetry(&self.team_id), bytes)
            .await
        {
            tracing::warn!(sensor = %self.manifest.id, error = %e, "Telemetry publish failed");
        }
    }
}
