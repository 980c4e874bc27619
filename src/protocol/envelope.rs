//! 遥测信封与心跳信封
//!
//! 所有 `swarm.team.<id>.telemetry` 上的消息都必须是 CtsEnvelope；
//! trust_score 由节点类别决定：传感器报告事实，默认完全可信。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::core::SwarmError;

pub const TRUST_SCORE_SENSORY: f64 = 1.0;
pub const TRUST_SCORE_COGNITIVE: f64 = 0.5;
pub const TRUST_SCORE_ACTUATION: f64 = 0.8;
pub const TRUST_SCORE_LEDGER: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    Telemetry,
    TaskComplete,
    TaskFailed,
    Error,
    Heartbeat,
    GovernanceHalt,
    SensorData,
    ChatResponse,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CtsMeta {
    pub source_node: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub trace_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CtsEnvelope {
    pub meta: CtsMeta,
    pub signal_type: SignalType,
    #[serde(default)]
    pub trust_score: f64,
    pub payload: Value,
}

impl CtsEnvelope {
    /// 以当前时间构造信封
    pub fn new(source_node: &str, signal_type: SignalType, trust_score: f64, payload: Value) -> Self {
        Self {
            meta: CtsMeta {
                source_node: source_node.to_string(),
                timestamp: Utc::now(),
                trace_id: String::new(),
            },
            signal_type,
            trust_score,
            payload,
        }
    }

    /// 0.0 视为未评分，下游按节点类别取默认值
    pub fn has_trust_score(&self) -> bool {
        self.trust_score > 0.0
    }

    pub fn validate(&self) -> Result<(), SwarmError> {
        if self.meta.source_node.is_empty() {
            return Err(SwarmError::InvalidEnvelope("meta.source_node is required".into()));
        }
        if self.meta.timestamp == DateTime::<Utc>::default() {
            return Err(SwarmError::InvalidEnvelope("meta.timestamp is required".into()));
        }
        if self.payload.is_null() {
            return Err(SwarmError::InvalidEnvelope("payload is required".into()));
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, SwarmError> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// 心跳事件名
pub const HEARTBEAT_EVENT: &str = "agent.heartbeat";

/// `swarm.global.heartbeat` 上的固定结构
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatEnvelope {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub source_agent_id: String,
    pub message_type: String,
    pub team_id: String,
    pub event_type: String,
}

impl HeartbeatEnvelope {
    pub fn new(agent_id: &str, team_id: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            source_agent_id: agent_id.to_string(),
            message_type: "event".to_string(),
            team_id: team_id.to_string(),
            event_type: HEARTBEAT_EVENT.to_string(),
        }
    }
}

/// 广播中单个团队的应答
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastReply {
    pub team_id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
