//! 蜂群运行时错误类型
//!
//! 总线、激活、工具调度三类错误统一为 SwarmError；actor 内部的运行时错误只记日志，不经由此类型上抛。

use thiserror::Error;

/// 运行过程中可能出现的错误（总线、主题、超时、激活、工具授权等）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SwarmError {
    #[error("Bus unavailable")]
    BusUnavailable,

    #[error("Invalid subject: {0}")]
    InvalidSubject(String),

    #[error("No responders for subject: {0}")]
    NoResponders(String),

    #[error("Request timed out on subject: {0}")]
    RequestTimeout(String),

    #[error("Ingress rejected: {0}")]
    IngressRejected(String),

    #[error("Blueprint produced zero team manifests")]
    EmptyBlueprint,

    #[error("Team {0} already exists")]
    TeamExists(String),

    #[error("Team {team} failed to start: {reason}")]
    TeamStartFailed { team: String, reason: String },

    #[error("Tool {0:?} not found (no internal or external match)")]
    ToolNotFound(String),

    /// 工具存在但不在 agent 的授权范围内
    #[error("Tool {tool:?} (server {server:?}) not authorized for this agent")]
    ToolNotAuthorized { tool: String, server: String },

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("Invalid tool reference: {0}")]
    InvalidToolRef(String),

    #[error("Envelope invalid: {0}")]
    InvalidEnvelope(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Config error: {0}")]
    ConfigError(String),
}

impl From<serde_json::Error> for SwarmError {
    fn from(e: serde_json::Error) -> Self {
        SwarmError::Serialization(e.to_string())
    }
}
