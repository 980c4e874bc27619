//! 工具调度：内部注册表与外部 capability server 的统一入口
//!
//! find_tool_by_name 先查内部注册表（命中返回 ServerId::Internal），再交给外部解析器；
//! call_tool 按 ServerId 路由。每次调用施加超时并输出结构化审计日志（JSON）。

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::timeout;
use uuid::Uuid;

use crate::core::SwarmError;
use crate::tools::ToolRegistry;

/// 内部工具的保留 server ID（全零 UUID），随机生成的外部 server ID 不会与之冲突
pub const INTERNAL_SERVER_ID: Uuid = Uuid::nil();

/// 工具所在的命名空间
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerId {
    Internal,
    External(Uuid),
}

impl ServerId {
    /// 持久化 / 线上格式；Internal 对应全零 UUID
    pub fn as_uuid(&self) -> Uuid {
        match self {
            ServerId::Internal => INTERNAL_SERVER_ID,
            ServerId::External(id) => *id,
        }
    }

    pub fn from_uuid(id: Uuid) -> Self {
        if id == INTERNAL_SERVER_ID {
            ServerId::Internal
        } else {
            ServerId::External(id)
        }
    }

    /// External(nil) 同样按内部处理
    pub fn is_internal(&self) -> bool {
        self.as_uuid() == INTERNAL_SERVER_ID
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_uuid())
    }
}

/// 工具解析与调用；外部 capability server 池只需实现这两个方法即可接入
#[async_trait]
pub trait ToolDispatch: Send + Sync {
    async fn find_tool_by_name(&self, name: &str) -> Result<(ServerId, String), SwarmError>;

    async fn call_tool(
        &self,
        server: ServerId,
        name: &str,
        args: Value,
    ) -> Result<String, SwarmError>;
}

/// 内部优先、外部兜底的组合执行器
pub struct CompositeToolExecutor {
    internal: Arc<ToolRegistry>,
    external: Option<Arc<dyn ToolDispatch>>,
    timeout: Duration,
}

impl CompositeToolExecutor {
    pub fn new(
        internal: Arc<ToolRegistry>,
        external: Option<Arc<dyn ToolDispatch>>,
        timeout_secs: u64,
    ) -> Self {
        Self {
            internal,
            external,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn internal(&self) -> &Arc<ToolRegistry> {
        &self.internal
    }

    async fn call_internal(&self, name: &str, args: Value) -> Result<String, SwarmError> {
        let tool = self
            .internal
            .get(name)
            .ok_or_else(|| SwarmError::ToolNotFound(name.to_string()))?;
        tool.execute(args).await.map_err(SwarmError::ToolExecutionFailed)
    }

    async fn call_external(
        &self,
        server: ServerId,
        name: &str,
        args: Value,
    ) -> Result<String, SwarmError> {
        match &self.external {
            Some(external) => external.call_tool(server, name, args).await,
            None => Err(SwarmError::ToolExecutionFailed(format!(
                "no external tool executor for server {}",
                server
            ))),
        }
    }
}

#[async_trait]
impl ToolDispatch for CompositeToolExecutor {
    async fn find_tool_by_name(&self, name: &str) -> Result<(ServerId, String), SwarmError> {
        if self.internal.has(name) {
            return Ok((ServerId::Internal, name.to_string()));
        }
        match &self.external {
            Some(external) => external.find_tool_by_name(name).await,
            None => Err(SwarmError::ToolNotFound(name.to_string())),
        }
    }

    async fn call_tool(
        &self,
        server: ServerId,
        name: &str,
        args: Value,
    ) -> Result<String, SwarmError> {
        let start = Instant::now();
        let preview = args_preview(&args);

        let result = if server.is_internal() {
            timeout(self.timeout, self.call_internal(name, args)).await
        } else {
            timeout(self.timeout, self.call_external(server, name, args)).await
        };

        let outcome = match &result {
            Ok(Ok(_)) => "ok",
            Ok(Err(_)) => "error",
            Err(_) => "timeout",
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": name,
            "server": server.to_string(),
            "internal": server.is_internal(),
            "ok": outcome == "ok",
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": preview,
        });
        tracing::info!(audit = %audit, "tool");

        match result {
            Ok(inner) => inner,
            Err(_) => Err(SwarmError::ToolTimeout(name.to_string())),
        }
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
