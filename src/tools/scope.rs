//! 按 agent 限定外部工具的访问范围
//!
//! agent 清单的 tools 中 `mcp:<server>/<tool>` 形式的条目构成外部白名单，
//! `mcp:<server>` 等价于 `mcp:<server>/*`。没有任何外部引用时放行全部外部工具；
//! 内部工具不受白名单约束。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::core::SwarmError;
use crate::tools::{ServerId, ToolDispatch};

const EXTERNAL_REF_PREFIX: &str = "mcp:";
const WILDCARD: &str = "*";

/// 外部工具引用；tool_name 为 "*" 表示该 server 的全部工具
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolRef {
    pub server_name: String,
    pub tool_name: String,
}

impl ToolRef {
    pub fn new(server_name: &str, tool_name: &str) -> Self {
        Self {
            server_name: server_name.to_string(),
            tool_name: tool_name.to_string(),
        }
    }

    /// 非 `mcp:` 前缀返回 None
    pub fn parse(entry: &str) -> Option<Self> {
        let body = entry.strip_prefix(EXTERNAL_REF_PREFIX)?;
        Some(match body.split_once('/') {
            Some((server, tool)) => Self::new(server, tool),
            None => Self::new(body, WILDCARD),
        })
    }

    pub fn matches_tool(&self, server_name: &str, tool_name: &str) -> bool {
        self.server_name == server_name && (self.tool_name == WILDCARD || self.tool_name == tool_name)
    }
}

pub fn is_external_ref(entry: &str) -> bool {
    entry.starts_with(EXTERNAL_REF_PREFIX)
}

/// 从清单的 tools 列表提取外部引用
pub fn extract_tool_refs(tools: &[String]) -> Vec<ToolRef> {
    tools.iter().filter_map(|t| ToolRef::parse(t)).collect()
}

/// 带白名单的执行器；策略在构造后只读
pub struct ScopedToolExecutor {
    inner: Arc<dyn ToolDispatch>,
    allowed: Vec<ToolRef>,
    server_names: Arc<HashMap<Uuid, String>>,
    allow_all: bool,
}

impl ScopedToolExecutor {
    pub fn new(
        inner: Arc<dyn ToolDispatch>,
        allowed: Vec<ToolRef>,
        server_names: Arc<HashMap<Uuid, String>>,
    ) -> Self {
        let allow_all = allowed.is_empty();
        Self {
            inner,
            allowed,
            server_names,
            allow_all,
        }
    }

    /// 直接从 agent 清单的 tools 列表构造
    pub fn for_agent(
        inner: Arc<dyn ToolDispatch>,
        tools: &[String],
        server_names: Arc<HashMap<Uuid, String>>,
    ) -> Self {
        Self::new(inner, extract_tool_refs(tools), server_names)
    }

    pub fn allows_all(&self) -> bool {
        self.allow_all
    }

    fn server_name(&self, id: Uuid) -> String {
        self.server_names
            .get(&id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }
}

#[async_trait]
impl ToolDispatch for ScopedToolExecutor {
    async fn find_tool_by_name(&self, name: &str) -> Result<(ServerId, String), SwarmError> {
        let (server, tool_name) = self.inner.find_tool_by_name(name).await?;

        if server.is_internal() || self.allow_all {
            return Ok((server, tool_name));
        }

        let server_name = self.server_name(server.as_uuid());
        if self
            .allowed
            .iter()
            .any(|r| r.matches_tool(&server_name, &tool_name))
        {
            return Ok((server, tool_name));
        }

        tracing::warn!(tool = %tool_name, server = %server_name, "Tool denied by agent scope");
        Err(SwarmError::ToolNotAuthorized {
            tool: tool_name,
            server: server_name,
        })
    }

    async fn call_tool(
        &self,
        server: ServerId,
        name: &str,
        args: Value,
    ) -> Result<String, SwarmError> {
        self.inner.call_tool(server, name, args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::executor::tests::FakeExternal;
    use crate::tools::registry::tests::EchoTool;
    use crate::tools::{CompositeToolExecutor, ToolRegistry};

    fn composite(external: FakeExternal, with_internal: bool) -> Arc<dyn ToolDispatch> {
        let mut registry = ToolRegistry::new();
        if with_internal {
            registry.register(EchoTool);
        }
        Arc::new(CompositeToolExecutor::new(
            Arc::new(registry),
            Some(Arc::new(external)),
            5,
        ))
    }

    fn names(id: Uuid, name: &str) -> Arc<HashMap<Uuid, String>> {
        Arc::new(HashMap::from([(id, name.to_string())]))
    }

    #[test]
    fn test_parse_tool_ref() {
        assert_eq!(ToolRef::parse("mcp:github/create_issue"), Some(ToolRef::new("github", "create_issue")));
        assert_eq!(ToolRef::parse("mcp:filesystem"), Some(ToolRef::new("filesystem", "*")));
        assert_eq!(ToolRef::parse("consult_council"), None);

        let tools = vec!["consult_council".to_string(), "mcp:fs/*".to_string()];
        assert_eq!(extract_tool_refs(&tools), vec![ToolRef::new("fs", "*")]);
        assert!(is_external_ref("mcp:fs"));
    }

    #[test]
    fn test_ref_matching() {
        let exact = ToolRef::new("filesystem", "read_file");
        assert!(exact.matches_tool("filesystem", "read_file"));
        assert!(!exact.matches_tool("filesystem", "write_file"));
        assert!(!exact.matches_tool("github", "read_file"));
        assert!(ToolRef::new("filesystem", "*").matches_tool("filesystem", "anything"));
    }

    #[tokio::test]
    async fn test_no_refs_allows_all() {
        let fs = Uuid::new_v4();
        let scoped = ScopedToolExecutor::new(
            composite(FakeExternal::new(&[("read_file", fs)]), false),
            vec![],
            names(fs, "filesystem"),
        );
        assert!(scoped.allows_all());
        let (server, name) = scoped.find_tool_by_name("read_file").await.unwrap();
        assert_eq!(server, ServerId::External(fs));
        assert_eq!(name, "read_file");
    }

    #[tokio::test]
    async fn test_filtered_allow() {
        let fs = Uuid::new_v4();
        let scoped = ScopedToolExecutor::new(
            composite(FakeExternal::new(&[("read_file", fs), ("write_file", fs)]), false),
            vec![ToolRef::new("filesystem", "read_file")],
            names(fs, "filesystem"),
        );
        assert!(scoped.find_tool_by_name("read_file").await.is_ok());
        let err = scoped.find_tool_by_name("write_file").await.unwrap_err();
        assert_eq!(
            err,
            SwarmError::ToolNotAuthorized {
                tool: "write_file".into(),
                server: "filesystem".into()
            }
        );
    }

    #[tokio::test]
    async fn test_wildcard_allows_server_denies_other_server() {
        let fs = Uuid::new_v4();
        let gh = Uuid::new_v4();
        let server_names = Arc::new(HashMap::from([
            (fs, "filesystem".to_string()),
            (gh, "github".to_string()),
        ]));
        let scoped = ScopedToolExecutor::for_agent(
            composite(
                FakeExternal::new(&[("read_file", fs), ("write_file", fs), ("create_issue", gh)]),
                false,
            ),
            &["mcp:filesystem/*".to_string()],
            server_names,
        );
        assert!(scoped.find_tool_by_name("read_file").await.is_ok());
        assert!(scoped.find_tool_by_name("write_file").await.is_ok());
        assert!(matches!(
            scoped.find_tool_by_name("create_issue").await,
            Err(SwarmError::ToolNotAuthorized { .. })
        ));
    }

    #[tokio::test]
    async fn test_internal_tools_always_pass() {
        let scoped = ScopedToolExecutor::new(
            composite(FakeExternal::new(&[]), true),
            vec![ToolRef::new("filesystem", "read_file")],
            Arc::new(HashMap::new()),
        );
        let (server, _) = scoped.find_tool_by_name("echo").await.unwrap();
        assert_eq!(server, ServerId::Internal);
    }

    #[tokio::test]
    async fn test_unknown_server_name_falls_back_to_uuid() {
        let anon = Uuid::new_v4();
        let scoped = ScopedToolExecutor::new(
            composite(FakeExternal::new(&[("scan", anon)]), false),
            vec![ToolRef::new("filesystem", "*")],
            Arc::new(HashMap::new()),
        );
        match scoped.find_tool_by_name("scan").await {
            Err(SwarmError::ToolNotAuthorized { server, .. }) => assert_eq!(server, anon.to_string()),
            other => panic!("expected denial, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_call_tool_delegates() {
        let fs = Uuid::new_v4();
        let scoped = ScopedToolExecutor::new(
            composite(FakeExternal::new(&[("read_file", fs)]), false),
            vec![],
            names(fs, "filesystem"),
        );
        let out = scoped
            .call_tool(ServerId::External(fs), "read_file", Value::Null)
            .await
            .unwrap();
        assert_eq!(out, "result:read_file");
    }
}
