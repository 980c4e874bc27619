//! LLM 驱动的 agent
//!
//! 监听团队内部触发主题与自己的 council 请求主题；每条消息构造角色化 prompt 交给 Brain，
//! 结果发布到团队响应主题（请求带 reply 时同时直接应答）。Brain 出错只记日志并丢弃该消息。
//! 绑定了工具的 agent 会运行 ReAct 循环：回答中出现 tool_call 时执行工具并带着结果重新推理。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::bus::{Message, MessageBus, Subscription};
use crate::core::SwarmError;
use crate::llm::{Brain, InferRequest};
use crate::protocol::{topics, AgentManifest, HeartbeatEnvelope};
use crate::tools::ToolDispatch;

/// 没有推理引擎（或推理失败）时对 council 请求的固定应答
pub const UNAVAILABLE_REPLY: &str = "Agent unavailable, no cognitive engine.";

pub struct Agent {
    manifest: AgentManifest,
    team_id: String,
    bus: Arc<dyn MessageBus>,
    brain: Option<Arc<dyn Brain>>,
    tools: Option<Arc<dyn ToolDispatch>>,
    /// 仅包含本 agent 绑定的工具
    tool_descs: Vec<(String, String)>,
    heartbeat_interval: Duration,
    token: CancellationToken,
}

impl Agent {
    pub fn new(
        manifest: AgentManifest,
        team_id: &str,
        bus: Arc<dyn MessageBus>,
        brain: Option<Arc<dyn Brain>>,
        parent: &CancellationToken,
    ) -> Self {
        Self {
            manifest,
            team_id: team_id.to_string(),
            bus,
            brain,
            tools: None,
            tool_descs: Vec::new(),
            heartbeat_interval: Duration::from_secs(5),
            token: parent.child_token(),
        }
    }

    pub fn with_tools(mut self, tools: Arc<dyn ToolDispatch>) -> Self {
        self.tools = Some(tools);
        self
    }

    /// 按清单 tools 的顺序挑出有描述的工具
    pub fn with_tool_descriptions(mut self, descs: &HashMap<String, String>) -> Self {
        self.tool_descs = self
            .manifest
            .tools
            .iter()
            .filter_map(|name| descs.get(name).map(|d| (name.clone(), d.clone())))
            .collect();
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn id(&self) -> &str {
        &self.manifest.id
    }

    /// 订阅触发主题与 council 主题并启动处理任务；订阅失败直接返回错误
    pub async fn start(self: Arc<Self>) -> Result<Vec<JoinHandle<()>>, SwarmError> {
        let trigger_sub = self.bus.subscribe(&topics::team_trigger(&self.team_id)).await?;
        let council_sub = self
            .bus
            .subscribe(&topics::council_request(&self.manifest.id))
            .await?;
        tracing::info!(
            agent = %self.manifest.id,
            role = %self.manifest.role,
            team = %self.team_id,
            "Agent joined team"
        );

        let triggers = Arc::clone(&self);
        let council = Arc::clone(&self);
        Ok(vec![
            tokio::spawn(async move { triggers.listen(trigger_sub, false).await }),
            tokio::spawn(async move { council.listen(council_sub, true).await }),
            spawn_heartbeat(
                self.bus.clone(),
                self.manifest.id.clone(),
                self.team_id.clone(),
                self.heartbeat_interval,
                self.token.clone(),
            ),
        ])
    }

    pub fn stop(&self) {
        self.token.cancel();
    }

    /// 同一订阅上的消息逐条处理
    async fn listen(&self, mut sub: Subscription, direct: bool) {
        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                msg = sub.next() => match msg {
                    Some(msg) if direct => self.handle_direct_request(msg).await,
                    Some(msg) => self.handle_trigger(msg).await,
                    None => break,
                },
            }
        }
    }

    async fn handle_trigger(&self, msg: Message) {
        let input = msg.payload_str().into_owned();
        tracing::info!(agent = %self.manifest.id, input = %input, "Agent thinking");

        let Some(text) = self.process_message(&input).await.filter(|t| !t.is_empty()) else {
            tracing::debug!(agent = %self.manifest.id, "No response to publish");
            return;
        };

        if let Err(e) = self.bus.respond(&msg, text.clone().into_bytes()).await {
            tracing::warn!(agent = %self.manifest.id, error = %e, "Direct reply failed");
        }
        if let Err(e) = self
            .bus
            .publish(&topics::team_response(&self.team_id), text.into_bytes())
            .await
        {
            tracing::warn!(agent = %self.manifest.id, error = %e, "Publishing response failed");
            return;
        }
        tracing::info!(agent = %self.manifest.id, "Agent replied");
    }

    async fn handle_direct_request(&self, msg: Message) {
        let input = msg.payload_str().into_owned();
        tracing::info!(agent = %self.manifest.id, input = %input, "Agent direct request");

        let text = self
            .process_message(&input)
            .await
            .unwrap_or_else(|| UNAVAILABLE_REPLY.to_string());
        if let Err(e) = self.bus.respond(&msg, text.into_bytes()).await {
            tracing::warn!(agent = %self.manifest.id, error = %e, "Direct reply failed");
        }
    }

    fn build_prompt(&self, input: &str) -> String {
        let mut system = if self.manifest.system_prompt.is_empty() {
            format!("You are a {} in the {} team.", self.manifest.role, self.team_id)
        } else {
            self.manifest.system_prompt.clone()
        };
        system.push_str(&self.tools_block());
        format!("{}\n\nInput: {}", system, input)
    }

    fn tools_block(&self) -> String {
        if self.manifest.tools.is_empty() || self.tool_descs.is_empty() {
            return String::new();
        }
        let mut block = String::from("\n\n## Available Tools\n");
        block.push_str("You can invoke a tool by including a JSON block in your response:\n");
        block.push_str(r#"{"tool_call": {"name": "<tool_name>", "arguments": {...}}}"#);
        block.push_str("\n\nOnly include ONE tool_call per response. After the tool executes, you will receive the result and can continue.\n\n");
        for (name, desc) in &self.tool_descs {
            block.push_str(&format!("- **{}**: {}\n", name, desc));
        }
        block
    }

    /// 推理 + ReAct 工具循环；没有 Brain 或推理失败时返回 None
    pub async fn process_message(&self, input: &str) -> Option<String> {
        let Some(brain) = &self.brain else {
            tracing::warn!(agent = %self.manifest.id, "Agent has no brain, skipping inference");
            return None;
        };

        let mut req = InferRequest {
            profile: self.manifest.profile().to_string(),
            prompt: self.build_prompt(input),
        };
        let mut text = match brain.infer_with_contract(req.clone()).await {
            Ok(resp) => resp.text,
            Err(e) => {
                tracing::error!(agent = %self.manifest.id, error = %e, "Inference failed");
                return None;
            }
        };

        let Some(tools) = self.tools.as_ref().filter(|_| !self.manifest.tools.is_empty()) else {
            return Some(text);
        };

        let max_iterations = self.manifest.effective_max_iterations();
        for i in 0..max_iterations {
            let Some(call) = parse_tool_call(&text) else {
                break;
            };
            tracing::info!(
                agent = %self.manifest.id,
                tool = %call.name,
                iteration = i + 1,
                max_iterations,
                "Agent tool call"
            );

            let (server, name) = match tools.find_tool_by_name(&call.name).await {
                Ok(found) => found,
                Err(e) => {
                    tracing::warn!(agent = %self.manifest.id, error = %e, "Tool lookup failed");
                    break;
                }
            };
            let result = match tools.call_tool(server, &name, call.arguments).await {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!(agent = %self.manifest.id, error = %e, "Tool call failed");
                    text = format!("Tool {} failed: {}", call.name, e);
                    break;
                }
            };

            req.prompt = format!(
                "{}\n\nTool result from {}:\n{}\n\nContinue your response:",
                req.prompt, call.name, result
            );
            match brain.infer_with_contract(req.clone()).await {
                Ok(resp) => text = resp.text,
                Err(e) => {
                    tracing::error!(agent = %self.manifest.id, error = %e, "Re-inference failed");
                    break;
                }
            }
        }

        Some(text)
    }
}

/// `{"tool_call": {"name": ..., "arguments": {...}}}`
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub arguments: Value,
}

/// 提取回答中第一个括号配平的 tool_call 块
pub fn parse_tool_call(text: &str) -> Option<ToolCall> {
    #[derive(Deserialize)]
    struct Payload {
        #[serde(default)]
        name: String,
        #[serde(default)]
        arguments: Value,
    }
    #[derive(Deserialize)]
    struct Wrapper {
        tool_call: Payload,
    }

    let start = text.find(r#"{"tool_call""#)?;
    let mut depth = 0usize;
    let mut end = None;
    for (i, b) in text.as_bytes()[start..].iter().enumerate() {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    end = Some(start + i + 1);
                    break;
                }
            }
            _ => {}
        }
    }

    let wrapper: Wrapper = serde_json::from_str(&text[start..end?]).ok()?;
    if wrapper.tool_call.name.is_empty() {
        return None;
    }
    let arguments = match wrapper.tool_call.arguments {
        Value::Null => Value::Object(Default::default()),
        args => args,
    };
    Some(ToolCall {
        name: wrapper.tool_call.name,
        arguments,
    })
}

/// 周期性心跳；首个心跳在一个周期之后
pub(crate) fn spawn_heartbeat(
    bus: Arc<dyn MessageBus>,
    agent_id: String,
    team_id: String,
    period: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!(agent = %agent_id, "Heartbeat stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let beat = HeartbeatEnvelope::new(&agent_id, &team_id);
                    let payload = match serde_json::to_vec(&beat) {
                        Ok(p) => p,
                        Err(e) => {
                            tracing::warn!(agent = %agent_id, error = %e, "Heartbeat encode failed");
                            continue;
                        }
                    };
                    if let Err(e) = bus.publish(topics::GLOBAL_HEARTBEAT, payload).await {
                        tracing::warn!(agent = %agent_id, error = %e, "Heartbeat publish failed");
                    }
                }
            }
        }
    })
}
