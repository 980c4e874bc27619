//! consult_council：向指定 agent 发起直接请求并等待应答

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::bus::MessageBus;
use crate::protocol::topics;
use crate::tools::{str_arg, Tool};

pub struct ConsultCouncilTool {
    bus: Arc<dyn MessageBus>,
    timeout: Duration,
}

impl ConsultCouncilTool {
    pub fn new(bus: Arc<dyn MessageBus>, timeout_secs: u64) -> Self {
        Self {
            bus,
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

#[async_trait]
impl Tool for ConsultCouncilTool {
    fn name(&self) -> &str {
        "consult_council"
    }

    fn description(&self) -> &str {
        "Send a question to a specific council member by agent ID and get their response. Use for specialist expertise."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "member": {"type": "string", "description": "Council member agent ID"},
                "question": {"type": "string", "description": "The question or task for the council member"}
            },
            "required": ["member", "question"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let (member, question) = match (str_arg(&args, "member"), str_arg(&args, "question")) {
            (Some(m), Some(q)) => (m, q),
            _ => return Err("consult_council requires 'member' and 'question'".to_string()),
        };

        let subject = topics::council_request(member);
        let reply = self
            .bus
            .request(&subject, question.as_bytes().to_vec(), self.timeout)
            .await
            .map_err(|e| format!("council member {} did not respond: {}", member, e))?;

        // 应答可能是 {"text": ...} 结构，只取文本
        if let Ok(v) = serde_json::from_slice::<Value>(&reply.payload) {
            if let Some(text) = v.get("text").and_then(|t| t.as_str()).filter(|t| !t.is_empty()) {
                return Ok(text.to_string());
            }
        }
        Ok(reply.payload_str().into_owned())
    }
}
