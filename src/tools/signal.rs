//! 总线发布类工具：publish_signal（任意主题）与 delegate_task（团队触发主题）

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::bus::MessageBus;
use crate::protocol::topics;
use crate::tools::{str_arg, Tool};

pub struct PublishSignalTool {
    bus: Arc<dyn MessageBus>,
}

impl PublishSignalTool {
    pub fn new(bus: Arc<dyn MessageBus>) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl Tool for PublishSignalTool {
    fn name(&self) -> &str {
        "publish_signal"
    }

    fn description(&self) -> &str {
        "Publish a message to any bus subject in the swarm, e.g. to trigger a team or signal other agents."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "subject": {"type": "string", "description": "Bus subject, e.g. swarm.global.broadcast"},
                "message": {"type": "string", "description": "The message payload to publish"}
            },
            "required": ["subject", "message"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let (subject, message) = match (str_arg(&args, "subject"), str_arg(&args, "message")) {
            (Some(s), Some(m)) => (s, m),
            _ => return Err("publish_signal requires 'subject' and 'message'".to_string()),
        };
        self.bus
            .publish(subject, message.as_bytes().to_vec())
            .await
            .map_err(|e| format!("failed to publish to {}: {}", subject, e))?;
        Ok(format!("Signal published to {} ({} bytes).", subject, message.len()))
    }
}

pub struct DelegateTaskTool {
    bus: Arc<dyn MessageBus>,
}

impl DelegateTaskTool {
    pub fn new(bus: Arc<dyn MessageBus>) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl Tool for DelegateTaskTool {
    fn name(&self) -> &str {
        "delegate_task"
    }

    fn description(&self) -> &str {
        "Publish a task to a specific team's trigger topic for processing."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "team_id": {"type": "string", "description": "The target team ID"},
                "task": {"type": "string", "description": "The task description to send"}
            },
            "required": ["team_id", "task"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let (team_id, task) = match (str_arg(&args, "team_id"), str_arg(&args, "task")) {
            (Some(t), Some(k)) => (t, k),
            _ => return Err("delegate_task requires 'team_id' and 'task'".to_string()),
        };
        self.bus
            .publish(&topics::team_trigger(team_id), task.as_bytes().to_vec())
            .await
            .map_err(|e| format!("failed to publish task to team {}: {}", team_id, e))?;
        Ok(format!("Task delegated to team {}.", team_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryBus;

    #[tokio::test]
    async fn test_delegate_task_publishes_on_team_trigger() {
        let bus = Arc::new(InMemoryBus::new());
        let mut sub = bus.subscribe("swarm.team.writers.internal.trigger").await.unwrap();
        let tool = DelegateTaskTool::new(bus.clone());

        let out = tool
            .execute(serde_json::json!({"team_id": "writers", "task": "draft the summary"}))
            .await
            .unwrap();
        assert_eq!(out, "Task delegated to team writers.");
        assert_eq!(sub.next().await.unwrap().payload_str(), "draft the summary");
    }

    #[tokio::test]
    async fn test_publish_signal_validates_subject() {
        let bus = Arc::new(InMemoryBus::new());
        let tool = PublishSignalTool::new(bus);
        assert!(tool
            .execute(serde_json::json!({"subject": "swarm.global.>", "message": "x"}))
            .await
            .is_err());
        assert!(tool.execute(serde_json::json!({"message": "x"})).await.is_err());
        let out = tool
            .execute(serde_json::json!({"subject": "swarm.global.broadcast", "message": "hey"}))
            .await
            .unwrap();
        assert!(out.contains("3 bytes"));
    }
}
