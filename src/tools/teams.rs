//! 面向整个蜂群的工具：list_teams 与 broadcast
//!
//! 工具只持有 SwarmControl 的弱引用，避免与 Soma 形成引用环；Soma 已释放时返回提示文本。

use std::sync::Weak;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::protocol::{BroadcastReply, TeamManifest, TeamType};
use crate::tools::{str_arg, Tool};

/// Soma 暴露给内置工具的能力
#[async_trait]
pub trait SwarmControl: Send + Sync {
    async fn team_manifests(&self) -> Vec<TeamManifest>;

    /// 向所有团队广播并收集应答
    async fn broadcast_all(&self, content: &str) -> Vec<BroadcastReply>;
}

#[derive(Debug, Serialize)]
struct TeamSummary {
    id: String,
    name: String,
    #[serde(rename = "type")]
    team_type: TeamType,
    members: usize,
}

pub struct ListTeamsTool {
    control: Weak<dyn SwarmControl>,
}

impl ListTeamsTool {
    pub fn new(control: Weak<dyn SwarmControl>) -> Self {
        Self { control }
    }
}

#[async_trait]
impl Tool for ListTeamsTool {
    fn name(&self) -> &str {
        "list_teams"
    }

    fn description(&self) -> &str {
        "Returns the active team roster with member counts."
    }

    async fn execute(&self, _args: Value) -> Result<String, String> {
        let Some(control) = self.control.upgrade() else {
            return Ok("Soma not available, cannot list teams.".to_string());
        };
        let mut summaries: Vec<TeamSummary> = control
            .team_manifests()
            .await
            .into_iter()
            .map(|m| TeamSummary {
                members: m.members.len(),
                id: m.id,
                name: m.name,
                team_type: m.team_type,
            })
            .collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        serde_json::to_string(&summaries).map_err(|e| e.to_string())
    }
}

pub struct BroadcastTool {
    control: Weak<dyn SwarmControl>,
}

impl BroadcastTool {
    pub fn new(control: Weak<dyn SwarmControl>) -> Self {
        Self { control }
    }
}

#[async_trait]
impl Tool for BroadcastTool {
    fn name(&self) -> &str {
        "broadcast"
    }

    fn description(&self) -> &str {
        "Send a message to ALL active teams in the swarm and collect each team's response."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "message": {"type": "string", "description": "The message to broadcast to all teams"}
            },
            "required": ["message"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let message = str_arg(&args, "message").ok_or("broadcast requires 'message'")?;
        let control = self
            .control
            .upgrade()
            .ok_or("Soma not available, cannot enumerate teams")?;

        let replies = control.broadcast_all(message).await;
        if replies.is_empty() {
            return Ok("No active teams to broadcast to.".to_string());
        }

        let mut out = format!("Broadcast sent to {} team(s):\n\n", replies.len());
        for reply in &replies {
            match &reply.error {
                Some(err) => out.push_str(&format!("- **{}**: _{}_\n", reply.team_id, err)),
                None => out.push_str(&format!("- **{}**: {}\n", reply.team_id, reply.content)),
            }
        }
        Ok(out)
    }
}
