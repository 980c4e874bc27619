//! 任务蓝图：外部输入，一个团队一条记录，由 converter 展开为 TeamManifest

use serde::{Deserialize, Deserializer, Serialize};

use super::manifest::{AgentManifest, ScheduleConfig};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MissionBlueprint {
    pub mission_id: String,
    #[serde(default)]
    pub intent: String,
    #[serde(default)]
    pub teams: Vec<BlueprintTeam>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<Constraint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requirements: Vec<ResourceRequirement>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlueprintTeam {
    pub name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub agents: Vec<AgentManifest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<ScheduleConfig>,
}

/// 任务约束；反序列化时同时接受纯字符串与 `{constraint_id, description}` 对象
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Constraint {
    #[serde(rename = "constraint_id", skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub description: String,
}

impl<'de> Deserialize<'de> for Constraint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Object {
                #[serde(default)]
                constraint_id: String,
                #[serde(default)]
                description: String,
            },
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Text(description) => Constraint {
                id: String::new(),
                description,
            },
            Repr::Object {
                constraint_id,
                description,
            } => Constraint {
                id: constraint_id,
                description,
            },
        })
    }
}

/// 任务依赖的外部资源（capability server、API key 等）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequirement {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub installed: bool,
}
