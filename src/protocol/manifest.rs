//! 团队与 agent 清单
//!
//! 清单是声明式的：构造后不再修改，TeamManifest.id 即注册表主键。

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// ReAct 工具循环的默认轮数上限
pub const DEFAULT_MAX_ITERATIONS: usize = 3;

/// 单个 actor 的声明
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentManifest {
    pub id: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub system_prompt: String,
    /// 推理 profile，为空时使用 "chat"
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub model: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<String>,
    /// 内部工具名与 `mcp:<server>/<tool>` 外部引用混合存放
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<String>,
    /// 0 表示使用 DEFAULT_MAX_ITERATIONS
    #[serde(default, skip_serializing_if = "is_zero")]
    pub max_iterations: usize,
}

fn is_zero(v: &usize) -> bool {
    *v == 0
}

impl AgentManifest {
    pub fn effective_max_iterations(&self) -> usize {
        if self.max_iterations > 0 {
            self.max_iterations
        } else {
            DEFAULT_MAX_ITERATIONS
        }
    }

    pub fn profile(&self) -> &str {
        if self.model.is_empty() {
            "chat"
        } else {
            &self.model
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamType {
    #[default]
    Action,
    Expression,
}

/// 周期触发配置；目前只支持 interval，cron_expr 预留
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(rename = "type", default)]
    pub kind: String,
    /// humantime 格式："30s"、"5m"、"1h"
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub interval: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cron_expr: String,
}

impl ScheduleConfig {
    /// 解析 interval；未配置时返回 Ok(None)
    pub fn parse_interval(&self) -> Result<Option<Duration>, String> {
        if self.interval.is_empty() {
            return Ok(None);
        }
        humantime_serde::re::humantime::parse_duration(&self.interval)
            .map(Some)
            .map_err(|e| format!("invalid schedule interval {:?}: {}", self.interval, e))
    }
}

/// 团队清单
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamManifest {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub team_type: TeamType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub members: Vec<AgentManifest>,
    /// 外部触发主题
    #[serde(default)]
    pub inputs: Vec<String>,
    /// 响应转发目标主题
    #[serde(default)]
    pub deliveries: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<ScheduleConfig>,
}
