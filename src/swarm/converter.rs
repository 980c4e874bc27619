//! 蓝图 → 团队清单（纯函数）
//!
//! 团队 ID = `<mission_id>.<sanitize(name)>`；成员的 inputs / outputs 去重合并为团队的 inputs / deliveries。

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::protocol::{MissionBlueprint, TeamManifest, TeamType};

static NON_ALNUM: OnceLock<Regex> = OnceLock::new();

/// 小写、去首尾空白，非 [a-z0-9] 串折叠为单个 "-"，再去掉首尾 "-"
pub fn sanitize_id(name: &str) -> String {
    let re = NON_ALNUM.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("valid regex"));
    let lowered = name.trim().to_lowercase();
    re.replace_all(&lowered, "-").trim_matches('-').to_string()
}

pub fn team_id(mission_id: &str, team_name: &str) -> String {
    format!("{}.{}", mission_id, sanitize_id(team_name))
}

/// 没有团队的蓝图得到空列表，由调用方当作错误处理
pub fn convert_blueprint_to_manifests(blueprint: &MissionBlueprint) -> Vec<TeamManifest> {
    blueprint
        .teams
        .iter()
        .map(|team| {
            let mut inputs = BTreeSet::new();
            let mut deliveries = BTreeSet::new();
            for agent in &team.agents {
                inputs.extend(agent.inputs.iter().cloned());
                deliveries.extend(agent.outputs.iter().cloned());
            }

            TeamManifest {
                id: team_id(&blueprint.mission_id, &team.name),
                name: team.name.clone(),
                team_type: TeamType::Action,
                description: team.role.clone(),
                members: team.agents.clone(),
                inputs: inputs.into_iter().collect(),
                deliveries: deliveries.into_iter().collect(),
                schedule: team.schedule.clone(),
            }
        })
        .collect()
}
