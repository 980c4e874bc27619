//! 蓝图激活（幂等）
//!
//! 注册表写锁贯穿整个激活过程，所以并发激活同一蓝图时每个团队 id 恰好 spawn 一次，
//! 其余调用全部计为 skipped。单个团队启动失败只记入 errors，不影响其他团队。

use std::collections::HashMap;

use serde::Serialize;

use crate::core::SwarmError;
use crate::protocol::{MissionBlueprint, TeamManifest};
use crate::swarm::converter::convert_blueprint_to_manifests;
use crate::swarm::sensor::SensorConfig;
use crate::swarm::soma::Soma;
use crate::swarm::team::Team;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ActivationResult {
    pub teams_spawned: usize,
    pub teams_skipped: usize,
    pub sensors_spawned: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl ActivationResult {
    fn failed(err: SwarmError) -> Self {
        Self {
            errors: vec![err.to_string()],
            ..Default::default()
        }
    }
}

/// 成员的传感器配置：显式配置优先，其次角色名含 "sensor"（不区分大小写）时使用 heartbeat_only
fn sensor_configs_for(
    manifest: &TeamManifest,
    explicit: &HashMap<String, SensorConfig>,
) -> HashMap<String, SensorConfig> {
    manifest
        .members
        .iter()
        .filter_map(|member| {
            if let Some(cfg) = explicit.get(&member.id) {
                Some((member.id.clone(), cfg.clone()))
            } else if member.role.to_lowercase().contains("sensor") {
                Some((member.id.clone(), SensorConfig::heartbeat_only()))
            } else {
                None
            }
        })
        .collect()
}

impl Soma {
    pub async fn activate_blueprint(
        &self,
        blueprint: &MissionBlueprint,
        sensor_configs: &HashMap<String, SensorConfig>,
    ) -> ActivationResult {
        if !self.bus().is_connected() {
            tracing::error!(mission = %blueprint.mission_id, "Bus unavailable, blueprint not activated");
            return ActivationResult::failed(SwarmError::BusUnavailable);
        }

        let manifests = convert_blueprint_to_manifests(blueprint);
        if manifests.is_empty() {
            tracing::warn!(mission = %blueprint.mission_id, "Blueprint produced zero team manifests");
            return ActivationResult::failed(SwarmError::EmptyBlueprint);
        }

        let mut result = ActivationResult::default();
        let mut teams = self.teams.write().await;

        for manifest in manifests {
            if teams.contains_key(&manifest.id) {
                tracing::info!(team = %manifest.id, "Team already active, skipping");
                result.teams_skipped += 1;
                continue;
            }

            let configs = sensor_configs_for(&manifest, sensor_configs);
            let sensors = configs.len();
            let id = manifest.id.clone();

            let mut team = Team::new(manifest, self.team_ctx.clone(), &self.token);
            team.set_sensor_configs(configs);
            if let Err(e) = team.start().await {
                tracing::error!(team = %id, error = %e, "Team failed to start");
                result.errors.push(format!("team {}: {}", id, e));
                continue;
            }

            teams.insert(id, team);
            result.teams_spawned += 1;
            result.sensors_spawned += sensors;
        }
        drop(teams);

        tracing::info!(
            mission = %blueprint.mission_id,
            spawned = result.teams_spawned,
            skipped = result.teams_skipped,
            sensors = result.sensors_spawned,
            errors = result.errors.len(),
            "Blueprint activated"
        );
        result
    }
}
