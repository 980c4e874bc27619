//! Swarm - 蜂群运行时入口
//!
//! 初始化日志、加载配置、创建总线与 Soma，加载常驻团队并激活配置的任务蓝图，
//! 然后等待 Ctrl+C / SIGTERM 并执行优雅关闭。
//!
//! 用法：`swarm [config.toml]`

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::de::DeserializeOwned;

use swarm::bus::{InMemoryBus, MessageBus};
use swarm::config::{load_config, MissionSection};
use swarm::core::{ShutdownCoordinator, ShutdownManager};
use swarm::llm::create_brain;
use swarm::protocol::{MissionBlueprint, TeamManifest};
use swarm::swarm::{symbiotic_seed_blueprint, symbiotic_seed_sensor_configs, SensorConfig, SomaBuilder};

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

/// 配置的蓝图优先，其次内置种子任务
fn configured_mission(
    mission: &MissionSection,
) -> anyhow::Result<Option<(MissionBlueprint, HashMap<String, SensorConfig>)>> {
    if let Some(path) = &mission.blueprint {
        let blueprint: MissionBlueprint = read_json(path)?;
        let sensors = match &mission.sensors {
            Some(path) => read_json(path)?,
            None => HashMap::new(),
        };
        return Ok(Some((blueprint, sensors)));
    }
    if mission.seed {
        return Ok(Some((symbiotic_seed_blueprint(), symbiotic_seed_sensor_configs())));
    }
    Ok(None)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    swarm::observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = load_config(config_path).context("Failed to load configuration")?;

    let bus: Arc<dyn MessageBus> = Arc::new(InMemoryBus::with_capacity(config.bus.buffer_capacity));
    let brain = create_brain(&config.llm);
    let shutdown = Arc::new(ShutdownManager::new());

    let standing: Vec<TeamManifest> = match &config.mission.teams {
        Some(path) => read_json(path)?,
        None => Vec::new(),
    };
    let mission = configured_mission(&config.mission)?;

    let soma = SomaBuilder::new(config, bus)
        .with_brain(brain)
        .build(&shutdown.token());
    soma.start(standing).await.context("Failed to start Soma")?;

    if let Some((blueprint, sensors)) = mission {
        let result = soma.activate_blueprint(&blueprint, &sensors).await;
        for err in &result.errors {
            tracing::error!(mission = %blueprint.mission_id, error = %err, "Activation error");
        }
    }

    let mut coordinator =
        ShutdownCoordinator::new(shutdown.clone()).with_timeout(Duration::from_secs(15));
    coordinator.register(soma.clone());
    shutdown.install_signal_handlers();

    tracing::info!(teams = soma.team_count().await, "Swarm running, press Ctrl+C to stop");
    shutdown.wait_for_shutdown().await;
    coordinator.run_cleanup().await;

    Ok(())
}
