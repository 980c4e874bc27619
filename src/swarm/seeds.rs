//! 内置种子任务：单机自测用的传感器团队，无需 LLM

use std::collections::HashMap;
use std::time::Duration;

use crate::protocol::{AgentManifest, BlueprintTeam, Constraint, MissionBlueprint};
use crate::swarm::sensor::{SensorConfig, SensorType};

pub const SEED_MISSION_ID: &str = "mission-symbiotic-seed";
pub const TOPIC_SENSOR_EMAIL: &str = "swarm.data.email";
pub const TOPIC_SENSOR_WEATHER: &str = "swarm.data.weather";

pub fn symbiotic_seed_blueprint() -> MissionBlueprint {
    let poller = |id: &str, role: &str, output: &str| AgentManifest {
        id: id.to_string(),
        role: role.to_string(),
        outputs: vec![output.to_string()],
        ..Default::default()
    };
    let constraint = |description: &str| Constraint {
        id: String::new(),
        description: description.to_string(),
    };

    MissionBlueprint {
        mission_id: SEED_MISSION_ID.to_string(),
        intent: "Internal sensor team: inbox monitoring + local weather polling".to_string(),
        teams: vec![BlueprintTeam {
            name: "Symbiotic Sensors".to_string(),
            role: "Automated sensor data acquisition (no LLM inference)".to_string(),
            agents: vec![
                poller("sensor-gmail-poller", "gmail_sensor", TOPIC_SENSOR_EMAIL),
                poller("sensor-weather-poller", "weather_sensor", TOPIC_SENSOR_WEATHER),
            ],
            schedule: None,
        }],
        constraints: vec![
            constraint("Poll interval: 60 seconds"),
            constraint("No LLM inference, pure data acquisition"),
            constraint("Sensor trust score: 1.0 (fully trusted)"),
        ],
        ..Default::default()
    }
}

/// 端点为空：两个传感器都以 heartbeat_only 模式运行
pub fn symbiotic_seed_sensor_configs() -> HashMap<String, SensorConfig> {
    ["sensor-gmail-poller", "sensor-weather-poller"]
        .into_iter()
        .map(|id| {
            let config = SensorConfig {
                sensor_type: SensorType::HttpPoll,
                interval: Some(Duration::from_secs(60)),
                ..Default::default()
            };
            (id.to_string(), config)
        })
        .collect()
}
