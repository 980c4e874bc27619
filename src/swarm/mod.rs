//! 蜂群运行时：Soma / Axon、团队与 actor、蓝图转换与激活、定时触发

pub mod activation;
pub mod agent;
pub mod axon;
pub mod converter;
pub mod scheduler;
pub mod seeds;
pub mod sensor;
pub mod soma;
pub mod team;

pub use activation::ActivationResult;
pub use agent::{parse_tool_call, Agent, ToolCall, UNAVAILABLE_REPLY};
pub use axon::{ActivityEvent, Axon, STATUS_SIGNAL};
pub use converter::{convert_blueprint_to_manifests, sanitize_id, team_id};
pub use scheduler::{TeamScheduler, TriggerOutcome};
pub use seeds::{symbiotic_seed_blueprint, symbiotic_seed_sensor_configs};
pub use sensor::{SensorAgent, SensorConfig, SensorType, HEARTBEAT_ONLY_PAYLOAD};
pub use soma::{Soma, SomaBuilder};
pub use team::{Team, TeamContext};
