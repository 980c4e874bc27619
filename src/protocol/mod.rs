//! 协议层：主题约定、清单、蓝图、遥测信封

pub mod blueprint;
pub mod envelope;
pub mod manifest;
pub mod topics;

pub use blueprint::{BlueprintTeam, Constraint, MissionBlueprint, ResourceRequirement};
pub use envelope::{
    BroadcastReply, CtsEnvelope, CtsMeta, HeartbeatEnvelope, SignalType, TRUST_SCORE_ACTUATION,
    TRUST_SCORE_COGNITIVE, TRUST_SCORE_LEDGER, TRUST_SCORE_SENSORY,
};
pub use manifest::{AgentManifest, ScheduleConfig, TeamManifest, TeamType, DEFAULT_MAX_ITERATIONS};
