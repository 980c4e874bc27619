//! 运行时配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `SWARM__*` 覆盖（双下划线表示嵌套，如 `SWARM__LLM__PROVIDER=openai`）。

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::governance::DEFAULT_MAX_PAYLOAD_BYTES;
use crate::protocol::topics::GLOBAL_INPUT_PREFIX;

/// 配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub bus: BusSection,
    pub swarm: SwarmSection,
    pub sensor: SensorSection,
    pub guard: GuardSection,
    pub tools: ToolsSection,
    pub llm: LlmSection,
    pub mission: MissionSection,
}

/// [bus] 段
#[derive(Debug, Clone, Deserialize)]
pub struct BusSection {
    /// 每个订阅的缓冲消息数，满了就丢
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
}

fn default_buffer_capacity() -> usize {
    crate::bus::memory::DEFAULT_BUFFER_CAPACITY
}

impl Default for BusSection {
    fn default() -> Self {
        Self {
            buffer_capacity: default_buffer_capacity(),
        }
    }
}

/// [swarm] 段：心跳、调度下限、广播超时、Axon 路由目标
#[derive(Debug, Clone, Deserialize)]
pub struct SwarmSection {
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    /// TeamScheduler 间隔下限（秒），低于此值会被抬高
    #[serde(default = "default_min_schedule_secs")]
    pub min_schedule_secs: u64,
    #[serde(default = "default_broadcast_timeout_secs")]
    pub broadcast_timeout_secs: u64,
    /// Axon 默认路由的团队
    #[serde(default = "default_route_team")]
    pub default_team: String,
    /// "system_status" 请求路由到的团队
    #[serde(default = "default_status_team")]
    pub status_team: String,
}

fn default_heartbeat_secs() -> u64 {
    5
}

fn default_min_schedule_secs() -> u64 {
    30
}

fn default_broadcast_timeout_secs() -> u64 {
    60
}

fn default_route_team() -> String {
    "genesis".to_string()
}

fn default_status_team() -> String {
    "telemetry".to_string()
}

impl SwarmSection {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs.max(1))
    }

    pub fn min_schedule_interval(&self) -> Duration {
        Duration::from_secs(self.min_schedule_secs.max(1))
    }

    pub fn broadcast_timeout(&self) -> Duration {
        Duration::from_secs(self.broadcast_timeout_secs)
    }
}

impl Default for SwarmSection {
    fn default() -> Self {
        Self {
            heartbeat_secs: default_heartbeat_secs(),
            min_schedule_secs: default_min_schedule_secs(),
            broadcast_timeout_secs: default_broadcast_timeout_secs(),
            default_team: default_route_team(),
            status_team: default_status_team(),
        }
    }
}

/// [sensor] 段：轮询默认间隔与 HTTP 限制
#[derive(Debug, Clone, Deserialize)]
pub struct SensorSection {
    #[serde(default = "default_sensor_interval_secs")]
    pub default_interval_secs: u64,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_sensor_interval_secs() -> u64 {
    60
}

fn default_http_timeout_secs() -> u64 {
    10
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

impl SensorSection {
    /// 未单独配置 interval 的传感器使用该值，至少 1 秒
    pub fn default_interval(&self) -> Duration {
        Duration::from_secs(self.default_interval_secs.max(1))
    }
}

impl Default for SensorSection {
    fn default() -> Self {
        Self {
            default_interval_secs: default_sensor_interval_secs(),
            http_timeout_secs: default_http_timeout_secs(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// [guard] 段
#[derive(Debug, Clone, Deserialize)]
pub struct GuardSection {
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
    #[serde(default = "default_allowed_prefixes")]
    pub allowed_prefixes: Vec<String>,
}

fn default_max_payload_bytes() -> usize {
    DEFAULT_MAX_PAYLOAD_BYTES
}

fn default_allowed_prefixes() -> Vec<String> {
    vec![GLOBAL_INPUT_PREFIX.to_string()]
}

impl Default for GuardSection {
    fn default() -> Self {
        Self {
            max_payload_bytes: default_max_payload_bytes(),
            allowed_prefixes: default_allowed_prefixes(),
        }
    }
}

/// [tools] 段
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    /// consult_council 等待应答的超时（秒）
    #[serde(default = "default_council_timeout_secs")]
    pub council_timeout_secs: u64,
}

fn default_tool_timeout_secs() -> u64 {
    30
}

fn default_council_timeout_secs() -> u64 {
    30
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
            council_timeout_secs: default_council_timeout_secs(),
        }
    }
}

/// [llm] 段：推理后端；profiles 把 agent 的 model/profile 名映射为实际模型名
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// mock / openai
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    #[serde(default)]
    pub profiles: HashMap<String, String>,
}

fn default_provider() -> String {
    "mock".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            profiles: HashMap::new(),
        }
    }
}

/// [mission] 段：启动时加载的常驻团队与蓝图（均为 JSON 文件）
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MissionSection {
    /// TeamManifest 数组，Soma 启动时逐个 spawn
    pub teams: Option<PathBuf>,
    pub blueprint: Option<PathBuf>,
    /// agent id → SensorConfig，随蓝图一起激活
    pub sensors: Option<PathBuf>,
    /// 未配置蓝图时激活内置的传感器种子任务
    #[serde(default)]
    pub seed: bool,
}

/// 加载配置，环境变量 SWARM__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 SWARM__*
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default"] {
        if std::path::Path::new(&format!("{}.toml", name)).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("SWARM")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
