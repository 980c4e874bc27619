//! 工具调度层：内部注册表、组合执行器、按 agent 限定范围的执行器，以及内置工具

pub mod council;
pub mod executor;
pub mod registry;
pub mod scope;
pub mod signal;
pub mod teams;

use std::sync::{Arc, Weak};

use serde_json::Value;

pub use council::ConsultCouncilTool;
pub use executor::{CompositeToolExecutor, ServerId, ToolDispatch, INTERNAL_SERVER_ID};
pub use registry::{Tool, ToolRegistry};
pub use scope::{extract_tool_refs, is_external_ref, ScopedToolExecutor, ToolRef};
pub use signal::{DelegateTaskTool, PublishSignalTool};
pub use teams::{BroadcastTool, ListTeamsTool, SwarmControl};

use crate::bus::MessageBus;
use crate::config::ToolsSection;

/// 取非空字符串参数
pub(crate) fn str_arg<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str()).filter(|s| !s.is_empty())
}

/// 注册全部内置工具
pub fn register_builtin_tools(
    registry: &mut ToolRegistry,
    bus: Arc<dyn MessageBus>,
    control: Weak<dyn SwarmControl>,
    section: &ToolsSection,
) {
    registry.register(ConsultCouncilTool::new(bus.clone(), section.council_timeout_secs));
    registry.register(DelegateTaskTool::new(bus.clone()));
    registry.register(PublishSignalTool::new(bus));
    registry.register(ListTeamsTool::new(control.clone()));
    registry.register(BroadcastTool::new(control));
}
