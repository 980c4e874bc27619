//! 总线主题约定（线上协议，字符串必须逐字一致）
//!
//! 团队 ID / agent ID 原样插入，不做转义。

/// 外部入口通配：所有消息先过 Guard
pub const GLOBAL_INPUT_WILDCARD: &str = "swarm.global.input.>";
/// 入口前缀（Guard 的主题白名单）
pub const GLOBAL_INPUT_PREFIX: &str = "swarm.global.input";
pub const GLOBAL_INPUT_USER: &str = "swarm.global.input.user";
pub const GLOBAL_BROADCAST: &str = "swarm.global.broadcast";
pub const GLOBAL_HEARTBEAT: &str = "swarm.global.heartbeat";
/// Axon 的活动流监听：所有团队的内部总线
pub const TEAM_INTERNAL_WILDCARD: &str = "swarm.team.*.internal.>";

pub fn global_input(source: &str) -> String {
    format!("swarm.global.input.{}", source)
}

pub fn team_trigger(team_id: &str) -> String {
    format!("swarm.team.{}.internal.trigger", team_id)
}

pub fn team_response(team_id: &str) -> String {
    format!("swarm.team.{}.internal.response", team_id)
}

pub fn team_command(team_id: &str) -> String {
    format!("swarm.team.{}.internal.command", team_id)
}

pub fn team_telemetry(team_id: &str) -> String {
    format!("swarm.team.{}.telemetry", team_id)
}

pub fn team_signal_status(team_id: &str) -> String {
    format!("swarm.team.{}.signal.status", team_id)
}

pub fn council_request(agent_id: &str) -> String {
    format!("swarm.council.{}.request", agent_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_team_subjects_interpolate_id_verbatim() {
        let id = "mission-1.research-team";
        assert_eq!(team_trigger(id), "swarm.team.mission-1.research-team.internal.trigger");
        assert_eq!(team_response(id), "swarm.team.mission-1.research-team.internal.response");
        assert_eq!(team_telemetry(id), "swarm.team.mission-1.research-team.telemetry");
        assert_eq!(council_request("architect"), "swarm.council.architect.request");
        assert_eq!(global_input("cli"), "swarm.global.input.cli");
    }
}
