//! 入口治理：Soma 在处理任何外部输入前调用 Guard
//!
//! 默认实现只做两项检查：载荷大小上限与主题前缀白名单。

use crate::config::GuardSection;
use crate::core::SwarmError;
use crate::protocol::topics::GLOBAL_INPUT_PREFIX;

/// 单条入口消息默认上限 1 MiB
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 1024 * 1024;

/// 入口校验；返回 Err 时消息被静默丢弃
pub trait IngressGuard: Send + Sync {
    fn validate_ingress(&self, subject: &str, payload: &[u8]) -> Result<(), SwarmError>;
}

#[derive(Debug, Clone)]
pub struct Guard {
    max_payload_bytes: usize,
    allowed_prefixes: Vec<String>,
}

impl Guard {
    pub fn new(max_payload_bytes: usize, allowed_prefixes: Vec<String>) -> Self {
        Self {
            max_payload_bytes,
            allowed_prefixes,
        }
    }

    pub fn from_config(section: &GuardSection) -> Self {
        Self::new(section.max_payload_bytes, section.allowed_prefixes.clone())
    }
}

impl Default for Guard {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAYLOAD_BYTES, vec![GLOBAL_INPUT_PREFIX.to_string()])
    }
}

impl IngressGuard for Guard {
    fn validate_ingress(&self, subject: &str, payload: &[u8]) -> Result<(), SwarmError> {
        if payload.len() > self.max_payload_bytes {
            return Err(SwarmError::IngressRejected(format!(
                "payload too large: {} bytes (max {})",
                payload.len(),
                self.max_payload_bytes
            )));
        }
        if !self.allowed_prefixes.iter().any(|p| subject.starts_with(p.as_str())) {
            return Err(SwarmError::IngressRejected(format!(
                "subject {} not in ingress allowlist",
                subject
            )));
        }
        Ok(())
    }
}
