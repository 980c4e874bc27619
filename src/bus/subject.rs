//! 主题校验与通配匹配（NATS 语义）
//!
//! `*` 匹配恰好一个 token，`>` 只能出现在末尾，匹配剩余的一个或多个 token。

use crate::core::SwarmError;

/// 校验主题；`allow_wildcards` 为 false 时（发布）不允许出现 `*` / `>`
pub fn validate_subject(subject: &str, allow_wildcards: bool) -> Result<(), SwarmError> {
    if subject.is_empty() || subject.chars().any(char::is_whitespace) {
        return Err(SwarmError::InvalidSubject(subject.to_string()));
    }

    let tokens: Vec<&str> = subject.split('.').collect();
    for (i, token) in tokens.iter().enumerate() {
        if token.is_empty() {
            return Err(SwarmError::InvalidSubject(subject.to_string()));
        }
        let is_wildcard = *token == "*" || *token == ">";
        if is_wildcard && !allow_wildcards {
            return Err(SwarmError::InvalidSubject(subject.to_string()));
        }
        if *token == ">" && i != tokens.len() - 1 {
            return Err(SwarmError::InvalidSubject(subject.to_string()));
        }
    }
    Ok(())
}

/// 具体主题是否匹配订阅模式
pub fn subject_matches(pattern: &str, subject: &str) -> bool {
    let mut pattern_tokens = pattern.split('.');
    let mut subject_tokens = subject.split('.');
    loop {
        match (pattern_tokens.next(), subject_tokens.next()) {
            (Some(">"), Some(_)) => return true,
            (Some("*"), Some(_)) => continue,
            (Some(p), Some(s)) if p == s => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}
