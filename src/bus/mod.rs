//! 消息总线抽象
//!
//! 兼容 NATS 语义的发布/订阅：层级主题、`*` / `>` 通配、基于 inbox 的请求/应答（带超时）。
//! 投递至多一次，不保证顺序与持久化。运行时只依赖 MessageBus trait，
//! 进程内实现见 InMemoryBus。

pub mod memory;
pub mod subject;

use std::borrow::Cow;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::core::SwarmError;

pub use memory::InMemoryBus;
pub use subject::{subject_matches, validate_subject};

/// 一条总线消息；reply 非空表示发送方在等待应答
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub subject: String,
    pub payload: Vec<u8>,
    pub reply: Option<String>,
}

impl Message {
    pub fn new(subject: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            subject: subject.into(),
            payload,
            reply: None,
        }
    }

    pub fn payload_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// 订阅句柄：drop 即退订
pub struct Subscription {
    pattern: String,
    rx: mpsc::Receiver<Message>,
}

impl Subscription {
    pub(crate) fn new(pattern: String, rx: mpsc::Receiver<Message>) -> Self {
        Self { pattern, rx }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// 下一条消息；总线关闭后返回 None
    pub async fn next(&mut self) -> Option<Message> {
        self.rx.recv().await
    }
}

/// 总线客户端
#[async_trait]
pub trait MessageBus: Send + Sync {
    fn is_connected(&self) -> bool;

    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), SwarmError>;

    async fn subscribe(&self, pattern: &str) -> Result<Subscription, SwarmError>;

    /// 发送请求并等待第一条应答
    async fn request(
        &self,
        subject: &str,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> Result<Message, SwarmError>;

    /// 回复一条请求；消息没有 reply 主题时什么也不做
    async fn respond(&self, msg: &Message, payload: Vec<u8>) -> Result<(), SwarmError> {
        match &msg.reply {
            Some(reply) => self.publish(reply, payload).await,
            None => Ok(()),
        }
    }
}
