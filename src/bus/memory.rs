//! 进程内总线
//!
//! 每个订阅持有一个有界 mpsc 通道；发布时对匹配的订阅 try_send，
//! 缓冲区满则丢弃该条（至多一次投递），接收端已 drop 的订阅在下次发布时清理。

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use super::{subject_matches, validate_subject, Message, MessageBus, Subscription};
use crate::core::SwarmError;

/// 每个订阅默认缓冲的消息数
pub const DEFAULT_BUFFER_CAPACITY: usize = 1024;

struct Subscriber {
    id: u64,
    pattern: String,
    tx: mpsc::Sender<Message>,
}

pub struct InMemoryBus {
    subscribers: RwLock<Vec<Subscriber>>,
    next_id: AtomicU64,
    capacity: usize,
    connected: AtomicBool,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
            connected: AtomicBool::new(true),
        }
    }

    /// 断开：丢弃所有订阅，之后的发布/订阅返回 BusUnavailable
    pub async fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.subscribers.write().await.clear();
        tracing::info!("In-memory bus closed");
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// 投递到所有匹配的订阅，返回实际送达数
    async fn dispatch(&self, msg: Message) -> Result<usize, SwarmError> {
        if !self.is_connected() {
            return Err(SwarmError::BusUnavailable);
        }
        validate_subject(&msg.subject, false)?;

        let mut delivered = 0;
        let mut closed = Vec::new();
        {
            let subscribers = self.subscribers.read().await;
            for sub in subscribers.iter().filter(|s| subject_matches(&s.pattern, &msg.subject)) {
                match sub.tx.try_send(msg.clone()) {
                    Ok(()) => delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::warn!(
                            subject = %msg.subject,
                            pattern = %sub.pattern,
                            "Subscriber buffer full, message dropped"
                        );
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => closed.push(sub.id),
                }
            }
        }

        if !closed.is_empty() {
            self.subscribers
                .write()
                .await
                .retain(|s| !closed.contains(&s.id));
        }

        Ok(delivered)
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), SwarmError> {
        self.dispatch(Message::new(subject, payload)).await.map(|_| ())
    }

    async fn subscribe(&self, pattern: &str) -> Result<Subscription, SwarmError> {
        if !self.is_connected() {
            return Err(SwarmError::BusUnavailable);
        }
        validate_subject(pattern, true)?;

        let (tx, rx) = mpsc::channel(self.capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.write().await.push(Subscriber {
            id,
            pattern: pattern.to_string(),
            tx,
        });
        tracing::debug!(pattern, id, "Subscribed");
        Ok(Subscription::new(pattern.to_string(), rx))
    }

    async fn request(
        &self,
        subject: &str,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> Result<Message, SwarmError> {
        let inbox = format!("_INBOX.{}", Uuid::new_v4().simple());
        let mut sub = self.subscribe(&inbox).await?;

        let msg = Message {
            subject: subject.to_string(),
            payload,
            reply: Some(inbox),
        };
        if self.dispatch(msg).await? == 0 {
            return Err(SwarmError::NoResponders(subject.to_string()));
        }

        match tokio::time::timeout(timeout, sub.next()).await {
            Ok(Some(reply)) => Ok(reply),
            Ok(None) => Err(SwarmError::BusUnavailable),
            Err(_) => Err(SwarmError::RequestTimeout(subject.to_string())),
        }
    }
}
