//! 团队定时触发器
//!
//! 启动后立即触发一次，此后每个 interval 向团队内部触发主题发布一条合成消息。
//! 上一次触发尚未结束时，本次 tick 直接跳过，不排队。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::bus::MessageBus;
use crate::protocol::topics;

/// tokio interval 不接受零周期
const MIN_PERIOD: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Fired,
    Skipped,
    Failed,
}

struct SchedulerInner {
    team_id: String,
    bus: Arc<dyn MessageBus>,
    in_progress: AtomicBool,
}

impl SchedulerInner {
    async fn fire(&self) -> TriggerOutcome {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::warn!(team = %self.team_id, "Scheduler skipping tick, previous trigger still in progress");
            return TriggerOutcome::Skipped;
        }

        let payload = serde_json::json!({
            "triggered_by": "scheduler",
            "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        });
        let outcome = match self
            .bus
            .publish(&topics::team_trigger(&self.team_id), payload.to_string().into_bytes())
            .await
        {
            Ok(()) => {
                tracing::info!(team = %self.team_id, "Scheduler triggered team");
                TriggerOutcome::Fired
            }
            Err(e) => {
                tracing::warn!(team = %self.team_id, error = %e, "Scheduler trigger failed");
                TriggerOutcome::Failed
            }
        };

        self.in_progress.store(false, Ordering::Release);
        outcome
    }
}

pub struct TeamScheduler {
    inner: Arc<SchedulerInner>,
    interval: Duration,
    token: CancellationToken,
}

impl TeamScheduler {
    /// token 为团队 token 的子 token
    pub fn new(
        team_id: &str,
        interval: Duration,
        bus: Arc<dyn MessageBus>,
        parent: &CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                team_id: team_id.to_string(),
                bus,
                in_progress: AtomicBool::new(false),
            }),
            interval: interval.max(MIN_PERIOD),
            token: parent.child_token(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn start(&self) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        let token = self.token.clone();
        let period = self.interval;

        tokio::spawn(async move {
            tracing::info!(team = %inner.team_id, interval = ?period, "Scheduler active");
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        tracing::info!(team = %inner.team_id, "Scheduler stopped");
                        break;
                    }
                    // 首个 tick 立即完成
                    _ = ticker.tick() => {
                        inner.fire().await;
                    }
                }
            }
        })
    }

    /// 手动触发一次（与 tick 共用同一个进行中标志）
    pub async fn trigger(&self) -> TriggerOutcome {
        self.inner.fire().await
    }

    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }
}
