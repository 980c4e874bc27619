//! 优雅关闭
//!
//! ShutdownManager 持有进程级根 token：Soma 的 token 由它派生，
//! 收到 Ctrl+C / SIGTERM 后取消根 token，所有团队与 actor 随之退出；
//! ShutdownCoordinator 依次执行注册的清理任务（带超时）。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// 关闭信号管理器
#[derive(Clone)]
pub struct ShutdownManager {
    shutdown_token: CancellationToken,
    reason_tx: broadcast::Sender<ShutdownReason>,
}

/// 关闭原因
#[derive(Debug, Clone, PartialEq)]
pub enum ShutdownReason {
    /// Ctrl+C
    UserInitiated,
    /// SIGTERM
    Signal,
    FatalError(String),
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (reason_tx, _) = broadcast::channel(1);
        Self {
            shutdown_token: CancellationToken::new(),
            reason_tx,
        }
    }

    /// 根 token；Soma 在其下派生子 token
    pub fn token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn shutdown(&self, reason: ShutdownReason) {
        let _ = self.reason_tx.send(reason);
        self.shutdown_token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownReason> {
        self.reason_tx.subscribe()
    }

    pub async fn wait_for_shutdown(&self) {
        self.shutdown_token.cancelled().await;
    }

    /// 安装系统信号处理器 (Ctrl+C, SIGTERM)
    pub fn install_signal_handlers(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                tracing::info!(signal = "ctrl_c", "Shutdown requested");
                manager.shutdown(ShutdownReason::UserInitiated);
            }
        });

        #[cfg(unix)]
        {
            let manager = Arc::clone(self);
            tokio::spawn(async move {
                use tokio::signal::unix::{signal, SignalKind};
                if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                    sigterm.recv().await;
                    tracing::info!(signal = "sigterm", "Shutdown requested");
                    manager.shutdown(ShutdownReason::Signal);
                }
            });
        }
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

/// 关闭阶段的清理任务（Soma 注册自身以停止全部团队）
#[async_trait::async_trait]
pub trait ShutdownCleanup: Send + Sync {
    async fn cleanup(&self) -> anyhow::Result<()>;

    /// 清理任务名称（用于日志）
    fn name(&self) -> &'static str;
}

/// 按注册顺序执行清理任务；单个任务超时不阻塞后续任务
pub struct ShutdownCoordinator {
    manager: Arc<ShutdownManager>,
    cleanups: Vec<Arc<dyn ShutdownCleanup>>,
    timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new(manager: Arc<ShutdownManager>) -> Self {
        Self {
            manager,
            cleanups: Vec::new(),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn register(&mut self, task: Arc<dyn ShutdownCleanup>) {
        self.cleanups.push(task);
    }

    /// 根 token 尚未取消时先以 FatalError 取消，保证所有 actor 都能看到关闭信号
    pub async fn run_cleanup(&self) {
        if !self.manager.is_shutdown() {
            self.manager
                .shutdown(ShutdownReason::FatalError("cleanup requested".to_string()));
        }
        tracing::info!(tasks = self.cleanups.len(), "Running shutdown cleanup");

        for task in &self.cleanups {
            let name = task.name();
            match tokio::time::timeout(self.timeout, task.cleanup()).await {
                Ok(Ok(())) => tracing::info!(task = name, "Cleanup completed"),
                Ok(Err(e)) => tracing::warn!(task = name, error = %e, "Cleanup failed"),
                Err(_) => tracing::warn!(task = name, timeout = ?self.timeout, "Cleanup timed out"),
            }
        }
    }
}
