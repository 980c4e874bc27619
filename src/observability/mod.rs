//! 可观测性：tracing 订阅器初始化
//!
//! 默认 info 级别，RUST_LOG 可覆盖（如 `RUST_LOG=swarm=debug`）。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 进程内只应调用一次；重复初始化时静默忽略
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init();
}
