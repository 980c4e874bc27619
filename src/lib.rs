//! Swarm - 基于发布/订阅总线的多智能体蜂群运行时
//!
//! 模块划分：
//! - **bus**: 消息总线抽象（NATS 语义）与进程内实现
//! - **config**: 运行时配置加载（TOML + 环境变量）
//! - **core**: 错误类型、优雅关闭
//! - **governance**: 入口 Guard
//! - **llm**: Brain 抽象与实现（OpenAI 兼容 / Mock）
//! - **protocol**: 主题约定、团队清单、任务蓝图、遥测信封
//! - **swarm**: Soma / Axon、团队、Agent、SensorAgent、蓝图激活、定时触发
//! - **tools**: 工具注册表、组合执行器、按 agent 限定范围的执行器与内置工具

pub mod bus;
pub mod config;
pub mod core;
pub mod governance;
pub mod llm;
pub mod observability;
pub mod protocol;
pub mod swarm;
pub mod tools;

pub use bus::{InMemoryBus, MessageBus};
pub use core::SwarmError;
pub use swarm::{ActivationResult, Soma, SomaBuilder};
