//! 推理层：Brain 抽象与实现（OpenAI 兼容 / Mock）

pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;

pub use mock::MockBrain;
pub use openai::OpenAiBrain;
pub use traits::{Brain, InferRequest, InferResponse};

use crate::config::LlmSection;

/// 按 [llm].provider 创建推理引擎；未知 provider 退回 mock
pub fn create_brain(section: &LlmSection) -> Arc<dyn Brain> {
    match section.provider.as_str() {
        "openai" => Arc::new(OpenAiBrain::from_config(section)),
        "mock" => Arc::new(MockBrain::new()),
        other => {
            tracing::warn!(provider = other, "Unknown LLM provider, falling back to mock");
            Arc::new(MockBrain::new())
        }
    }
}
