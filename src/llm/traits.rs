//! 推理引擎抽象
//!
//! 运行时只看到一次尽力而为的推理结果或终止错误；重试、降级、输出校验都属于 Brain 的实现细节。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferRequest {
    /// 推理 profile（如 "chat"、"coder"），由实现映射到具体模型
    pub profile: String,
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferResponse {
    pub text: String,
    pub model_used: String,
    pub provider: String,
}

#[async_trait]
pub trait Brain: Send + Sync {
    async fn infer_with_contract(&self, req: InferRequest) -> Result<InferResponse, String>;
}
