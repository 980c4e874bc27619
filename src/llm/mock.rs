//! Mock 推理引擎（用于测试与离线运行，无需 API）
//!
//! 按脚本依次返回预设回答，脚本用完后重复最后一条；未设脚本时回显 prompt 末尾的输入。
//! 记录收到的所有 prompt，便于断言 ReAct 循环的上下文拼接。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{Brain, InferRequest, InferResponse};

#[derive(Debug, Default)]
pub struct MockBrain {
    script: Mutex<VecDeque<String>>,
    last: Mutex<Option<String>>,
    prompts: Mutex<Vec<String>>,
    fail: bool,
}

impl MockBrain {
    /// 回显模式
    pub fn new() -> Self {
        Self::default()
    }

    /// 总是返回同一段文本
    pub fn with_response(text: &str) -> Self {
        Self::scripted(vec![text.to_string()])
    }

    pub fn scripted(responses: Vec<String>) -> Self {
        Self {
            script: Mutex::new(responses.into()),
            ..Self::default()
        }
    }

    /// 每次推理都失败
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    fn next_response(&self, prompt: &str) -> String {
        let scripted = self.script.lock().ok().and_then(|mut s| s.pop_front());
        let mut last = match self.last.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(text) = scripted {
            *last = Some(text.clone());
            return text;
        }
        if let Some(text) = last.as_ref() {
            return text.clone();
        }
        let input = prompt.rsplit("Input: ").next().unwrap_or(prompt);
        format!("Echo from Mock: {}", input)
    }
}

#[async_trait]
impl Brain for MockBrain {
    async fn infer_with_contract(&self, req: InferRequest) -> Result<InferResponse, String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(req.prompt.clone());
        }
        if self.fail {
            return Err("mock brain offline".to_string());
        }
        Ok(InferResponse {
            text: self.next_response(&req.prompt),
            model_used: req.profile,
            provider: "mock".to_string(),
        })
    }
}
