//! OpenAI 兼容推理引擎
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；
//! agent 的 profile 经 [llm.profiles] 映射为模型名，未映射的 profile 使用默认模型。

use std::collections::HashMap;

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;

use crate::config::LlmSection;
use crate::llm::{Brain, InferRequest, InferResponse};

pub struct OpenAiBrain {
    client: Client<OpenAIConfig>,
    default_model: String,
    profiles: HashMap<String, String>,
}

impl OpenAiBrain {
    pub fn new(base_url: Option<&str>, default_model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = match base_url {
            Some(url) => OpenAIConfig::new().with_api_base(url).with_api_key(api_key),
            None => OpenAIConfig::new().with_api_key(api_key),
        };

        Self {
            client: Client::with_config(config),
            default_model: default_model.to_string(),
            profiles: HashMap::new(),
        }
    }

    pub fn from_config(section: &LlmSection) -> Self {
        Self::new(section.base_url.as_deref(), &section.model, None)
            .with_profiles(section.profiles.clone())
    }

    pub fn with_profiles(mut self, profiles: HashMap<String, String>) -> Self {
        self.profiles = profiles;
        self
    }

    pub fn model_for(&self, profile: &str) -> &str {
        self.profiles
            .get(profile)
            .map(String::as_str)
            .unwrap_or(&self.default_model)
    }
}

#[async_trait]
impl Brain for OpenAiBrain {
    async fn infer_with_contract(&self, req: InferRequest) -> Result<InferResponse, String> {
        let model = self.model_for(&req.profile).to_string();
        let message = ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessageArgs::default()
                .content(req.prompt)
                .build()
                .map_err(|e| e.to_string())?,
        );
        let request = CreateChatCompletionRequestArgs::default()
            .model(&model)
            .messages(vec![message])
            .build()
            .map_err(|e| e.to_string())?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| e.to_string())?;

        if let Some(usage) = &response.usage {
            tracing::debug!(
                model = %model,
                profile = %req.profile,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Inference usage"
            );
        }

        let text = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        Ok(InferResponse {
            text,
            model_used: response.model,
            provider: "openai".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_mapping_falls_back_to_default_model() {
        let mut profiles = HashMap::new();
        profiles.insert("coder".to_string(), "gpt-4o".to_string());
        let brain = OpenAiBrain::new(Some("http://localhost:9"), "gpt-4o-mini", Some("sk-test"))
            .with_profiles(profiles);
        assert_eq!(brain.model_for("coder"), "gpt-4o");
        assert_eq!(brain.model_for("chat"), "gpt-4o-mini");
    }
}
