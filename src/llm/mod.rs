//! LLM 层：客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock / 脚本回放）

pub mod message;
pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;

pub use message::{Message, Role};
pub use mock::{MockLlmClient, ScriptedLlmClient};
pub use openai::{OpenAiClient, TokenUsage, DEEPSEEK_BASE_URL};
pub use traits::{LlmClient, LlmReply, ToolCallRequest};

use crate::config::LlmSection;

/// 按 [llm] 配置创建客户端；对应 API Key 不存在时回退到 MockLlmClient
pub fn create_llm_from_config(cfg: &LlmSection) -> Arc<dyn LlmClient> {
    let provider = cfg.provider.to_lowercase();
    let (key_var, default_base) = match provider.as_str() {
        "mock" => return Arc::new(MockLlmClient),
        "deepseek" => ("DEEPSEEK_API_KEY", Some(DEEPSEEK_BASE_URL)),
        _ => ("OPENAI_API_KEY", None),
    };
    let api_key = std::env::var(key_var).ok().filter(|k| !k.trim().is_empty());
    let Some(api_key) = api_key else {
        tracing::warn!(provider = %provider, "{} not set, using mock LLM", key_var);
        return Arc::new(MockLlmClient);
    };
    let base_url = cfg.base_url.as_deref().or(default_base);
    tracing::info!(provider = %provider, model = %cfg.model, "using LLM backend");
    Arc::new(
        OpenAiClient::new(base_url, &cfg.model, &api_key)
            .with_temperature(cfg.temperature)
            .with_request_timeout(cfg.timeouts.request),
    )
}
