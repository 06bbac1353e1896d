//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url，DeepSeek 同样适用），使用原生 function calling：
//! 工具声明以 `tools: [{type: "function", function: {...}}]` 发送，tool_choice=auto，只取第一个 tool_call。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::Client;
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::llm::{LlmClient, LlmReply, Message, ToolCallRequest};
use crate::tools::ToolSchema;

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
    request_timeout: Duration,
    pub usage: TokenUsage,
}

impl OpenAiClient {
    pub fn new(base_url: Option<&str>, model: &str, api_key: &str) -> Self {
        let config = match base_url {
            Some(url) => OpenAIConfig::new().with_api_base(url).with_api_key(api_key),
            None => OpenAIConfig::new().with_api_key(api_key),
        };
        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            temperature: 0.7,
            request_timeout: Duration::from_secs(60),
            usage: TokenUsage::new(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_request_timeout(mut self, secs: u64) -> Self {
        self.request_timeout = Duration::from_secs(secs);
        self
    }

    fn build_request(&self, messages: &[Message], tools: &[ToolSchema]) -> Value {
        let messages: Vec<Value> = messages
            .iter()
            .map(|m| json!({"role": m.role.as_str(), "content": m.content}))
            .collect();
        let mut request = json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
        });
        if !tools.is_empty() {
            let tools: Vec<Value> = tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            request["tools"] = Value::Array(tools);
            request["tool_choice"] = json!("auto");
        }
        request
    }

    fn parse_response(&self, response: &Value) -> LlmReply {
        if let Some(usage) = response.get("usage") {
            self.usage.add(
                usage["prompt_tokens"].as_u64().unwrap_or(0),
                usage["completion_tokens"].as_u64().unwrap_or(0),
            );
        }
        let message = &response["choices"][0]["message"];
        let content = message["content"].as_str().unwrap_or_default().to_string();
        let tool_call = message["tool_calls"]
            .as_array()
            .and_then(|calls| calls.first())
            .and_then(|call| {
                let function = call.get("function")?;
                Some(ToolCallRequest {
                    name: function.get("name")?.as_str()?.to_string(),
                    arguments: match function.get("arguments") {
                        Some(Value::String(s)) => s.clone(),
                        Some(other) => other.to_string(),
                        None => String::new(),
                    },
                })
            });
        LlmReply { content, tool_call }
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    async fn complete(&self, messages: &[Message], tools: &[ToolSchema]) -> Result<LlmReply, String> {
        let request = self.build_request(messages, tools);
        let response: Value = tokio::time::timeout(
            self.request_timeout,
            self.client.chat().create_byot(request),
        )
        .await
        .map_err(|_| format!("request timed out after {}s", self.request_timeout.as_secs()))?
        .map_err(|e| e.to_string())?;
        Ok(self.parse_response(&response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OpenAiClient {
        OpenAiClient::new(Some("http://127.0.0.1:9"), "test-model", "sk-test")
    }

    #[test]
    fn test_build_request_advertises_tools() {
        let tools = vec![ToolSchema {
            name: "search_web".to_string(),
            description: "search".to_string(),
            parameters: json!({"type": "object"}),
        }];
        let req = client().build_request(&[Message::user("hi")], &tools);
        assert_eq!(req["messages"][0]["role"], "user");
        assert_eq!(req["tools"][0]["function"]["name"], "search_web");
        assert_eq!(req["tool_choice"], "auto");
        assert!(client().build_request(&[], &[]).get("tools").is_none());
    }

    #[test]
    fn test_parse_response_with_tool_call() {
        let c = client();
        let reply = c.parse_response(&json!({
            "choices": [{"message": {
                "content": "Let me search.",
                "tool_calls": [{"type": "function", "function": {
                    "name": "search_web", "arguments": "{\"query\":\"rust\"}"
                }}]
            }}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5}
        }));
        assert_eq!(reply.content, "Let me search.");
        let call = reply.tool_call.unwrap();
        assert_eq!(call.name, "search_web");
        assert_eq!(call.arguments, r#"{"query":"rust"}"#);
        assert_eq!(c.token_usage(), (10, 5, 15));
    }

    #[test]
    fn test_parse_response_text_only() {
        let reply = client().parse_response(&json!({
            "choices": [{"message": {"content": "Done.", "tool_calls": null}}]
        }));
        assert_eq!(reply, LlmReply::text("Done."));
    }
}
