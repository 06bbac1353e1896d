//! LLM 客户端抽象
//!
//! 后端接收完整对话与可用工具声明，返回一段文本，外加至多一个工具调用请求（参数为原始文本，由 Planner 解析）。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::llm::Message;
use crate::tools::ToolSchema;

/// 后端请求的一次工具调用；arguments 为未解析的参数文本
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub name: String,
    pub arguments: String,
}

/// 一次完成的结果：推理文本 + 可选工具调用
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LlmReply {
    pub content: String,
    pub tool_call: Option<ToolCallRequest>,
}

impl LlmReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_call: None,
        }
    }

    pub fn with_tool_call(
        content: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            content: content.into(),
            tool_call: Some(ToolCallRequest {
                name: name.into(),
                arguments: arguments.into(),
            }),
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[Message], tools: &[ToolSchema]) -> Result<LlmReply, String>;

    /// 累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
