//! 无 API 的 LLM 客户端
//!
//! MockLlmClient：未配置 API Key 时的回退，只给出推理文本、不请求工具。
//! ScriptedLlmClient：按顺序回放预设回复（或错误），用于测试与演示；同时记录每次收到的对话。

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmReply, Message, Role};
use crate::tools::ToolSchema;

#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message], _tools: &[ToolSchema]) -> Result<LlmReply, String> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        Ok(LlmReply::text(format!(
            "Mock reasoning (no LLM API key configured): considering '{}'",
            last_user
        )))
    }
}

#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    replies: Mutex<VecDeque<Result<LlmReply, String>>>,
    seen: Mutex<Vec<Vec<Message>>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ScriptedLlmClient {
    pub fn new(replies: impl IntoIterator<Item = LlmReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(Ok).collect()),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// 追加一个成功回复
    pub fn then(self, reply: LlmReply) -> Self {
        lock(&self.replies).push_back(Ok(reply));
        self
    }

    /// 追加一个传输错误（模拟后端故障）
    pub fn then_error(self, error: impl Into<String>) -> Self {
        lock(&self.replies).push_back(Err(error.into()));
        self
    }

    pub fn remaining(&self) -> usize {
        lock(&self.replies).len()
    }

    /// 每次 complete 收到的完整对话
    pub fn requests(&self) -> Vec<Vec<Message>> {
        lock(&self.seen).clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, messages: &[Message], _tools: &[ToolSchema]) -> Result<LlmReply, String> {
        lock(&self.seen).push(messages.to_vec());
        lock(&self.replies)
            .pop_front()
            .unwrap_or_else(|| Ok(LlmReply::text("No further actions.")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_is_reasoning_only() {
        let reply = MockLlmClient
            .complete(&[Message::user("Research query: tides")], &[])
            .await
            .unwrap();
        assert!(reply.tool_call.is_none());
        assert!(reply.content.contains("tides"));
    }

    #[tokio::test]
    async fn test_scripted_replays_in_order() {
        let llm = ScriptedLlmClient::new([LlmReply::text("one")])
            .then_error("boom")
            .then(LlmReply::with_tool_call("two", "search_web", "{}"));
        assert_eq!(llm.complete(&[], &[]).await.unwrap().content, "one");
        assert_eq!(llm.complete(&[], &[]).await.unwrap_err(), "boom");
        assert_eq!(llm.complete(&[], &[]).await.unwrap().tool_call.unwrap().name, "search_web");
        assert_eq!(llm.remaining(), 0);
        assert_eq!(llm.complete(&[], &[]).await.unwrap().content, "No further actions.");
        assert_eq!(llm.requests().len(), 4);
    }
}
