//! Planner：构造对话、调用推理后端、解析工具调用
//!
//! 对话 = system + "Research query: ..." + 按 SessionState::history 时间顺序展开的 Thought / Action / Observation。
//! 后端未给出原生工具调用时，接受文本中嵌入的 JSON {"tool": ..., "args": ...}。
//! 参数文本解析失败时依次尝试宽松解析，最后退回空参数，从不报错。

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::{AgentError, HistoryItem, SessionState};
use crate::llm::{LlmClient, Message};
use crate::tools::ToolSchema;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a research agent that helps users gather information and create research reports.

Your goal is to:
1. Understand the research query
2. Search for relevant information using available tools
3. Read and extract content from relevant sources
4. Synthesize the information
5. Create a comprehensive research report

Follow the ReAct pattern:
1. Think about what you need to do next
2. Use exactly one tool per step to gather information
3. Observe the results
4. Continue until you have enough information to write a report

Always cite your sources in the final report.";

/// 一次工具调用（参数已解析为对象）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    #[serde(default)]
    pub args: Value,
}

/// 一轮规划结果：推理文本 + 至多一个工具调用
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedStep {
    pub thought: String,
    pub call: Option<ToolCall>,
}

/// 从纯文本中提取 JSON 工具调用（```json 块或第一个 { 到最后一个 }）；tool 为空或无法解析时返回 None
pub fn parse_llm_output(output: &str) -> Option<ToolCall> {
    let trimmed = output.trim();
    let json_str = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim())
    } else {
        let start = trimmed.find('{')?;
        let end = trimmed.rfind('}')?;
        if end < start {
            return None;
        }
        &trimmed[start..=end]
    };
    let mut parsed: ToolCall = serde_json::from_str(json_str).ok()?;
    if parsed.tool.trim().is_empty() {
        return None;
    }
    if !parsed.args.is_object() {
        parsed.args = Value::Object(Map::new());
    }
    Some(parsed)
}

/// 解析参数文本：严格 JSON -> 宽松解析 -> 空对象
pub fn parse_arguments(raw: &str) -> Value {
    let raw = raw.trim();
    if raw.is_empty() {
        return Value::Object(Map::new());
    }
    if let Ok(v @ Value::Object(_)) = serde_json::from_str::<Value>(raw) {
        return v;
    }
    if let Some(v) = lenient_parse(raw) {
        tracing::debug!("tool arguments recovered by lenient parse");
        return v;
    }
    tracing::warn!(raw = %raw, "unparseable tool arguments, using empty map");
    Value::Object(Map::new())
}

/// 单引号、True/False/None 字面量，以及前后夹杂说明文字的对象
fn lenient_parse(raw: &str) -> Option<Value> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    let body = &raw[start..=end];
    if let Ok(v @ Value::Object(_)) = serde_json::from_str::<Value>(body) {
        return Some(v);
    }
    let normalized = body
        .replace('\'', "\"")
        .replace("True", "true")
        .replace("False", "false")
        .replace("None", "null");
    match serde_json::from_str::<Value>(&normalized) {
        Ok(v @ Value::Object(_)) => Some(v),
        _ => None,
    }
}

/// 持有 LLM 与 system prompt，每轮从会话状态重建完整对话
pub struct Planner {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, system_prompt: impl Into<String>) -> Self {
        Self {
            llm,
            system_prompt: system_prompt.into(),
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    pub fn build_messages(&self, state: &SessionState) -> Vec<Message> {
        let mut messages = vec![
            Message::system(self.system_prompt.clone()),
            Message::user(format!("Research query: {}", state.query())),
        ];
        for entry in state.history() {
            match entry.item {
                HistoryItem::Thought(i) => {
                    if let Some(thought) = state.thoughts().get(i).filter(|t| !t.is_empty()) {
                        messages.push(Message::assistant(format!("Thought: {}", thought)));
                    }
                }
                HistoryItem::Action(i) => {
                    if let Some(action) = state.actions().get(i) {
                        messages.push(Message::assistant(format!(
                            "Action: {} {}",
                            action.tool_name, action.arguments
                        )));
                    }
                }
                HistoryItem::Observation(i) => {
                    if let Some(observation) = state.observations().get(i) {
                        messages.push(Message::user(format!("Observation: {}", observation)));
                    }
                }
            }
        }
        messages
    }

    /// 请求下一步；传输失败映射为 AgentError::LlmError
    pub async fn next_step(
        &self,
        state: &SessionState,
        tools: &[ToolSchema],
    ) -> Result<PlannedStep, AgentError> {
        let messages = self.build_messages(state);
        let reply = self
            .llm
            .complete(&messages, tools)
            .await
            .map_err(AgentError::LlmError)?;
        let call = match reply.tool_call {
            Some(req) => Some(ToolCall {
                tool: req.name,
                args: parse_arguments(&req.arguments),
            }),
            None => parse_llm_output(&reply.content),
        };
        Ok(PlannedStep {
            thought: reply.content,
            call,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ActionRecord;
    use crate::llm::{LlmReply, Role, ScriptedLlmClient};
    use serde_json::json;

    #[test]
    fn test_parse_arguments_fallbacks() {
        assert_eq!(parse_arguments(r#"{"query": "rust"}"#), json!({"query": "rust"}));
        assert_eq!(
            parse_arguments("{'query': 'rust', 'safe': True, 'page': None}"),
            json!({"query": "rust", "safe": true, "page": null})
        );
        assert_eq!(
            parse_arguments("args: {\"url\": \"https://a.org\"} thanks"),
            json!({"url": "https://a.org"})
        );
        assert_eq!(parse_arguments("not json at all"), json!({}));
        assert_eq!(parse_arguments("[1, 2]"), json!({}));
        assert_eq!(parse_arguments(""), json!({}));
    }

    #[test]
    fn test_parse_llm_output() {
        let call = parse_llm_output("I will search.\n```json\n{\"tool\": \"search_web\", \"args\": {\"query\": \"q\"}}\n```").unwrap();
        assert_eq!(call.tool, "search_web");
        assert_eq!(call.args["query"], "q");
        assert!(parse_llm_output("Just thinking out loud.").is_none());
        assert!(parse_llm_output(r#"{"tool": "", "args": {}}"#).is_none());
        assert!(parse_llm_output("{broken").is_none());
    }

    #[test]
    fn test_build_messages_history() {
        let planner = Planner::new(Arc::new(ScriptedLlmClient::default()), "sys");
        let mut state = SessionState::new("tidal energy");
        state.add_action(ActionRecord {
            tool_name: "search_web".to_string(),
            arguments: json!({"query": "tidal"}),
            result_summary: json!({}),
        });
        state.add_observation("Found 1 search results. Top results: Tides");
        state.add_thought("search first");

        let messages = planner.build_messages(&state);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].content, "Research query: tidal energy");
        assert_eq!(messages[2].content, "Thought: search first");
        assert!(messages[3].content.starts_with("Action: search_web"));
        assert_eq!(messages[4].role, Role::User);
        assert!(messages[4].content.starts_with("Observation: Found 1"));
    }

    #[test]
    fn test_build_messages_keeps_rounds_in_order() {
        let planner = Planner::new(Arc::new(ScriptedLlmClient::default()), "sys");
        let mut state = SessionState::new("tides");
        state.add_observation("Error: Query cannot be empty");
        state.increment_iteration();
        state.add_thought("try empty search");
        state.add_action(ActionRecord {
            tool_name: "search_web".to_string(),
            arguments: json!({"query": "tides"}),
            result_summary: json!({}),
        });
        state.add_observation("Found 2 search results. Top results: Tides, Moon");
        state.increment_iteration();
        state.add_thought("search tides");

        let contents: Vec<String> = planner
            .build_messages(&state)
            .into_iter()
            .skip(2)
            .map(|m| m.content)
            .collect();
        assert_eq!(
            contents,
            vec![
                "Thought: try empty search".to_string(),
                "Observation: Error: Query cannot be empty".to_string(),
                "Thought: search tides".to_string(),
                r#"Action: search_web {"query":"tides"}"#.to_string(),
                "Observation: Found 2 search results. Top results: Tides, Moon".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_next_step_native_and_text_calls() {
        let llm = Arc::new(
            ScriptedLlmClient::new([LlmReply::with_tool_call("look up", "read_url", "{'url': 'https://a.org'}")])
                .then(LlmReply::text(r#"{"tool": "search_web", "args": {"query": "x"}}"#))
                .then_error("503"),
        );
        let planner = Planner::new(llm, DEFAULT_SYSTEM_PROMPT);
        let state = SessionState::new("q");

        let step = planner.next_step(&state, &[]).await.unwrap();
        assert_eq!(step.thought, "look up");
        assert_eq!(step.call.unwrap().args["url"], "https://a.org");

        let step = planner.next_step(&state, &[]).await.unwrap();
        assert_eq!(step.call.unwrap().tool, "search_web");

        let err = planner.next_step(&state, &[]).await.unwrap_err();
        assert!(matches!(err, AgentError::LlmError(m) if m == "503"));
    }
}
