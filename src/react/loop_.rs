//! ReAct 单轮：THINK -> ACT -> OBSERVE
//!
//! THINK：由 Planner 基于完整历史请求下一步（推理文本 + 至多一个工具调用）。
//! ACT：查找工具 -> 前置护栏链 -> （如需）人工审批 -> 执行 -> 后置护栏链。
//! 校验失败、未知工具、审批拒绝与工具失败都只记录错误 Observation，不触碰 actions；
//! 成功时依次追加 action、Observation、来源与信息片段。终止条件由编排器在每轮之后判断。

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::mpsc::UnboundedSender;

use crate::core::{ActionRecord, AgentError, SessionState};
use crate::governance::HumanApproval;
use crate::guardrails::{PostExecutionHook, PreExecutionHook};
use crate::react::events::{preview, send_event};
use crate::react::{Planner, ReactEvent, ToolCall};
use crate::tools::{Severity, Tool, ToolExecutor, ToolKind};

/// Observation 预览最大字符数
const OBSERVATION_PREVIEW_CHARS: usize = 200;
/// 思考内容展示最大字符数
const THOUGHT_PREVIEW_CHARS: usize = 800;

/// 本轮动作的结果
#[derive(Debug, Clone, PartialEq)]
pub enum StepResult {
    /// 只产生了推理文本
    NoAction,
    Success {
        tool: String,
        kind: ToolKind,
        data: Value,
        metadata: Map<String, Value>,
    },
    Error {
        tool: String,
        message: String,
        severity: Severity,
    },
}

impl StepResult {
    /// 结果中写出的文件路径（报告已写出）
    pub fn artifact_path(&self) -> Option<String> {
        match self {
            StepResult::Success { kind, data, .. } => kind.interpreter().artifact_path(data),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, StepResult::Error { .. })
    }
}

/// 一轮的产出：推理文本（由编排器追加到 thoughts）与动作结果
#[derive(Debug, Clone, PartialEq)]
pub struct IterationOutcome {
    pub thought: String,
    pub result: StepResult,
}

pub struct ReactLoop {
    planner: Planner,
    executor: Arc<ToolExecutor>,
    pre: PreExecutionHook,
    post: PostExecutionHook,
    approval: Option<Arc<HumanApproval>>,
    event_tx: Option<UnboundedSender<ReactEvent>>,
}

impl ReactLoop {
    pub fn new(
        planner: Planner,
        executor: Arc<ToolExecutor>,
        pre: PreExecutionHook,
        post: PostExecutionHook,
    ) -> Self {
        Self {
            planner,
            executor,
            pre,
            post,
            approval: None,
            event_tx: None,
        }
    }

    /// 工具调用级别的审批门（gated / 敏感域名操作）
    pub fn with_approval(mut self, approval: Arc<HumanApproval>) -> Self {
        self.approval = Some(approval);
        self
    }

    pub fn with_event_tx(mut self, tx: UnboundedSender<ReactEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn planner(&self) -> &Planner {
        &self.planner
    }

    fn emit(&self, ev: ReactEvent) {
        send_event(self.event_tx.as_ref(), ev);
    }

    /// 记录错误 Observation 并返回错误结果（不修改 actions）
    fn fail(
        &self,
        state: &mut SessionState,
        tool: &str,
        message: String,
        severity: Severity,
    ) -> StepResult {
        state.add_observation(format!("Error: {}", message));
        self.emit(ReactEvent::ToolFailure {
            tool: tool.to_string(),
            reason: message.clone(),
            critical: severity == Severity::Critical,
        });
        StepResult::Error {
            tool: tool.to_string(),
            message,
            severity,
        }
    }

    /// 执行一轮；只有推理后端故障与审批记录错误会以 Err 返回
    pub async fn think_and_act(
        &self,
        state: &mut SessionState,
    ) -> Result<IterationOutcome, AgentError> {
        let step = self
            .planner
            .next_step(state, &self.executor.schemas())
            .await?;
        if !step.thought.is_empty() {
            self.emit(ReactEvent::Thought {
                text: preview(&step.thought, THOUGHT_PREVIEW_CHARS),
            });
        }

        let result = match step.call {
            None => StepResult::NoAction,
            Some(call) => self.act(state, call).await?,
        };
        Ok(IterationOutcome {
            thought: step.thought,
            result,
        })
    }

    async fn act(&self, state: &mut SessionState, call: ToolCall) -> Result<StepResult, AgentError> {
        let ToolCall { tool: name, args } = call;
        tracing::info!(tool = %name, args = %args, "tool call");
        self.emit(ReactEvent::ToolCall {
            tool: name.clone(),
            args: args.clone(),
        });

        let Some(tool) = self.executor.get_tool(&name) else {
            tracing::warn!(tool = %name, "unknown tool requested");
            let message = AgentError::UnknownTool(name.clone()).to_string();
            return Ok(self.fail(state, &name, message, Severity::Error));
        };

        if let Err(rejection) = self.pre.validate(tool.as_ref(), &args) {
            self.emit(ReactEvent::GuardrailRejected {
                tool: name.clone(),
                stage: rejection.stage.to_string(),
                message: rejection.message.clone(),
            });
            return Ok(self.fail(state, &name, rejection.message, Severity::Error));
        }

        if let Some(approval) = &self.approval {
            if approval.requires_approval(&name, &args) {
                self.emit(ReactEvent::ApprovalRequested {
                    operation: name.clone(),
                });
                let outcome = approval.request_approval(&name, args.clone()).await?;
                self.emit(ReactEvent::ApprovalDecided {
                    operation: name.clone(),
                    approved: outcome.approved,
                });
                if !outcome.approved {
                    let message = format!("Approval rejected for {}", name);
                    return Ok(self.fail(state, &name, message, Severity::Error));
                }
            }
        }

        let result = self.executor.run(tool.as_ref(), args.clone()).await;
        if !result.success {
            let message = result.error_message().to_string();
            return Ok(self.fail(state, &name, message, result.severity()));
        }

        let result = self.post.process(tool.as_ref(), result);
        Ok(self.record_success(state, tool.as_ref(), args, result.data, result.metadata))
    }

    fn record_success(
        &self,
        state: &mut SessionState,
        tool: &dyn Tool,
        args: Value,
        data: Value,
        metadata: Map<String, Value>,
    ) -> StepResult {
        let kind = tool.kind();
        let interpreter = kind.interpreter();
        let observation = interpreter.observation(&data);

        state.add_action(ActionRecord {
            tool_name: tool.name().to_string(),
            arguments: args,
            result_summary: data.clone(),
        });
        state.add_observation(observation.clone());
        for source in interpreter.sources(&data) {
            state.add_source(source);
        }
        if let Some(info) = interpreter.info(&data) {
            state.add_info(info);
        }

        self.emit(ReactEvent::Observation {
            tool: tool.name().to_string(),
            preview: preview(&observation, OBSERVATION_PREVIEW_CHARS),
        });
        StepResult::Success {
            tool: tool.name().to_string(),
            kind,
            data,
            metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::governance::StaticDecider;
    use crate::guardrails::{DomainValidator, InputValidator, PiiRedactor};
    use crate::llm::{LlmReply, ScriptedLlmClient};
    use crate::tools::{ToolRegistry, ToolResult};
    use async_trait::async_trait;
    use serde_json::json;

    struct Search;

    #[async_trait]
    impl Tool for Search {
        fn name(&self) -> &str {
            "search_web"
        }
        fn description(&self) -> &str {
            "search"
        }
        fn kind(&self) -> ToolKind {
            ToolKind::Search
        }
        async fn execute(&self, _args: Value) -> ToolResult {
            ToolResult::ok(json!({"results": [
                {"title": "A", "url": "https://a.org/1", "snippet": "contact a@b.com"},
                {"title": "B", "url": "https://b.org/2", "snippet": "b"}
            ]}))
        }
    }

    struct Broken(Severity);

    #[async_trait]
    impl Tool for Broken {
        fn name(&self) -> &str {
            "broken"
        }
        fn description(&self) -> &str {
            "always fails"
        }
        async fn execute(&self, _args: Value) -> ToolResult {
            match self.0 {
                Severity::Critical => ToolResult::critical("quota exhausted"),
                Severity::Error => ToolResult::failure("flaky"),
            }
        }
    }

    fn react(llm: ScriptedLlmClient) -> ReactLoop {
        let mut reg = ToolRegistry::new();
        reg.register(Search);
        reg.register(Broken(Severity::Critical));
        ReactLoop::new(
            Planner::new(Arc::new(llm), "sys"),
            Arc::new(ToolExecutor::new(reg, 5)),
            PreExecutionHook::new(InputValidator::new(true), DomainValidator::new(vec![], true)),
            PostExecutionHook::new(PiiRedactor::new(true)),
        )
    }

    #[tokio::test]
    async fn test_successful_search_records_action_and_sources() {
        let r = react(ScriptedLlmClient::new([LlmReply::with_tool_call(
            "search",
            "search_web",
            r#"{"query": "q"}"#,
        )]));
        let mut state = SessionState::new("q");
        let out = r.think_and_act(&mut state).await.unwrap();
        assert_eq!(out.thought, "search");
        assert!(matches!(out.result, StepResult::Success { kind: ToolKind::Search, .. }));
        assert_eq!(state.actions().len(), 1);
        assert_eq!(state.observations(), &["Found 2 search results. Top results: A, B"]);
        assert_eq!(state.sources(), &["https://a.org/1", "https://b.org/2"]);
        // 动作记录保存的是脱敏后的结果
        assert_eq!(
            state.actions()[0].result_summary["results"][0]["snippet"],
            "contact [EMAIL_REDACTED]"
        );
        // thought 由编排器追加
        assert!(state.thoughts().is_empty());
    }

    #[tokio::test]
    async fn test_validation_failure_only_adds_observation() {
        let r = react(ScriptedLlmClient::new([LlmReply::with_tool_call(
            "",
            "search_web",
            r#"{"query": ""}"#,
        )]));
        let mut state = SessionState::new("q");
        let out = r.think_and_act(&mut state).await.unwrap();
        assert!(out.result.is_error());
        assert!(state.actions().is_empty());
        assert_eq!(state.observations(), &["Error: Query cannot be empty"]);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_error_observation() {
        let r = react(ScriptedLlmClient::new([LlmReply::with_tool_call("", "teleport", "{}")]));
        let mut state = SessionState::new("q");
        let out = r.think_and_act(&mut state).await.unwrap();
        assert!(out.result.is_error());
        assert_eq!(state.observations(), &["Error: Unknown tool: teleport"]);
    }

    #[tokio::test]
    async fn test_critical_failure_carries_severity() {
        let r = react(ScriptedLlmClient::new([LlmReply::with_tool_call("", "broken", "{}")]));
        let mut state = SessionState::new("q");
        let out = r.think_and_act(&mut state).await.unwrap();
        assert!(matches!(
            out.result,
            StepResult::Error {
                severity: Severity::Critical,
                ..
            }
        ));
        assert_eq!(state.observations(), &["Error: quota exhausted"]);
    }

    #[tokio::test]
    async fn test_no_tool_call_changes_nothing() {
        let r = react(ScriptedLlmClient::new([LlmReply::text("pondering")]));
        let mut state = SessionState::new("q");
        let out = r.think_and_act(&mut state).await.unwrap();
        assert_eq!(out.result, StepResult::NoAction);
        assert!(state.observations().is_empty());
        assert!(state.sources().is_empty());
    }

    #[tokio::test]
    async fn test_llm_failure_propagates() {
        let r = react(ScriptedLlmClient::default().then_error("connection reset"));
        let mut state = SessionState::new("q");
        assert!(matches!(
            r.think_and_act(&mut state).await,
            Err(AgentError::LlmError(_))
        ));
    }

    #[tokio::test]
    async fn test_rejected_tool_approval() {
        let approval = Arc::new(
            HumanApproval::new(true, Arc::new(StaticDecider::reject_all()))
                .with_gated_operations(vec!["search_web".to_string()]),
        );
        let r = react(ScriptedLlmClient::new([LlmReply::with_tool_call(
            "",
            "search_web",
            r#"{"query": "q"}"#,
        )]))
        .with_approval(approval.clone());
        let mut state = SessionState::new("q");
        let out = r.think_and_act(&mut state).await.unwrap();
        assert!(out.result.is_error());
        assert!(state.actions().is_empty());
        assert_eq!(state.observations(), &["Error: Approval rejected for search_web"]);
        assert_eq!(approval.records().len(), 1);
    }
}
