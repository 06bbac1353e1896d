//! 会话编排器：驱动迭代、接入治理、合成并写出最终报告
//!
//! 每轮之前保存检查点；每轮之后先递增迭代计数、追加 thought，再按优先级判断停止：
//! 达到上限 -> 已写出报告 -> 信息充足且最近 thought 提到 write + report -> critical 工具失败 -> 已取消。
//! 循环结束后，若已有来源与信息片段：计划合规检查（只记录）-> 报告审批 -> 合成报告并写出 -> 报告合规检查（违规作为元数据）。
//! 循环中的意外故障：回滚到最近检查点并返回失败；回滚本身失败只记录日志，不改变失败结果。

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc::UnboundedSender;

use crate::core::{AgentError, RecoveryAction, RecoveryEngine, SessionState, SessionSupervisor};
use crate::governance::{
    CheckpointInfo, CheckpointStore, HumanApproval, PlanSummary, PolicyChecker, PolicyViolation,
    ReportSummary,
};
use crate::react::events::send_event;
use crate::react::{IterationOutcome, ReactEvent, ReactLoop, StepResult};
use crate::tools::{ToolExecutor, ToolKind};

/// 早停启发式：来源数与信息片段数下限
const ENOUGH_SOURCES: usize = 5;
const ENOUGH_INFO: usize = 3;
/// 合成报告时每个片段保留的字符数
const FRAGMENT_CHARS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    MaxIterations,
    ReportWritten,
    EnoughInformation,
    CriticalError,
    Cancelled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::MaxIterations => "max_iterations",
            StopReason::ReportWritten => "report_written",
            StopReason::EnoughInformation => "enough_information",
            StopReason::CriticalError => "critical_error",
            StopReason::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// 一次研究会话的结果；失败时同样携带（可能已回滚的）会话状态
#[derive(Debug, Clone, Serialize)]
pub struct ResearchResult {
    pub success: bool,
    pub error: Option<String>,
    pub final_answer: Option<String>,
    pub state: SessionState,
    pub stop_reason: Option<StopReason>,
    pub report_path: Option<String>,
    pub plan_violations: Vec<PolicyViolation>,
    pub report_violations: Vec<PolicyViolation>,
    /// 故障后回滚到的检查点
    pub rolled_back_to: Option<String>,
}

impl ResearchResult {
    fn failure(error: impl Into<String>, state: SessionState) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            final_answer: state.final_answer().map(str::to_string),
            state,
            stop_reason: None,
            report_path: None,
            plan_violations: Vec::new(),
            report_violations: Vec::new(),
            rolled_back_to: None,
        }
    }
}

/// 报告阶段的中间结果
#[derive(Default)]
struct ReportPhase {
    plan_violations: Vec<PolicyViolation>,
    report_violations: Vec<PolicyViolation>,
    report_path: Option<String>,
    rejected: bool,
}

/// 按优先级判断本轮之后是否停止（迭代计数与 thought 已更新）；
/// step_action 是恢复引擎对本轮工具失败给出的动作，无失败时为 Continue
pub fn stop_reason(
    state: &SessionState,
    outcome: &IterationOutcome,
    step_action: &RecoveryAction,
    max_iterations: u32,
) -> Option<StopReason> {
    if state.iteration() >= max_iterations {
        return Some(StopReason::MaxIterations);
    }
    if outcome.result.artifact_path().is_some() {
        return Some(StopReason::ReportWritten);
    }
    if state.sources().len() >= ENOUGH_SOURCES && state.collected_info().len() >= ENOUGH_INFO {
        let thought = state.latest_thought().unwrap_or("").to_lowercase();
        if thought.contains("write") && thought.contains("report") {
            return Some(StopReason::EnoughInformation);
        }
    }
    if *step_action == RecoveryAction::EndLoop {
        return Some(StopReason::CriticalError);
    }
    None
}

/// 由已收集信息与来源合成 Markdown 报告正文
pub fn synthesize_report(query: &str, state: &SessionState) -> String {
    let mut parts = vec![
        format!("# Research Report: {}", query),
        String::new(),
        "## Summary".to_string(),
        String::new(),
    ];
    for (i, info) in state.collected_info().iter().enumerate() {
        parts.push(format!("### Source {}", i + 1));
        parts.push(info.content.chars().take(FRAGMENT_CHARS).collect());
        parts.push(String::new());
    }
    parts.push("## Sources".to_string());
    parts.push(String::new());
    for (i, source) in state.sources().iter().enumerate() {
        parts.push(format!("{}. {}", i + 1, source));
    }
    parts.join("\n")
}

pub struct ResearchAgent {
    react: ReactLoop,
    executor: Arc<ToolExecutor>,
    approval: Arc<HumanApproval>,
    policy: PolicyChecker,
    checkpoints: CheckpointStore,
    recovery: RecoveryEngine,
    supervisor: SessionSupervisor,
    max_iterations: u32,
    event_tx: Option<UnboundedSender<ReactEvent>>,
}

impl ResearchAgent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        react: ReactLoop,
        executor: Arc<ToolExecutor>,
        approval: Arc<HumanApproval>,
        policy: PolicyChecker,
        checkpoints: CheckpointStore,
        max_iterations: u32,
        event_tx: Option<UnboundedSender<ReactEvent>>,
    ) -> Self {
        Self {
            react,
            executor,
            approval,
            policy,
            checkpoints,
            recovery: RecoveryEngine::new(),
            supervisor: SessionSupervisor::new(),
            max_iterations,
            event_tx,
        }
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    pub fn supervisor(&self) -> &SessionSupervisor {
        &self.supervisor
    }

    pub fn approval(&self) -> &HumanApproval {
        &self.approval
    }

    pub fn policy_checker(&self) -> &PolicyChecker {
        &self.policy
    }

    pub fn policy_checker_mut(&mut self) -> &mut PolicyChecker {
        &mut self.policy
    }

    pub fn checkpoint_store(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    fn emit(&self, ev: ReactEvent) {
        send_event(self.event_tx.as_ref(), ev);
    }

    /// 保存检查点；写入失败只记录日志，会话继续，回滚目标仍是上一个成功的检查点
    fn checkpoint(&self, state: &SessionState, last: &mut Option<String>) {
        match self.checkpoints.create_checkpoint(state) {
            Ok(Some(id)) => {
                self.emit(ReactEvent::CheckpointCreated {
                    checkpoint_id: id.clone(),
                });
                *last = Some(id);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(iteration = state.iteration(), error = %e, "continuing without checkpoint");
            }
        }
    }

    /// 本会话累计的 token 用量：(prompt, completion, total)
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.react.planner().token_usage()
    }

    pub async fn research(&self, query: &str) -> ResearchResult {
        tracing::info!(query = %query, max_iterations = self.max_iterations, "starting research");
        let mut state = SessionState::new(query);
        let mut last_checkpoint: Option<String> = None;

        let looped = self.run_loop(&mut state, &mut last_checkpoint).await;
        let stop = match looped {
            Ok(stop) => stop,
            Err(e) => return self.handle_fault(e, state, last_checkpoint),
        };

        let finished = self.finish(&mut state).await;
        let phase = match finished {
            Ok(phase) => phase,
            Err(e) => return self.handle_fault(e, state, last_checkpoint),
        };
        if phase.rejected {
            tracing::warn!("report writing was not approved");
            let mut result = ResearchResult::failure("Report writing was not approved", state);
            result.stop_reason = stop;
            result.plan_violations = phase.plan_violations;
            return result;
        }

        let (prompt_tokens, completion_tokens, total_tokens) = self.token_usage();
        tracing::info!(
            iterations = state.iteration(),
            sources = state.sources().len(),
            prompt_tokens,
            completion_tokens,
            total_tokens,
            "research completed"
        );
        ResearchResult {
            success: true,
            error: None,
            final_answer: state.final_answer().map(str::to_string),
            state,
            stop_reason: stop,
            report_path: phase.report_path,
            plan_violations: phase.plan_violations,
            report_violations: phase.report_violations,
            rolled_back_to: None,
        }
    }

    async fn run_loop(
        &self,
        state: &mut SessionState,
        last_checkpoint: &mut Option<String>,
    ) -> Result<Option<StopReason>, AgentError> {
        self.checkpoint(state, last_checkpoint);

        while state.iteration() < self.max_iterations {
            if self.supervisor.is_cancelled() {
                return Ok(Some(self.stopped(StopReason::Cancelled)));
            }

            self.emit(ReactEvent::IterationStarted {
                iteration: state.iteration() + 1,
                max_iterations: self.max_iterations,
            });
            tracing::info!(iteration = state.iteration() + 1, max = self.max_iterations, "iteration");
            self.checkpoint(state, last_checkpoint);

            let outcome = self.react.think_and_act(state).await?;
            state.increment_iteration();
            state.add_thought(outcome.thought.clone());

            let step_action = match &outcome.result {
                StepResult::Error { message, severity, .. } => {
                    let action = self.recovery.on_step_error(*severity);
                    tracing::warn!(iteration = state.iteration(), error = %message, action = ?action, "iteration ended with error");
                    action
                }
                _ => RecoveryAction::Continue,
            };
            if let Some(reason) = stop_reason(state, &outcome, &step_action, self.max_iterations) {
                return Ok(Some(self.stopped(reason)));
            }
        }
        Ok(Some(self.stopped(StopReason::MaxIterations)))
    }

    fn stopped(&self, reason: StopReason) -> StopReason {
        tracing::info!(reason = %reason, "agent stopped");
        self.emit(ReactEvent::Stopped {
            reason: reason.to_string(),
        });
        reason
    }

    async fn finish(&self, state: &mut SessionState) -> Result<ReportPhase, AgentError> {
        let mut phase = ReportPhase::default();
        if state.sources().is_empty() || state.collected_info().is_empty() {
            tracing::info!("not enough material for a report");
            return Ok(phase);
        }

        let plan = PlanSummary {
            sources: state.sources().to_vec(),
            total_content_length: state.collected_info().iter().map(|i| i.content.chars().count()).sum(),
        };
        let plan_report = self.policy.check_plan(&plan);
        if !plan_report.is_compliant() {
            self.emit(ReactEvent::PolicyViolations {
                phase: "plan".to_string(),
                violations: plan_report.messages(),
            });
        }
        phase.plan_violations = plan_report.violations;

        let Some(report_tool) = self.executor.find_by_kind(ToolKind::Report) else {
            tracing::error!("report writer tool not available");
            return Ok(phase);
        };
        let operation = report_tool.name().to_string();
        let title = format!("Research Report: {}", state.query());

        let context = json!({
            "title": title,
            "sources": state.sources(),
            "num_sources": state.sources().len(),
        });
        if self.approval.requires_approval(&operation, &context) {
            self.emit(ReactEvent::ApprovalRequested {
                operation: operation.clone(),
            });
            let outcome = self.approval.request_approval(&operation, context).await?;
            self.emit(ReactEvent::ApprovalDecided {
                operation: operation.clone(),
                approved: outcome.approved,
            });
            if !outcome.approved {
                phase.rejected = true;
                return Ok(phase);
            }
        }

        let content = synthesize_report(state.query(), state);
        let args = json!({
            "title": title,
            "content": content,
            "sources": state.sources(),
            "format": "markdown",
        });
        let result = self.executor.run(report_tool.as_ref(), args).await;
        if !result.success {
            tracing::error!(error = %result.error_message(), "failed to write report");
            self.emit(ReactEvent::ToolFailure {
                tool: operation,
                reason: result.error_message().to_string(),
                critical: false,
            });
            return Ok(phase);
        }

        let path = report_tool.kind().interpreter().artifact_path(&result.data);
        if let Some(p) = &path {
            state.set_final_answer(format!("Report written to {}", p));
        }
        phase.report_path = path;

        let report_check = self.policy.check_report(&ReportSummary {
            sources: state.sources().to_vec(),
            content,
        });
        if !report_check.is_compliant() {
            self.emit(ReactEvent::PolicyViolations {
                phase: "report".to_string(),
                violations: report_check.messages(),
            });
        }
        phase.report_violations = report_check.violations;
        Ok(phase)
    }

    fn handle_fault(
        &self,
        err: AgentError,
        state: SessionState,
        last_checkpoint: Option<String>,
    ) -> ResearchResult {
        tracing::error!(error = %err, "error during research");
        self.emit(ReactEvent::Error {
            text: err.to_string(),
        });
        match self.recovery.handle(&err) {
            RecoveryAction::RollbackAndFail => {}
            _ => return ResearchResult::failure(err.to_string(), state),
        }

        let Some(id) = last_checkpoint else {
            return ResearchResult::failure(err.to_string(), state);
        };
        tracing::info!(checkpoint_id = %id, "attempting rollback");
        match self.checkpoints.rollback(&id) {
            Ok(Some(restored)) => {
                self.emit(ReactEvent::RolledBack {
                    checkpoint_id: id.clone(),
                });
                let mut result = ResearchResult::failure(err.to_string(), restored);
                result.rolled_back_to = Some(id);
                result
            }
            Ok(None) => {
                tracing::error!(checkpoint_id = %id, "rollback failed: checkpoint missing");
                ResearchResult::failure(err.to_string(), state)
            }
            Err(rollback_err) => {
                tracing::error!(checkpoint_id = %id, error = %rollback_err, "rollback failed");
                ResearchResult::failure(err.to_string(), state)
            }
        }
    }

    /// 读取检查点状态；调用方自行决定如何使用返回的状态
    pub fn rollback(&self, checkpoint_id: &str) -> Result<Option<SessionState>, AgentError> {
        let state = self.checkpoints.rollback(checkpoint_id)?;
        if state.is_some() {
            self.emit(ReactEvent::RolledBack {
                checkpoint_id: checkpoint_id.to_string(),
            });
        }
        Ok(state)
    }

    pub fn list_checkpoints(&self) -> Result<Vec<CheckpointInfo>, AgentError> {
        self.checkpoints.list_checkpoints()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::InfoFragment;
    use crate::tools::Severity;
    use serde_json::Map;

    fn rich_state(thought: &str) -> SessionState {
        let mut s = SessionState::new("q");
        for i in 0..5 {
            s.add_source(format!("https://s{}.org", i));
        }
        for i in 0..3 {
            s.add_info(InfoFragment {
                source: None,
                title: None,
                content: format!("fragment {}", i),
            });
        }
        s.increment_iteration();
        s.add_thought(thought);
        s
    }

    fn outcome(result: StepResult) -> IterationOutcome {
        IterationOutcome {
            thought: String::new(),
            result,
        }
    }

    const GO_ON: RecoveryAction = RecoveryAction::Continue;

    #[test]
    fn test_stop_priority_max_iterations_first() {
        let s = rich_state("Time to write the report");
        let o = outcome(StepResult::Error {
            tool: "x".to_string(),
            message: "boom".to_string(),
            severity: Severity::Critical,
        });
        let end = RecoveryAction::EndLoop;
        assert_eq!(stop_reason(&s, &o, &end, 1), Some(StopReason::MaxIterations));
        assert_eq!(stop_reason(&s, &o, &end, 10), Some(StopReason::EnoughInformation));
    }

    #[test]
    fn test_stop_on_report_written() {
        let s = SessionState::new("q");
        let o = outcome(StepResult::Success {
            tool: "write_report".to_string(),
            kind: ToolKind::Report,
            data: json!({"filepath": "r.md"}),
            metadata: Map::new(),
        });
        assert_eq!(stop_reason(&s, &o, &GO_ON, 10), Some(StopReason::ReportWritten));
    }

    #[test]
    fn test_heuristic_needs_write_and_report() {
        let s = rich_state("let me read one more article");
        assert_eq!(stop_reason(&s, &outcome(StepResult::NoAction), &GO_ON, 10), None);
        let s = rich_state("I should WRITE the final REPORT");
        assert_eq!(
            stop_reason(&s, &outcome(StepResult::NoAction), &GO_ON, 10),
            Some(StopReason::EnoughInformation)
        );
    }

    #[test]
    fn test_critical_stops_but_plain_error_does_not() {
        let engine = RecoveryEngine::new();
        let s = SessionState::new("q");
        let plain = outcome(StepResult::Error {
            tool: "x".to_string(),
            message: "Critical-sounding text".to_string(),
            severity: Severity::Error,
        });
        let action = engine.on_step_error(Severity::Error);
        assert_eq!(stop_reason(&s, &plain, &action, 10), None);
        let critical = outcome(StepResult::Error {
            tool: "x".to_string(),
            message: "quota".to_string(),
            severity: Severity::Critical,
        });
        let action = engine.on_step_error(Severity::Critical);
        assert_eq!(stop_reason(&s, &critical, &action, 10), Some(StopReason::CriticalError));
    }

    #[test]
    fn test_loop_end_follows_recovery_action() {
        let s = SessionState::new("q");
        let o = outcome(StepResult::NoAction);
        assert_eq!(
            stop_reason(&s, &o, &RecoveryAction::EndLoop, 10),
            Some(StopReason::CriticalError)
        );
        assert_eq!(stop_reason(&s, &o, &RecoveryAction::Continue, 10), None);
    }

    #[test]
    fn test_synthesize_report_layout() {
        let mut s = SessionState::new("deep sea mining");
        s.add_info(InfoFragment {
            source: Some("https://a.org".to_string()),
            title: None,
            content: "x".repeat(1500),
        });
        s.add_source("https://a.org");
        let report = synthesize_report(s.query(), &s);
        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(lines[0], "# Research Report: deep sea mining");
        assert_eq!(lines[2], "## Summary");
        assert_eq!(lines[4], "### Source 1");
        assert_eq!(lines[5].len(), 1000);
        assert!(lines.contains(&"## Sources"));
        assert_eq!(*lines.last().unwrap(), "1. https://a.org");
    }
}
