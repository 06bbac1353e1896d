//! 会话过程事件：迭代、检查点、思考、工具调用、护栏拒绝、审批、策略、停止与回滚
//!
//! 通过可选的 UnboundedSender 推送，CLI 据此打印进度。

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

/// 单步过程事件（可序列化为 JSON）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReactEvent {
    /// 开始第 iteration 轮（从 1 计）
    IterationStarted { iteration: u32, max_iterations: u32 },
    CheckpointCreated { checkpoint_id: String },
    /// LLM 的推理文本
    Thought { text: String },
    ToolCall {
        tool: String,
        args: serde_json::Value,
    },
    /// 前置护栏拒绝
    GuardrailRejected {
        tool: String,
        stage: String,
        message: String,
    },
    /// 工具成功后的 Observation
    Observation { tool: String, preview: String },
    ToolFailure {
        tool: String,
        reason: String,
        critical: bool,
    },
    ApprovalRequested { operation: String },
    ApprovalDecided { operation: String, approved: bool },
    /// phase = plan / report
    PolicyViolations { phase: String, violations: Vec<String> },
    Stopped { reason: String },
    RolledBack { checkpoint_id: String },
    Error { text: String },
}

pub(crate) fn send_event(tx: Option<&UnboundedSender<ReactEvent>>, ev: ReactEvent) {
    if let Some(t) = tx {
        let _ = t.send(ev);
    }
}

/// 截断预览文本（按字符）
pub(crate) fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        format!("{}...", text.chars().take(max_chars).collect::<String>())
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_shape() {
        let ev = ReactEvent::Stopped {
            reason: "max_iterations".to_string(),
        };
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["type"], "stopped");
        assert_eq!(v["reason"], "max_iterations");
    }

    #[test]
    fn test_preview_truncates_by_chars() {
        assert_eq!(preview("abcdef", 3), "abc...");
        assert_eq!(preview("研究报告", 10), "研究报告");
    }
}
