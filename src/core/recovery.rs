//! 错误恢复引擎
//!
//! 根据 AgentError 或工具失败的严重级别返回 RecoveryAction，供编排器决定是继续、结束循环、回滚还是直接失败。
//! 本层不做任何自动重试；重试策略属于具体工具实现。

use crate::core::{AgentError, RecoveryAction};
use crate::tools::Severity;

/// 语义化错误恢复：将错误映射为可执行动作
#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    /// 循环中抛出的错误：审批记账错误直接失败，其余一律视为意外故障，需要回滚
    pub fn handle(&self, err: &AgentError) -> RecoveryAction {
        match err {
            AgentError::ApprovalAlreadyDecided { .. } | AgentError::ApprovalNotFound(_) => {
                RecoveryAction::Fail
            }
            _ => RecoveryAction::RollbackAndFail,
        }
    }

    /// 单轮内的工具失败 / 护栏拒绝：只看结构化严重级别，不看消息文本
    pub fn on_step_error(&self, severity: Severity) -> RecoveryAction {
        match severity {
            Severity::Critical => RecoveryAction::EndLoop,
            Severity::Error => RecoveryAction::Continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recovery_llm_error_rolls_back() {
        let engine = RecoveryEngine::new();
        let err = AgentError::LlmError("connection reset".to_string());
        assert_eq!(engine.handle(&err), RecoveryAction::RollbackAndFail);
    }

    #[test]
    fn test_recovery_checkpoint_error_rolls_back() {
        let engine = RecoveryEngine::new();
        let err = AgentError::Checkpoint("disk full".to_string());
        assert_eq!(engine.handle(&err), RecoveryAction::RollbackAndFail);
    }

    #[test]
    fn test_recovery_approval_bookkeeping_fails() {
        let engine = RecoveryEngine::new();
        let err = AgentError::ApprovalNotFound("abc".to_string());
        assert_eq!(engine.handle(&err), RecoveryAction::Fail);
    }

    #[test]
    fn test_recovery_step_severity() {
        let engine = RecoveryEngine::new();
        assert_eq!(engine.on_step_error(Severity::Error), RecoveryAction::Continue);
        assert_eq!(engine.on_step_error(Severity::Critical), RecoveryAction::EndLoop);
    }
}
