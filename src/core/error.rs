//! Agent 错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：根据 AgentError / 工具失败决定 Continue / EndLoop / RollbackAndFail / Fail。

use thiserror::Error;

/// 会话运行过程中可能出现的错误（LLM、工具、审批、检查点、策略、配置）
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Approval ID not found: {0}")]
    ApprovalNotFound(String),

    #[error("Approval {id} already {status}")]
    ApprovalAlreadyDecided { id: String, status: String },

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Policy error: {0}")]
    Policy(String),

    #[error("Config error: {0}")]
    ConfigError(String),
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 记录为错误 Observation，继续下一轮（校验失败 / 普通工具失败）
    Continue,
    /// 结束循环但不视为故障（critical 工具失败）
    EndLoop,
    /// 回滚到最近的检查点并以失败结束会话（意外故障）
    RollbackAndFail,
    /// 直接以失败结束（治理拒绝等）
    Fail,
}
