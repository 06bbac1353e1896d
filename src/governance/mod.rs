//! 治理层：人工审批、策略合规检查、检查点与回滚

pub mod approval;
pub mod checkpoint;
pub mod policy;

pub use approval::{
    ApprovalDecider, ApprovalDecision, ApprovalOutcome, ApprovalRecord, ApprovalStatus,
    ConsoleDecider, HumanApproval, StaticDecider,
};
pub use checkpoint::{Checkpoint, CheckpointInfo, CheckpointStore};
pub use policy::{
    PlanSummary, Policy, PolicyChecker, PolicyReport, PolicyRule, PolicyViolation, ReportSummary,
};
