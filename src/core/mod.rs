//! 核心编排层：错误与恢复、会话状态、会话监管、构建器、研究会话编排

pub mod builder;
pub mod error;
pub mod orchestrator;
pub mod recovery;
pub mod session_supervisor;
pub mod state;

pub use builder::AgentBuilder;
pub use error::{AgentError, RecoveryAction};
pub use orchestrator::{stop_reason, synthesize_report, ResearchAgent, ResearchResult, StopReason};
pub use recovery::RecoveryEngine;
pub use session_supervisor::SessionSupervisor;
pub use state::{ActionRecord, HistoryEntry, HistoryItem, InfoFragment, SessionState};
