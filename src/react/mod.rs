//! 认知层：Planner、ReAct 单轮执行、过程事件

pub mod events;
pub mod loop_;
pub mod planner;

pub use events::ReactEvent;
pub use loop_::{IterationOutcome, ReactLoop, StepResult};
pub use planner::{parse_arguments, parse_llm_output, PlannedStep, Planner, ToolCall, DEFAULT_SYSTEM_PROMPT};
