//! Quill - 受治理的 ReAct 研究智能体
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 会话状态、错误与恢复、会话监管、构建器、研究会话编排
//! - **governance**: 人工审批、策略合规、检查点与回滚
//! - **guardrails**: 前置 / 后置护栏链（输入校验、域名白名单、PII 脱敏、自定义钩子）
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock / 脚本回放）
//! - **observability**: tracing 初始化
//! - **react**: Planner、ReAct 单轮、过程事件
//! - **tools**: 工具接口、注册表、执行器与内置研究工具

pub mod config;
pub mod core;
pub mod governance;
pub mod guardrails;
pub mod llm;
pub mod observability;
pub mod react;
pub mod tools;

pub use crate::core::{AgentBuilder, ResearchAgent, ResearchResult, SessionState, StopReason};
