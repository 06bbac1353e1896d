//! Agent 构建器：由 AppConfig 统一装配 LLM、工具、护栏链与治理组件
//!
//! CLI 与测试走同一条装配路径；测试通过 with_llm / with_tool / with_decider 替换外部依赖。

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;

use crate::config::AppConfig;
use crate::core::ResearchAgent;
use crate::governance::{ApprovalDecider, CheckpointStore, ConsoleDecider, HumanApproval, PolicyChecker};
use crate::guardrails::{
    DomainValidator, InputValidator, PiiRedactor, PostExecutionHook, PreExecutionCheck,
    PreExecutionHook, ResultTransform,
};
use crate::llm::{create_llm_from_config, LlmClient};
use crate::react::{Planner, ReactEvent, ReactLoop, DEFAULT_SYSTEM_PROMPT};
use crate::tools::{ReportWriterTool, Tool, ToolExecutor, ToolRegistry, UrlReaderTool, WebSearchTool};

pub struct AgentBuilder {
    config: AppConfig,
    system_prompt: Option<String>,
    llm: Option<Arc<dyn LlmClient>>,
    default_tools: bool,
    extra_tools: Vec<Arc<dyn Tool>>,
    pre_checks: Vec<Arc<dyn PreExecutionCheck>>,
    transforms: Vec<Arc<dyn ResultTransform>>,
    decider: Option<Arc<dyn ApprovalDecider>>,
    event_tx: Option<UnboundedSender<ReactEvent>>,
}

impl AgentBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            system_prompt: None,
            llm: None,
            default_tools: true,
            extra_tools: Vec::new(),
            pre_checks: Vec::new(),
            transforms: Vec::new(),
            decider: None,
            event_tx: None,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// CLI --require-approval
    pub fn with_require_approval(mut self, required: bool) -> Self {
        self.config.governance.require_human_approval = required;
        self
    }

    pub fn with_policy_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.governance.policy_file = path.into();
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.config.agent.max_iterations = max_iterations;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// 是否注册内置 search_web / read_url / write_report
    pub fn with_default_tools(mut self, enabled: bool) -> Self {
        self.default_tools = enabled;
        self
    }

    /// 追加工具；与内置工具同名时替换之
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.extra_tools.push(tool);
        self
    }

    pub fn with_pre_check(mut self, check: Arc<dyn PreExecutionCheck>) -> Self {
        self.pre_checks.push(check);
        self
    }

    pub fn with_post_transform(mut self, transform: Arc<dyn ResultTransform>) -> Self {
        self.transforms.push(transform);
        self
    }

    /// 审批决定来源，默认 ConsoleDecider
    pub fn with_decider(mut self, decider: Arc<dyn ApprovalDecider>) -> Self {
        self.decider = Some(decider);
        self
    }

    pub fn with_event_tx(mut self, tx: UnboundedSender<ReactEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn build_tool_registry(&self) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        if self.default_tools {
            let tools = &self.config.tools;
            let api_key = std::env::var("SERPER_API_KEY").ok().filter(|k| !k.trim().is_empty());
            if api_key.is_none() {
                tracing::warn!("SERPER_API_KEY not set, search_web will fail");
            }
            registry.register(WebSearchTool::new(
                tools.search.api_url.clone(),
                api_key,
                tools.search.timeout_secs,
            ));
            registry.register(UrlReaderTool::new(
                tools.reader.timeout_secs,
                tools.reader.max_content_length,
            ));
            registry.register(ReportWriterTool::new(self.config.app.reports_dir.clone()));
        }
        for tool in &self.extra_tools {
            registry.register_arc(tool.clone());
        }
        registry
    }

    fn resolve_system_prompt(&self) -> String {
        if let Some(p) = &self.system_prompt {
            return p.clone();
        }
        if let Some(path) = &self.config.agent.system_prompt_path {
            match std::fs::read_to_string(path) {
                Ok(prompt) => return prompt,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to read system prompt, using default")
                }
            }
        }
        DEFAULT_SYSTEM_PROMPT.to_string()
    }

    pub fn build(self) -> ResearchAgent {
        let llm = self
            .llm
            .clone()
            .unwrap_or_else(|| create_llm_from_config(&self.config.llm));
        let executor = Arc::new(ToolExecutor::new(
            self.build_tool_registry(),
            self.config.tools.tool_timeout_secs,
        ));
        let planner = Planner::new(llm, self.resolve_system_prompt());

        let guard = &self.config.guardrails;
        let mut pre = PreExecutionHook::new(
            InputValidator::new(guard.enable_input_validation),
            DomainValidator::new(guard.allowed_domains.clone(), guard.enable_domain_whitelist),
        );
        for check in &self.pre_checks {
            pre.add_check(check.clone());
        }
        let mut post = PostExecutionHook::new(PiiRedactor::new(guard.enable_pii_redaction));
        for transform in &self.transforms {
            post.add_transform(transform.clone());
        }

        let gov = &self.config.governance;
        let decider = self
            .decider
            .clone()
            .unwrap_or_else(|| Arc::new(ConsoleDecider));
        let approval = Arc::new(
            HumanApproval::new(gov.require_human_approval, decider)
                .with_gated_operations(gov.gated_operations.clone())
                .with_url_operations(gov.url_operations.clone())
                .with_sensitive_domains(gov.sensitive_domains.clone()),
        );

        let mut react = ReactLoop::new(planner, executor.clone(), pre, post).with_approval(approval.clone());
        if let Some(tx) = &self.event_tx {
            react = react.with_event_tx(tx.clone());
        }

        tracing::info!(
            tools = ?executor.tool_names(),
            max_iterations = self.config.agent.max_iterations,
            approval = gov.require_human_approval,
            rollback = gov.enable_rollback,
            "agent assembled"
        );

        ResearchAgent::new(
            react,
            executor,
            approval,
            PolicyChecker::load(gov.policy_file.clone()),
            CheckpointStore::new(self.config.app.state_dir.clone(), gov.enable_rollback),
            self.config.agent.max_iterations,
            self.event_tx,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_has_research_tools() {
        let builder = AgentBuilder::new(AppConfig::default());
        let mut names = builder.build_tool_registry().tool_names();
        names.sort();
        assert_eq!(names, vec!["read_url", "search_web", "write_report"]);
    }

    #[test]
    fn test_overrides_apply_to_config() {
        let builder = AgentBuilder::new(AppConfig::default())
            .with_require_approval(true)
            .with_max_iterations(3)
            .with_policy_file("p.toml");
        assert!(builder.config().governance.require_human_approval);
        assert_eq!(builder.config().agent.max_iterations, 3);
        assert_eq!(builder.config().governance.policy_file, PathBuf::from("p.toml"));
    }

    #[test]
    fn test_without_default_tools() {
        let builder = AgentBuilder::new(AppConfig::default()).with_default_tools(false);
        assert!(builder.build_tool_registry().tool_names().is_empty());
    }
}
