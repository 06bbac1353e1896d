//! 前置护栏链：工具执行前的授权
//!
//! 固定顺序：通用输入校验 -> 域名白名单（仅 url 类工具）-> 工具自身 validate_input -> 自定义检查（注册顺序）。
//! 第一个失败的步骤终止整条链，后续步骤不再执行。

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::guardrails::{DomainValidator, InputValidator};
use crate::tools::Tool;

/// 自定义前置检查：返回 Err(原因) 即拒绝本次调用
pub trait PreExecutionCheck: Send + Sync {
    fn name(&self) -> &str;

    fn check(&self, tool: &dyn Tool, args: &Value) -> Result<(), String>;
}

/// 拒绝发生在哪一步
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardrailStage {
    Input,
    Domain,
    Capability,
    Custom(String),
}

impl fmt::Display for GuardrailStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardrailStage::Input => write!(f, "input validation"),
            GuardrailStage::Domain => write!(f, "domain validation"),
            GuardrailStage::Capability => write!(f, "tool validation"),
            GuardrailStage::Custom(name) => write!(f, "hook '{}'", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuardrailRejection {
    pub stage: GuardrailStage,
    pub message: String,
}

impl fmt::Display for GuardrailRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.stage, self.message)
    }
}

pub struct PreExecutionHook {
    input: InputValidator,
    domain: DomainValidator,
    checks: Vec<Arc<dyn PreExecutionCheck>>,
}

impl PreExecutionHook {
    pub fn new(input: InputValidator, domain: DomainValidator) -> Self {
        Self {
            input,
            domain,
            checks: Vec::new(),
        }
    }

    pub fn with_check(mut self, check: Arc<dyn PreExecutionCheck>) -> Self {
        self.checks.push(check);
        self
    }

    pub fn add_check(&mut self, check: Arc<dyn PreExecutionCheck>) {
        self.checks.push(check);
    }

    pub fn domain_validator(&self) -> &DomainValidator {
        &self.domain
    }

    pub fn validate(&self, tool: &dyn Tool, args: &Value) -> Result<(), GuardrailRejection> {
        let reject = |stage: GuardrailStage, message: String| {
            tracing::warn!(tool = %tool.name(), stage = %stage, error = %message, "pre-execution rejected");
            GuardrailRejection { stage, message }
        };

        self.input
            .validate(tool.kind(), args)
            .map_err(|e| reject(GuardrailStage::Input, e))?;
        tracing::debug!(tool = %tool.name(), "input validation passed");

        if tool.kind().takes_url() {
            if let Some(url) = args.get("url").and_then(Value::as_str) {
                self.domain
                    .is_allowed(url)
                    .map_err(|e| reject(GuardrailStage::Domain, e))?;
            }
        }

        tool.validate_input(args)
            .map_err(|e| reject(GuardrailStage::Capability, e))?;

        for check in &self.checks {
            check
                .check(tool, args)
                .map_err(|e| reject(GuardrailStage::Custom(check.name().to_string()), e))?;
        }
        Ok(())
    }
}
