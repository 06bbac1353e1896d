//! 后置护栏链：工具成功返回后的结果变换
//!
//! PII 脱敏 -> 自定义变换（注册顺序）。只变换负载，从不让调用失败。

use std::sync::Arc;

use crate::guardrails::PiiRedactor;
use crate::tools::{Tool, ToolResult};

/// 自定义结果变换
pub trait ResultTransform: Send + Sync {
    fn name(&self) -> &str;

    fn transform(&self, tool: &dyn Tool, result: ToolResult) -> ToolResult;
}

pub struct PostExecutionHook {
    pii: PiiRedactor,
    transforms: Vec<Arc<dyn ResultTransform>>,
}

impl PostExecutionHook {
    pub fn new(pii: PiiRedactor) -> Self {
        Self {
            pii,
            transforms: Vec::new(),
        }
    }

    pub fn with_transform(mut self, transform: Arc<dyn ResultTransform>) -> Self {
        self.transforms.push(transform);
        self
    }

    pub fn add_transform(&mut self, transform: Arc<dyn ResultTransform>) {
        self.transforms.push(transform);
    }

    pub fn process(&self, tool: &dyn Tool, mut result: ToolResult) -> ToolResult {
        if !result.success {
            return result;
        }
        self.pii.redact_result(tool.kind(), &mut result);
        for t in &self.transforms {
            tracing::debug!(tool = %tool.name(), transform = %t.name(), "post-execution transform");
            result = t.transform(tool, result);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolKind;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct Page;

    #[async_trait]
    impl Tool for Page {
        fn name(&self) -> &str {
            "read_url"
        }
        fn description(&self) -> &str {
            "page"
        }
        fn kind(&self) -> ToolKind {
            ToolKind::Fetch
        }
        async fn execute(&self, args: Value) -> ToolResult {
            ToolResult::ok(args)
        }
    }

    struct Tag(&'static str);

    impl ResultTransform for Tag {
        fn name(&self) -> &str {
            self.0
        }
        fn transform(&self, _tool: &dyn Tool, result: ToolResult) -> ToolResult {
            let seen = result.metadata.get("tags").and_then(Value::as_str).unwrap_or("").to_string();
            result.with_metadata("tags", Value::String(format!("{}{}", seen, self.0)))
        }
    }

    #[test]
    fn test_redaction_then_transforms_in_order() {
        let hook = PostExecutionHook::new(PiiRedactor::new(true))
            .with_transform(Arc::new(Tag("a")))
            .with_transform(Arc::new(Tag("b")));
        let out = hook.process(&Page, ToolResult::ok(json!({"content": "mail a@b.com"})));
        assert_eq!(out.data["content"], "mail [EMAIL_REDACTED]");
        assert_eq!(out.metadata["tags"], "ab");
        assert!(out.metadata.contains_key("redaction_info"));
    }

    #[test]
    fn test_failed_result_untouched() {
        let hook = PostExecutionHook::new(PiiRedactor::new(true)).with_transform(Arc::new(Tag("a")));
        let out = hook.process(&Page, ToolResult::failure("boom"));
        assert!(!out.success);
        assert!(out.metadata.is_empty());
    }
}
