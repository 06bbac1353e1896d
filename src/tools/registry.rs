//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / kind / schema / validate_input / execute），由 ToolRegistry 按名注册与查找，
//! ToolExecutor 在调用时加超时并输出审计日志。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::tools::{ToolKind, ToolResult};

/// 能力声明：名称、描述与参数 JSON Schema，用于向推理后端公布可用工具
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// 工具 trait：名称、描述（供 LLM 理解）、结果解释策略标签、参数 schema、自校验、异步执行（args 为 JSON）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（推理后端调用时使用）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 结果解释策略标签；决定 Observation 格式、来源与信息提取
    fn kind(&self) -> ToolKind {
        ToolKind::Generic
    }

    /// 参数 JSON Schema
    /// 默认返回空对象，表示无参数或参数格式不限
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// 工具自身的参数校验，在通用输入校验与域名校验之后执行
    fn validate_input(&self, _args: &Value) -> Result<(), String> {
        Ok(())
    }

    /// 执行工具；失败通过 ToolResult::failure / ToolResult::critical 表达
    async fn execute(&self, args: Value) -> ToolResult;

    fn describe(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// 工具注册表：按名称存储 Arc<dyn Tool>，支持 register / get / tool_names / schemas
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// 第一个声明为指定 kind 的工具（编排器按 kind 查找报告工具）
    pub fn find_by_kind(&self, kind: ToolKind) -> Option<Arc<dyn Tool>> {
        let mut names: Vec<&String> = self.tools.keys().collect();
        names.sort();
        names
            .into_iter()
            .filter_map(|n| self.tools.get(n))
            .find(|t| t.kind() == kind)
            .cloned()
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// 按名称排序的能力声明列表，保证每轮发送给 LLM 的顺序稳定
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self.tools.values().map(|t| t.describe()).collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dummy(&'static str, ToolKind);

    #[async_trait]
    impl Tool for Dummy {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            "dummy"
        }
        fn kind(&self) -> ToolKind {
            self.1
        }
        async fn execute(&self, _args: Value) -> ToolResult {
            ToolResult::ok(Value::Null)
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut reg = ToolRegistry::new();
        reg.register(Dummy("b", ToolKind::Generic));
        reg.register(Dummy("a", ToolKind::Report));
        assert!(reg.get("a").is_some());
        assert!(reg.get("missing").is_none());
        assert_eq!(reg.tool_names(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(reg.find_by_kind(ToolKind::Report).unwrap().name(), "a");
        assert!(reg.find_by_kind(ToolKind::Fetch).is_none());
    }

    #[test]
    fn test_schemas_sorted_by_name() {
        let mut reg = ToolRegistry::new();
        reg.register(Dummy("zeta", ToolKind::Generic));
        reg.register(Dummy("alpha", ToolKind::Generic));
        let names: Vec<String> = reg.schemas().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
