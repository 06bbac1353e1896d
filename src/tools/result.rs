//! 工具执行结果：success + data | error + metadata（side channel）

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 工具错误的严重级别；Critical 会在本轮结束后终止循环
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Error,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolError {
    pub message: String,
    #[serde(default)]
    pub severity: Severity,
}

/// 工具结果。metadata 不属于主负载（例如 redaction_info、policy_violations）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub error: Option<ToolError>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl ToolResult {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data,
            error: None,
            metadata: Map::new(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self::failed(message, Severity::Error)
    }

    /// 致命失败：本轮结束后编排器停止循环
    pub fn critical(message: impl Into<String>) -> Self {
        Self::failed(message, Severity::Critical)
    }

    fn failed(message: impl Into<String>, severity: Severity) -> Self {
        Self {
            success: false,
            data: Value::Null,
            error: Some(ToolError {
                message: message.into(),
                severity,
            }),
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn error_message(&self) -> &str {
        self.error
            .as_ref()
            .map(|e| e.message.as_str())
            .unwrap_or("unknown error")
    }

    pub fn severity(&self) -> Severity {
        self.error.as_ref().map(|e| e.severity).unwrap_or_default()
    }
}
