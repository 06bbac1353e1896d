//! 工具执行器
//!
//! 持有 ToolRegistry 与全局超时；工具名由 ReAct 循环先解析（未注册的工具记为错误 Observation），
//! run(tool, args) 在超时内调用工具，超时转为普通失败结果；每次调用输出结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::tools::{Tool, ToolKind, ToolRegistry, ToolResult, ToolSchema};

/// 工具执行器：对每次调用施加超时
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// 对已解析的工具执行一次调用（ReAct 循环先做护栏校验再调用）；超时返回失败结果（Severity::Error）
    pub async fn run(&self, tool: &dyn Tool, args: serde_json::Value) -> ToolResult {
        let start = Instant::now();
        let args_preview = args_preview(&args);
        let result = timeout(self.timeout, tool.execute(args)).await;

        let outcome = match &result {
            Ok(r) if r.success => "ok",
            Ok(_) => "error",
            Err(_) => "timeout",
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool.name(),
            "ok": outcome == "ok",
            "outcome": outcome,
            "duration_ms": duration_ms,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(r) => r,
            Err(_) => ToolResult::failure(format!(
                "Tool timeout: {} exceeded {}s",
                tool.name(),
                self.timeout.as_secs()
            )),
        }
    }

    pub fn get_tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.registry.get(name)
    }

    pub fn find_by_kind(&self, kind: ToolKind) -> Option<Arc<dyn Tool>> {
        self.registry.find_by_kind(kind)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.registry.schemas()
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
