//! 报告写入工具：将研究报告写入 reports 目录（Markdown / JSON）
//!
//! 文件名：<安全标题>_<时间戳>.<md|json>；安全标题只保留字母数字、空格、-、_，空格换成 _，最长 50 字符。

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Local;
use serde_json::{json, Value};

use crate::tools::schema::{args_schema, ReportFormat, WriteReportArgs};
use crate::tools::{Tool, ToolKind, ToolResult};

pub struct ReportWriterTool {
    reports_dir: PathBuf,
}

impl ReportWriterTool {
    pub fn new(reports_dir: impl Into<PathBuf>) -> Self {
        Self {
            reports_dir: reports_dir.into(),
        }
    }

    fn safe_title(title: &str) -> String {
        title
            .chars()
            .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
            .map(|c| if c == ' ' { '_' } else { c })
            .take(50)
            .collect()
    }

    fn format_markdown(title: &str, content: &str, sources: &[String]) -> String {
        let mut lines = vec![
            format!("# {}", title),
            String::new(),
            format!("**Generated:** {}", Local::now().format("%Y-%m-%d %H:%M:%S")),
            String::new(),
            "---".to_string(),
            String::new(),
            content.to_string(),
            String::new(),
            "---".to_string(),
            String::new(),
            "## Sources".to_string(),
            String::new(),
        ];
        lines.extend(
            sources
                .iter()
                .enumerate()
                .map(|(i, s)| format!("{}. {}", i + 1, s)),
        );
        lines.join("\n")
    }

    fn check_args(args: &WriteReportArgs) -> Result<(), String> {
        if args.title.trim().is_empty() {
            return Err("Title must be a non-empty string".to_string());
        }
        if args.content.trim().is_empty() {
            return Err("Content must be a non-empty string".to_string());
        }
        Ok(())
    }

    fn write(&self, args: &WriteReportArgs) -> anyhow::Result<Value> {
        std::fs::create_dir_all(&self.reports_dir)?;
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let filename = format!(
            "{}_{}.{}",
            Self::safe_title(&args.title),
            timestamp,
            args.format.extension()
        );
        let filepath = self.reports_dir.join(&filename);
        let text = match args.format {
            ReportFormat::Markdown => Self::format_markdown(&args.title, &args.content, &args.sources),
            ReportFormat::Json => serde_json::to_string_pretty(&json!({
                "title": args.title,
                "content": args.content,
                "sources": args.sources,
                "created_at": Local::now().to_rfc3339(),
            }))?,
        };
        std::fs::write(&filepath, &text)?;
        tracing::info!(path = %filepath.display(), "report written");
        Ok(json!({
            "filepath": filepath.to_string_lossy(),
            "filename": filename,
            "format": args.format.as_str(),
            "size": text.len(),
        }))
    }
}

#[async_trait]
impl Tool for ReportWriterTool {
    fn name(&self) -> &str {
        "write_report"
    }

    fn description(&self) -> &str {
        "Write a research report to a file. The report should include title, content, and sources."
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Report
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<WriteReportArgs>()
    }

    fn validate_input(&self, args: &Value) -> Result<(), String> {
        let parsed: WriteReportArgs = serde_json::from_value(args.clone())
            .map_err(|e| format!("Invalid report arguments: {}", e))?;
        Self::check_args(&parsed)
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let parsed: WriteReportArgs = match serde_json::from_value(args) {
            Ok(a) => a,
            Err(e) => return ToolResult::failure(format!("Invalid report arguments: {}", e)),
        };
        if let Err(e) = Self::check_args(&parsed) {
            return ToolResult::failure(e);
        }
        tracing::info!(title = %parsed.title, "writing report");
        match self.write(&parsed) {
            Ok(data) => {
                let path = data["filepath"].clone();
                ToolResult::ok(data)
                    .with_metadata("filepath", path)
                    .with_metadata("format", Value::String(parsed.format.as_str().to_string()))
            }
            Err(e) => {
                tracing::error!(error = %e, "report write failed");
                ToolResult::failure(format!("Failed to write report: {}", e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_title() {
        assert_eq!(
            ReportWriterTool::safe_title("Research Report: AI/ML?"),
            "Research_Report_AIML"
        );
        assert_eq!(ReportWriterTool::safe_title(&"x".repeat(80)).len(), 50);
    }

    #[tokio::test]
    async fn test_writes_markdown_report() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ReportWriterTool::new(dir.path());
        let r = tool
            .execute(json!({
                "title": "Solar power",
                "content": "Panels are getting cheaper.",
                "sources": ["https://nature.com/a"]
            }))
            .await;
        assert!(r.success, "{:?}", r.error);
        let path = r.data["filepath"].as_str().unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.starts_with("# Solar power"));
        assert!(text.contains("1. https://nature.com/a"));
        assert_eq!(r.data["format"], "markdown");
    }

    #[tokio::test]
    async fn test_rejects_bad_format() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ReportWriterTool::new(dir.path());
        let args = json!({"title": "t", "content": "c", "sources": [], "format": "pdf"});
        assert!(tool.validate_input(&args).is_err());
        assert!(!tool.execute(args).await.success);
    }
}
