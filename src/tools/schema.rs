//! 工具参数 JSON Schema 生成（schemars 自动生成工具 Schema）
//!
//! 每个内置能力的参数由一个类型化结构体描述，parameters_schema() 直接从结构体派生，
//! 避免手写 schema 与实际解析不一致。

use schemars::{schema_for, JsonSchema};
use serde::Deserialize;
use serde_json::Value;

/// search_web 参数
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SearchArgs {
    /// The search query string
    pub query: String,
    /// Number of results to return (1-10, default 10)
    #[serde(default)]
    pub num_results: Option<u8>,
}

/// read_url 参数
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ReadUrlArgs {
    /// The URL to read and extract content from
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Markdown,
    Json,
}

impl ReportFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportFormat::Markdown => "markdown",
            ReportFormat::Json => "json",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ReportFormat::Markdown => "md",
            ReportFormat::Json => "json",
        }
    }
}

/// write_report 参数
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct WriteReportArgs {
    /// The title of the research report
    pub title: String,
    /// The main content of the report
    pub content: String,
    /// List of source URLs cited in the report
    pub sources: Vec<String>,
    /// Output format (default: markdown)
    #[serde(default)]
    pub format: ReportFormat,
}

/// 返回类型 T 的参数 Schema（JSON 值），可直接放入能力声明
pub fn args_schema<T: JsonSchema>() -> Value {
    let schema = schema_for!(T);
    serde_json::to_value(&schema).unwrap_or_else(|_| serde_json::json!({"type": "object"}))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_schema_requires_query() {
        let schema = args_schema::<SearchArgs>();
        let required = schema["required"].as_array().unwrap();
        assert!(required.iter().any(|v| v == "query"));
        assert!(!required.iter().any(|v| v == "num_results"));
    }

    #[test]
    fn test_report_format_parses_lowercase() {
        let args: WriteReportArgs = serde_json::from_value(serde_json::json!({
            "title": "t", "content": "c", "sources": [], "format": "json"
        }))
        .unwrap();
        assert_eq!(args.format, ReportFormat::Json);
    }
}
