//! Web 搜索工具：Serper API
//!
//! POST {q, num} 到 Serper 端点（X-API-KEY 认证），organic 结果映射为 results[{title, url, snippet, position}]。
//! 未配置 API Key 时返回失败结果而不是 panic。

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::tools::schema::{args_schema, SearchArgs};
use crate::tools::{Tool, ToolKind, ToolResult};

const DEFAULT_NUM_RESULTS: u8 = 10;

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperOrganic>,
}

#[derive(Debug, Deserialize)]
struct SerperOrganic {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    position: u32,
}

/// Search 工具：调用 Serper 搜索 API，返回结构化结果列表
pub struct WebSearchTool {
    client: Client,
    api_url: String,
    api_key: Option<String>,
}

impl WebSearchTool {
    pub fn new(api_url: impl Into<String>, api_key: Option<String>, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_url: api_url.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    fn check_args(args: &SearchArgs) -> Result<(), String> {
        if args.query.trim().is_empty() {
            return Err("Query must be a non-empty string".to_string());
        }
        if let Some(n) = args.num_results {
            if !(1..=10).contains(&n) {
                return Err("num_results must be an integer between 1 and 10".to_string());
            }
        }
        Ok(())
    }

    async fn search(&self, args: &SearchArgs) -> Result<Value, String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| "Search API key not configured (SERPER_API_KEY)".to_string())?;
        let num = args.num_results.unwrap_or(DEFAULT_NUM_RESULTS).min(10);
        let resp = self
            .client
            .post(&self.api_url)
            .header("X-API-KEY", api_key)
            .json(&json!({"q": args.query, "num": num}))
            .send()
            .await
            .map_err(|e| format!("Search API error: {}", e))?;
        if !resp.status().is_success() {
            return Err(format!("Search API error: HTTP {}", resp.status()));
        }
        let body: SerperResponse = resp
            .json()
            .await
            .map_err(|e| format!("Search API error: {}", e))?;

        let results: Vec<Value> = body
            .organic
            .into_iter()
            .map(|r| {
                json!({
                    "title": r.title,
                    "url": r.link,
                    "snippet": r.snippet,
                    "position": r.position,
                })
            })
            .collect();
        tracing::info!(query = %args.query, count = results.len(), "search results");
        Ok(json!({
            "total_results": results.len(),
            "results": results,
            "query": args.query,
        }))
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "search_web"
    }

    fn description(&self) -> &str {
        "Search the web for information. Returns a list of relevant URLs and snippets."
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Search
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<SearchArgs>()
    }

    fn validate_input(&self, args: &Value) -> Result<(), String> {
        let parsed: SearchArgs = serde_json::from_value(args.clone())
            .map_err(|e| format!("Invalid search arguments: {}", e))?;
        Self::check_args(&parsed)
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let parsed: SearchArgs = match serde_json::from_value(args) {
            Ok(a) => a,
            Err(e) => return ToolResult::failure(format!("Invalid search arguments: {}", e)),
        };
        if let Err(e) = Self::check_args(&parsed) {
            return ToolResult::failure(e);
        }
        tracing::info!(query = %parsed.query, "searching web");
        match self.search(&parsed).await {
            Ok(data) => {
                let count = data["total_results"].clone();
                ToolResult::ok(data)
                    .with_metadata("num_results", count)
                    .with_metadata("query", Value::String(parsed.query))
            }
            Err(e) => {
                tracing::warn!(error = %e, "web search failed");
                ToolResult::failure(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool() -> WebSearchTool {
        WebSearchTool::new("http://127.0.0.1:9/search", None, 1)
    }

    #[test]
    fn test_validate_input() {
        let t = tool();
        assert!(t.validate_input(&json!({"query": "rust"})).is_ok());
        assert!(t.validate_input(&json!({"query": "  "})).is_err());
        assert!(t.validate_input(&json!({"query": "rust", "num_results": 0})).is_err());
        assert!(t.validate_input(&json!({})).is_err());
    }

    #[tokio::test]
    async fn test_missing_api_key_is_failure() {
        let r = tool().execute(json!({"query": "rust"})).await;
        assert!(!r.success);
        assert!(r.error_message().contains("SERPER_API_KEY"));
    }
}
