//! 通用输入校验：按工具类别（ToolKind）做结构检查，Generic 类别做可疑模式扫描
//!
//! 只检查参数形状与长度上限；工具自身的 validate_input 在域名校验之后单独执行。

use serde_json::{Map, Value};

use crate::tools::ToolKind;

const MAX_QUERY_LEN: usize = 10_000;
const MAX_URL_LEN: usize = 2048;
const MAX_TITLE_LEN: usize = 200;
const MAX_CONTENT_LEN: usize = 100_000;
const MAX_SOURCES: usize = 100;

/// Generic 工具参数中不允许出现的子串（路径穿越、脚本注入、非 http 协议）
const SUSPICIOUS_PATTERNS: &[&str] = &[
    "../",
    "file://",
    "javascript:",
    "data:",
    "<script",
    "eval(",
    "exec(",
];

#[derive(Debug, Clone)]
pub struct InputValidator {
    enabled: bool,
}

impl InputValidator {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// 校验一次工具调用的参数；disabled 时总是通过
    pub fn validate(&self, kind: ToolKind, args: &Value) -> Result<(), String> {
        if !self.enabled {
            return Ok(());
        }
        let params = args
            .as_object()
            .ok_or_else(|| "Parameters must be a dictionary".to_string())?;
        let result = match kind {
            ToolKind::Search => validate_search(params),
            ToolKind::Fetch => validate_read_url(params),
            ToolKind::Report => validate_write_report(params),
            ToolKind::Generic => scan_generic(params),
        };
        if let Err(e) = &result {
            tracing::warn!(kind = ?kind, error = %e, "input validation failed");
        }
        result
    }
}

fn required_str<'a>(params: &'a Map<String, Value>, key: &str) -> Result<&'a str, String> {
    match params.get(key) {
        None => Err(format!("Missing required parameter: {}", key)),
        Some(Value::String(s)) => Ok(s.as_str()),
        Some(_) => Err(format!("Parameter '{}' must be a string", key)),
    }
}

fn validate_search(params: &Map<String, Value>) -> Result<(), String> {
    let query = required_str(params, "query")?;
    if query.trim().is_empty() {
        return Err("Query cannot be empty".to_string());
    }
    if query.chars().count() > MAX_QUERY_LEN {
        return Err(format!("Query too long (max {} characters)", MAX_QUERY_LEN));
    }
    if let Some(n) = params.get("num_results") {
        match n.as_i64() {
            Some(n) if (1..=10).contains(&n) => {}
            _ => return Err("num_results must be an integer between 1 and 10".to_string()),
        }
    }
    Ok(())
}

fn validate_read_url(params: &Map<String, Value>) -> Result<(), String> {
    let url = required_str(params, "url")?;
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err("URL must start with http:// or https://".to_string());
    }
    if url.len() > MAX_URL_LEN {
        return Err(format!("URL too long (max {} characters)", MAX_URL_LEN));
    }
    Ok(())
}

fn validate_write_report(params: &Map<String, Value>) -> Result<(), String> {
    let title = required_str(params, "title")?;
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(format!("Title too long (max {} characters)", MAX_TITLE_LEN));
    }
    let content = required_str(params, "content")?;
    if content.chars().count() > MAX_CONTENT_LEN {
        return Err(format!("Content too long (max {} characters)", MAX_CONTENT_LEN));
    }
    let sources = match params.get("sources") {
        None => return Err("Missing required parameter: sources".to_string()),
        Some(Value::Array(items)) => items,
        Some(_) => return Err("Sources must be a list".to_string()),
    };
    if sources.len() > MAX_SOURCES {
        return Err(format!("Too many sources (max {})", MAX_SOURCES));
    }
    if sources.iter().any(|s| !s.is_string()) {
        return Err("All sources must be strings".to_string());
    }
    Ok(())
}

/// 递归扫描所有字符串值（嵌套对象与数组也检查）
fn scan_generic(params: &Map<String, Value>) -> Result<(), String> {
    for (key, value) in params {
        if contains_suspicious(value) {
            return Err(format!("Suspicious pattern detected in parameter '{}'", key));
        }
    }
    Ok(())
}

fn contains_suspicious(value: &Value) -> bool {
    match value {
        Value::String(s) => {
            let lower = s.to_lowercase();
            SUSPICIOUS_PATTERNS.iter().any(|p| lower.contains(p))
        }
        Value::Array(items) => items.iter().any(contains_suspicious),
        Value::Object(map) => map.values().any(contains_suspicious),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn v() -> InputValidator {
        InputValidator::new(true)
    }

    #[test]
    fn test_search_validation() {
        assert!(v().validate(ToolKind::Search, &json!({"query": "rust"})).is_ok());
        assert!(v().validate(ToolKind::Search, &json!({"query": "   "})).is_err());
        assert!(v().validate(ToolKind::Search, &json!({})).is_err());
        assert!(v().validate(ToolKind::Search, &json!({"query": "a", "num_results": 11})).is_err());
        assert!(v().validate(ToolKind::Search, &json!({"query": "a", "num_results": "3"})).is_err());
        let long = "x".repeat(MAX_QUERY_LEN + 1);
        assert!(v().validate(ToolKind::Search, &json!({"query": long})).is_err());
    }

    #[test]
    fn test_read_url_validation() {
        assert!(v().validate(ToolKind::Fetch, &json!({"url": "https://arxiv.org"})).is_ok());
        let err = v().validate(ToolKind::Fetch, &json!({"url": "ftp://x.org"})).unwrap_err();
        assert!(err.contains("http://"));
        let long = format!("https://a.org/{}", "p".repeat(MAX_URL_LEN));
        assert!(v().validate(ToolKind::Fetch, &json!({"url": long})).is_err());
    }

    #[test]
    fn test_write_report_validation() {
        let ok = json!({"title": "t", "content": "c", "sources": ["https://a.org"]});
        assert!(v().validate(ToolKind::Report, &ok).is_ok());
        let bad_sources = json!({"title": "t", "content": "c", "sources": "https://a.org"});
        assert!(v().validate(ToolKind::Report, &bad_sources).is_err());
        let mixed = json!({"title": "t", "content": "c", "sources": [1]});
        assert!(v().validate(ToolKind::Report, &mixed).is_err());
        let long_title = json!({"title": "t".repeat(201), "content": "c", "sources": []});
        assert!(v().validate(ToolKind::Report, &long_title).is_err());
    }

    #[test]
    fn test_generic_tool_suspicious_scan() {
        let err = v()
            .validate(ToolKind::Generic, &json!({"path": "../../etc/passwd"}))
            .unwrap_err();
        assert_eq!(err, "Suspicious pattern detected in parameter 'path'");
        assert!(v().validate(ToolKind::Generic, &json!({"x": {"y": ["<SCRIPT>"]}})).is_err());
        assert!(v().validate(ToolKind::Generic, &json!({"text": "hello"})).is_ok());
    }

    #[test]
    fn test_non_object_params_rejected() {
        let err = v().validate(ToolKind::Generic, &json!(["a"])).unwrap_err();
        assert_eq!(err, "Parameters must be a dictionary");
    }

    #[test]
    fn test_disabled_passes() {
        let v = InputValidator::new(false);
        assert!(v.validate(ToolKind::Fetch, &json!({"url": "ftp://x"})).is_ok());
    }
}
