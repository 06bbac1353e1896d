//! 网页读取工具：超时、内容类型检查、正文提取、长度截断
//!
//! GET 请求带超时与浏览器 User-Agent；仅接受 text/html 与 text/plain；
//! 对 HTML 使用 html2text 提取可读文本（失败时回退为去标签），同时提取 <title> 与 meta description；
//! 正文超过 max_content_length 时截断并追加 [Content truncated...]。
//! 域名白名单由前置护栏负责，本工具不再重复校验。

use async_trait::async_trait;
use html2text::from_read;
use regex::Regex;
use reqwest::Client;
use serde_json::{json, Value};

use crate::tools::schema::{args_schema, ReadUrlArgs};
use crate::tools::{Tool, ToolKind, ToolResult};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// 简易去除 HTML 标签（html2text 失败时的回退）
fn strip_html_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 判断内容是否像 HTML（需提取可读文本）
fn looks_like_html(s: &str) -> bool {
    let s = s.trim_start();
    s.starts_with("<!") || s.starts_with("<html") || s.starts_with("<HTML")
        || (s.len() > 20 && s.contains('<') && (s.contains("</") || s.contains("<meta") || s.contains("<head") || s.contains("<title")))
}

/// 网页读取工具
pub struct UrlReaderTool {
    client: Client,
    max_content_length: usize,
    title_re: Regex,
    description_re: Regex,
}

impl UrlReaderTool {
    pub fn new(timeout_secs: u64, max_content_length: usize) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            max_content_length,
            title_re: Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid title regex"),
            description_re: Regex::new(
                r#"(?is)<meta\s+[^>]*name\s*=\s*["']description["'][^>]*content\s*=\s*["']([^"']*)["']"#,
            )
            .expect("valid meta regex"),
        }
    }

    fn extract_title(&self, html: &str) -> String {
        self.title_re
            .captures(html)
            .and_then(|c| c.get(1))
            .map(|m| strip_html_tags(m.as_str()))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "No title".to_string())
    }

    fn extract_description(&self, html: &str) -> String {
        self.description_re
            .captures(html)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default()
    }

    /// 将 HTML 转为可读文本（去除 script/style 等）
    fn html_to_text(&self, html: &str) -> String {
        match from_read(html.as_bytes(), 120) {
            Ok(text) if !text.trim().is_empty() => text,
            _ => strip_html_tags(html),
        }
    }

    fn truncate(&self, text: String) -> String {
        if text.chars().count() > self.max_content_length {
            text.chars().take(self.max_content_length).collect::<String>()
                + "\n\n[Content truncated...]"
        } else {
            text
        }
    }

    /// 解析响应体：HTML 提取正文 / 标题 / 描述，纯文本原样返回
    fn parse_body(&self, url: &str, mut body: String) -> Value {
        // 去除 BOM，避免 HTML 检测失败
        if body.starts_with('\u{FEFF}') {
            body = body['\u{FEFF}'.len_utf8()..].to_string();
        }
        let (title, description, text) = if looks_like_html(&body) {
            (
                self.extract_title(&body),
                self.extract_description(&body),
                self.html_to_text(&body),
            )
        } else {
            ("No title".to_string(), String::new(), body)
        };
        let text = self.truncate(text.trim().to_string());
        let content_length = text.chars().count();
        json!({
            "url": url,
            "title": title,
            "description": description,
            "content": text,
            "content_length": content_length,
        })
    }

    async fn fetch(&self, url: &str) -> Result<Value, String> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("Failed to fetch URL: {}", e))?;
        if !resp.status().is_success() {
            return Err(format!("Failed to fetch URL: HTTP {}", resp.status()));
        }
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_lowercase();
        if !content_type.contains("text/html") && !content_type.contains("text/plain") {
            return Err(format!("Unsupported content type: {}", content_type));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| format!("Failed to read body: {}", e))?;
        Ok(self.parse_body(url, body))
    }
}

#[async_trait]
impl Tool for UrlReaderTool {
    fn name(&self) -> &str {
        "read_url"
    }

    fn description(&self) -> &str {
        "Read and extract text content from a URL. Returns the main content of the webpage."
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Fetch
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<ReadUrlArgs>()
    }

    fn validate_input(&self, args: &Value) -> Result<(), String> {
        let parsed: ReadUrlArgs = serde_json::from_value(args.clone())
            .map_err(|_| "URL must be a non-empty string".to_string())?;
        let rest = parsed
            .url
            .split_once("://")
            .map(|(_, rest)| rest)
            .ok_or_else(|| "URL must have a valid scheme (http/https) and domain".to_string())?;
        if rest.split(['/', '?', '#']).next().unwrap_or("").is_empty() {
            return Err("URL must have a valid scheme (http/https) and domain".to_string());
        }
        Ok(())
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let url = args
            .get("url")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim()
            .to_string();
        if url.is_empty() {
            return ToolResult::failure("Missing url");
        }
        tracing::info!(url = %url, "reading url");
        match self.fetch(&url).await {
            Ok(data) => {
                let length = data["content_length"].clone();
                ToolResult::ok(data)
                    .with_metadata("url", Value::String(url))
                    .with_metadata("content_length", length)
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "url read failed");
                ToolResult::failure(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_html_body() {
        let tool = UrlReaderTool::new(5, 50_000);
        let html = r#"<!DOCTYPE html><html><head><title>Rust Book</title>
            <meta name="description" content="Learn Rust"></head>
            <body><p>Ownership rules.</p></body></html>"#;
        let data = tool.parse_body("https://doc.rust-lang.org/book", html.to_string());
        assert_eq!(data["title"], "Rust Book");
        assert_eq!(data["description"], "Learn Rust");
        assert!(data["content"].as_str().unwrap().contains("Ownership rules."));
        assert_eq!(data["url"], "https://doc.rust-lang.org/book");
    }

    #[test]
    fn test_plain_text_truncated() {
        let tool = UrlReaderTool::new(5, 10);
        let data = tool.parse_body("https://x.org/a.txt", "abcdefghijklmnop".to_string());
        let content = data["content"].as_str().unwrap();
        assert!(content.starts_with("abcdefghij"));
        assert!(content.ends_with("[Content truncated...]"));
        assert_eq!(data["title"], "No title");
    }

    #[test]
    fn test_validate_input_requires_host() {
        let tool = UrlReaderTool::new(5, 100);
        assert!(tool.validate_input(&json!({"url": "https://arxiv.org/abs/1"})).is_ok());
        assert!(tool.validate_input(&json!({"url": "https:///nohost"})).is_err());
        assert!(tool.validate_input(&json!({"url": "arxiv.org"})).is_err());
        assert!(tool.validate_input(&json!({})).is_err());
    }

    #[test]
    fn test_strip_html_tags() {
        assert_eq!(strip_html_tags("<b>a</b>  <i>b</i>"), "a b");
    }
}
