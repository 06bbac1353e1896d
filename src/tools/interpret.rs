//! 结果解释策略
//!
//! 每个工具通过 Tool::kind() 声明一个 ToolKind 标签，ReAct 循环据此选择策略：
//! 生成 Observation 文本、提取来源 URL、提取可引用信息片段、识别已写出的文件路径。
//! 新增一种能力只需新增一个策略实现。

use serde::Serialize;
use serde_json::Value;

use crate::core::InfoFragment;

/// 能力类别标签（封闭集合）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// 搜索类：结果列表 results[{title, url, snippet}]
    Search,
    /// 抓取类：单页 {url, title, content, content_length}
    Fetch,
    /// 报告写入：{filepath, ...}
    Report,
    Generic,
}

impl ToolKind {
    pub fn interpreter(self) -> &'static dyn ResultInterpreter {
        match self {
            ToolKind::Search => &SearchInterpreter,
            ToolKind::Fetch => &FetchInterpreter,
            ToolKind::Report => &ReportInterpreter,
            ToolKind::Generic => &GenericInterpreter,
        }
    }

    /// 需要做域名白名单校验的类别（参数中带 url）
    pub fn takes_url(self) -> bool {
        matches!(self, ToolKind::Fetch)
    }
}

/// 单个类别的结果解释策略
pub trait ResultInterpreter: Send + Sync {
    /// 成功结果的 Observation 文本
    fn observation(&self, data: &Value) -> String;

    /// 需要记录为来源的 URL（按出现顺序）
    fn sources(&self, _data: &Value) -> Vec<String> {
        Vec::new()
    }

    /// 值得引用的信息片段
    fn info(&self, _data: &Value) -> Option<InfoFragment> {
        None
    }

    /// 结果中写出的文件路径（有则编排器停止循环）
    fn artifact_path(&self, _data: &Value) -> Option<String> {
        None
    }
}

fn stringify(data: &Value) -> String {
    match data {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn str_field<'a>(data: &'a Value, key: &str) -> Option<&'a str> {
    data.get(key).and_then(Value::as_str)
}

pub struct SearchInterpreter;

impl ResultInterpreter for SearchInterpreter {
    fn observation(&self, data: &Value) -> String {
        if !data.is_object() {
            return stringify(data);
        }
        let results = data
            .get("results")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        if results.is_empty() {
            return "No search results found.".to_string();
        }
        let titles: Vec<&str> = results
            .iter()
            .take(3)
            .map(|r| str_field(r, "title").unwrap_or(""))
            .collect();
        format!(
            "Found {} search results. Top results: {}",
            results.len(),
            titles.join(", ")
        )
    }

    fn sources(&self, data: &Value) -> Vec<String> {
        data.get("results")
            .and_then(Value::as_array)
            .map(|results| {
                results
                    .iter()
                    .filter_map(|r| str_field(r, "url"))
                    .filter(|u| !u.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

pub struct FetchInterpreter;

impl ResultInterpreter for FetchInterpreter {
    fn observation(&self, data: &Value) -> String {
        if !data.is_object() {
            return stringify(data);
        }
        let title = str_field(data, "title").unwrap_or("Unknown");
        let length = data
            .get("content_length")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        format!("Read article '{}' ({} characters)", title, length)
    }

    fn sources(&self, data: &Value) -> Vec<String> {
        str_field(data, "url")
            .filter(|u| !u.is_empty())
            .map(|u| vec![u.to_string()])
            .unwrap_or_default()
    }

    fn info(&self, data: &Value) -> Option<InfoFragment> {
        let content = str_field(data, "content")?.trim();
        if content.is_empty() {
            return None;
        }
        Some(InfoFragment {
            source: str_field(data, "url").map(str::to_string),
            title: str_field(data, "title").map(str::to_string),
            content: content.to_string(),
        })
    }
}

pub struct ReportInterpreter;

impl ResultInterpreter for ReportInterpreter {
    fn observation(&self, data: &Value) -> String {
        if !data.is_object() {
            return stringify(data);
        }
        format!(
            "Report written to {}",
            str_field(data, "filepath").unwrap_or("Unknown")
        )
    }

    fn artifact_path(&self, data: &Value) -> Option<String> {
        str_field(data, "filepath").map(str::to_string)
    }
}

pub struct GenericInterpreter;

impl ResultInterpreter for GenericInterpreter {
    fn observation(&self, data: &Value) -> String {
        stringify(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_search_observation_lists_top_three() {
        let data = json!({"results": [
            {"title": "A", "url": "https://a.org"},
            {"title": "B", "url": "https://b.org"},
            {"title": "C", "url": "https://c.org"},
            {"title": "D", "url": "https://d.org"},
        ]});
        let interp = ToolKind::Search.interpreter();
        assert_eq!(
            interp.observation(&data),
            "Found 4 search results. Top results: A, B, C"
        );
        assert_eq!(interp.sources(&data).len(), 4);
        assert!(interp.info(&data).is_none());
    }

    #[test]
    fn test_search_observation_empty() {
        let interp = ToolKind::Search.interpreter();
        assert_eq!(
            interp.observation(&json!({"results": []})),
            "No search results found."
        );
    }

    #[test]
    fn test_fetch_interpretation() {
        let data = json!({
            "url": "https://arxiv.org/abs/1",
            "title": "Paper",
            "content": "abstract text",
            "content_length": 13
        });
        let interp = ToolKind::Fetch.interpreter();
        assert_eq!(interp.observation(&data), "Read article 'Paper' (13 characters)");
        assert_eq!(interp.sources(&data), vec!["https://arxiv.org/abs/1"]);
        let info = interp.info(&data).unwrap();
        assert_eq!(info.content, "abstract text");
        assert_eq!(info.source.as_deref(), Some("https://arxiv.org/abs/1"));
    }

    #[test]
    fn test_report_artifact_path() {
        let data = json!({"filepath": "data/reports/r.md"});
        let interp = ToolKind::Report.interpreter();
        assert_eq!(interp.observation(&data), "Report written to data/reports/r.md");
        assert_eq!(interp.artifact_path(&data).as_deref(), Some("data/reports/r.md"));
        assert!(ToolKind::Search.interpreter().artifact_path(&data).is_none());
    }

    #[test]
    fn test_generic_stringifies() {
        let interp = ToolKind::Generic.interpreter();
        assert_eq!(interp.observation(&json!("plain")), "plain");
        assert_eq!(interp.observation(&json!({"a": 1})), r#"{"a":1}"#);
    }
}
