//! PII 脱敏：邮箱、电话、SSN、信用卡号、私有 IPv4
//!
//! 只处理已知的文本字段（content / title / description / snippet / text），搜索结果额外处理 results[*]。
//! 公网 IP 原样保留。每个字段的脱敏次数写入结果 metadata.redaction_info，不改动主负载结构。

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use regex::{Captures, Regex};
use serde_json::{json, Map, Value};

use crate::tools::{ToolKind, ToolResult};

const TEXT_FIELDS: &[&str] = &["content", "title", "description", "snippet", "text"];

/// 单次脱敏的计数：类别 -> 次数（只统计真正被替换的匹配）
pub type RedactionCounts = BTreeMap<&'static str, usize>;

struct Pattern {
    class: &'static str,
    placeholder: &'static str,
    regex: Regex,
}

pub struct PiiRedactor {
    enabled: bool,
    patterns: Vec<Pattern>,
}

impl PiiRedactor {
    pub fn new(enabled: bool) -> Self {
        // 顺序有意义：SSN / 卡号先于电话，避免被电话模式部分吃掉
        let specs: [(&'static str, &'static str, &str); 5] = [
            (
                "email",
                "[EMAIL_REDACTED]",
                r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
            ),
            ("ssn", "[SSN_REDACTED]", r"\b\d{3}-\d{2}-\d{4}\b"),
            (
                "credit_card",
                "[CARD_REDACTED]",
                r"\b\d{4}[\s-]?\d{4}[\s-]?\d{4}[\s-]?\d{4}\b",
            ),
            (
                "phone",
                "[PHONE_REDACTED]",
                r"\b(?:\+?1[-.\s]?)?\(?([0-9]{3})\)?[-.\s]?([0-9]{3})[-.\s]?([0-9]{4})\b",
            ),
            ("ip_address", "[IP_REDACTED]", r"\b(?:\d{1,3}\.){3}\d{1,3}\b"),
        ];
        let patterns = specs
            .into_iter()
            .map(|(class, placeholder, re)| Pattern {
                class,
                placeholder,
                regex: Regex::new(re).expect("valid PII regex"),
            })
            .collect();
        Self { enabled, patterns }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// 对一段文本做脱敏，返回新文本与各类别替换次数
    pub fn redact_text(&self, text: &str) -> (String, RedactionCounts) {
        let mut counts = RedactionCounts::new();
        if !self.enabled {
            return (text.to_string(), counts);
        }
        let mut out = text.to_string();
        for p in &self.patterns {
            let mut n = 0usize;
            let replaced = p.regex.replace_all(&out, |caps: &Captures| {
                let m = &caps[0];
                if p.class == "ip_address" && !is_private_ipv4(m) {
                    return m.to_string();
                }
                n += 1;
                p.placeholder.to_string()
            });
            if n > 0 {
                out = replaced.into_owned();
                counts.insert(p.class, n);
            }
        }
        (out, counts)
    }

    /// 对成功的工具结果做脱敏（就地修改），计数写入 metadata.redaction_info
    pub fn redact_result(&self, kind: ToolKind, result: &mut ToolResult) {
        if !self.enabled || !result.success {
            return;
        }
        let mut info = Map::new();
        match &mut result.data {
            Value::String(s) => {
                self.redact_in_place(s, "data", &mut info);
            }
            Value::Object(obj) => {
                self.redact_fields(obj, "", &mut info);
                if kind == ToolKind::Search {
                    if let Some(Value::Array(items)) = obj.get_mut("results") {
                        for (i, item) in items.iter_mut().enumerate() {
                            if let Value::Object(entry) = item {
                                self.redact_fields(entry, &format!("results[{}].", i), &mut info);
                            }
                        }
                    }
                }
            }
            _ => {}
        }
        if !info.is_empty() {
            tracing::info!(fields = info.len(), "PII redacted from tool result");
            result
                .metadata
                .insert("redaction_info".to_string(), Value::Object(info));
        }
    }

    fn redact_fields(&self, obj: &mut Map<String, Value>, prefix: &str, info: &mut Map<String, Value>) {
        for field in TEXT_FIELDS {
            if let Some(Value::String(s)) = obj.get_mut(*field) {
                self.redact_in_place(s, &format!("{}{}", prefix, field), info);
            }
        }
    }

    fn redact_in_place(&self, s: &mut String, field: &str, info: &mut Map<String, Value>) {
        let (redacted, counts) = self.redact_text(s);
        if !counts.is_empty() {
            *s = redacted;
            info.insert(field.to_string(), json!(counts));
        }
    }
}

fn is_private_ipv4(s: &str) -> bool {
    s.parse::<Ipv4Addr>().map(|ip| ip.is_private()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_redacted() {
        let r = PiiRedactor::new(true);
        let (out, counts) = r.redact_text("reach me at a@b.com");
        assert!(out.contains("[EMAIL_REDACTED]"));
        assert!(!out.contains("a@b.com"));
        assert_eq!(counts.get("email"), Some(&1));
    }

    #[test]
    fn test_private_ip_only() {
        let r = PiiRedactor::new(true);
        let (out, counts) = r.redact_text("internal 10.1.2.3, resolver 8.8.8.8");
        assert!(out.contains("[IP_REDACTED]"));
        assert!(!out.contains("10.1.2.3"));
        assert!(out.contains("8.8.8.8"));
        assert_eq!(counts.get("ip_address"), Some(&1));

        let (out, counts) = r.redact_text("gateway 192.168.0.1 and 172.20.1.1");
        assert_eq!(out, "gateway [IP_REDACTED] and [IP_REDACTED]");
        assert_eq!(counts.get("ip_address"), Some(&2));
    }

    #[test]
    fn test_ssn_card_phone() {
        let r = PiiRedactor::new(true);
        let (out, _) = r.redact_text("ssn 123-45-6789 card 4111 1111 1111 1111 call 555-123-4567");
        assert!(out.contains("[SSN_REDACTED]"));
        assert!(out.contains("[CARD_REDACTED]"));
        assert!(out.contains("[PHONE_REDACTED]"));
        assert!(!out.contains("6789"));
    }

    #[test]
    fn test_disabled_is_noop() {
        let r = PiiRedactor::new(false);
        let (out, counts) = r.redact_text("a@b.com");
        assert_eq!(out, "a@b.com");
        assert!(counts.is_empty());
    }

    #[test]
    fn test_redact_search_result_nested() {
        let r = PiiRedactor::new(true);
        let mut result = ToolResult::ok(json!({
            "query": "contacts",
            "results": [
                {"title": "Team", "url": "https://a.org", "snippet": "mail bob@corp.io"},
                {"title": "Clean", "url": "https://b.org", "snippet": "nothing here"}
            ]
        }));
        r.redact_result(ToolKind::Search, &mut result);
        assert_eq!(result.data["results"][0]["snippet"], "mail [EMAIL_REDACTED]");
        assert_eq!(result.data["results"][1]["snippet"], "nothing here");
        let info = &result.metadata["redaction_info"];
        assert_eq!(info["results[0].snippet"]["email"], 1);
        assert!(info.get("results[1].snippet").is_none());
    }

    #[test]
    fn test_redact_fetch_content() {
        let r = PiiRedactor::new(true);
        let mut result = ToolResult::ok(json!({
            "url": "https://a.org",
            "title": "Page",
            "content": "host 10.0.0.5 owner x@y.org"
        }));
        r.redact_result(ToolKind::Fetch, &mut result);
        assert_eq!(result.data["content"], "host [IP_REDACTED] owner [EMAIL_REDACTED]");
        assert_eq!(result.data["url"], "https://a.org");
        assert_eq!(result.metadata["redaction_info"]["content"]["ip_address"], 1);
    }
}
