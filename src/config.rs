//! 应用配置：从 config/default.toml、可选配置文件与环境变量加载
//!
//! 加载顺序：先读默认 TOML，再叠加 --config 指定的文件，最后用环境变量 `QUILL__*` 覆盖
//! （双下划线表示嵌套，如 `QUILL__AGENT__MAX_ITERATIONS=5`）。
//! 配置以 AppConfig 值显式传入各组件，不存在全局配置对象。

use std::path::PathBuf;

use serde::Deserialize;

use crate::core::AgentError;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub agent: AgentSection,
    pub tools: ToolsSection,
    pub guardrails: GuardrailsSection,
    pub governance: GovernanceSection,
}

/// [app] 段：名称、日志级别、状态与报告目录
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    /// EnvFilter 默认指令，RUST_LOG 优先
    pub log_level: String,
    /// 检查点目录
    pub state_dir: PathBuf,
    pub reports_dir: PathBuf,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "quill".to_string(),
            log_level: "info".to_string(),
            state_dir: PathBuf::from("data/state"),
            reports_dir: PathBuf::from("data/reports"),
        }
    }
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// openai / deepseek / mock；缺少 API Key 时回退到 mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub temperature: f32,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            temperature: 0.7,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 60 }
    }
}

/// [agent] 段：迭代上限与系统提示词
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    pub max_iterations: u32,
    /// 自定义系统提示词文件；不存在时使用内置提示词
    pub system_prompt_path: Option<PathBuf>,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            system_prompt_path: None,
        }
    }
}

/// [tools] 段：单次调用超时、搜索与网页读取参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    pub tool_timeout_secs: u64,
    pub search: SearchSection,
    pub reader: ReaderSection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
            search: SearchSection::default(),
            reader: ReaderSection::default(),
        }
    }
}

/// [tools.search] 段：Serper 端点；API Key 取自 SERPER_API_KEY
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    pub api_url: String,
    pub timeout_secs: u64,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            api_url: "https://google.serper.dev/search".to_string(),
            timeout_secs: 15,
        }
    }
}

/// [tools.reader] 段：抓取超时与正文最大字符数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReaderSection {
    pub timeout_secs: u64,
    pub max_content_length: usize,
}

impl Default for ReaderSection {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            max_content_length: 50_000,
        }
    }
}

/// [guardrails] 段：三个内置护栏的开关与域名白名单
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GuardrailsSection {
    pub enable_input_validation: bool,
    pub enable_domain_whitelist: bool,
    pub enable_pii_redaction: bool,
    pub allowed_domains: Vec<String>,
}

impl Default for GuardrailsSection {
    fn default() -> Self {
        Self {
            enable_input_validation: true,
            enable_domain_whitelist: true,
            enable_pii_redaction: true,
            allowed_domains: default_allowed_domains(),
        }
    }
}

fn default_allowed_domains() -> Vec<String> {
    [
        // 东非新闻
        "observer.ug",
        "newvision.co.ug",
        "kigezi.co.ug",
        "dailymonitor.com",
        "dailymonitor.co.ug",
        "monitor.co.ug",
        "ntv.co.ug",
        "theeastafrican.co.ke",
        "africanews.com",
        // 国际媒体
        "aljazeera.com",
        "aljazeera.net",
        "nationalgeographic.com",
        // 学术 / 开发者
        "arxiv.org",
        "nature.com",
        "science.org",
        "github.com",
        "stackoverflow.com",
        "wikipedia.org",
        "ieee.org",
        "acm.org",
        "scholar.google.com",
        "pubmed.ncbi.nlm.nih.gov",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// [governance] 段：审批、回滚与策略文件
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GovernanceSection {
    pub require_human_approval: bool,
    pub enable_rollback: bool,
    /// .json 或 .toml
    pub policy_file: PathBuf,
    /// 命中这些域名的 url 类操作需要审批
    pub sensitive_domains: Vec<String>,
    /// 总是需要审批的操作
    pub gated_operations: Vec<String>,
    /// 按目标 URL 决定是否审批的操作
    pub url_operations: Vec<String>,
}

impl Default for GovernanceSection {
    fn default() -> Self {
        Self {
            require_human_approval: false,
            enable_rollback: true,
            policy_file: PathBuf::from("policies/default_policy.json"),
            sensitive_domains: Vec::new(),
            gated_operations: vec!["write_report".to_string()],
            url_operations: vec!["read_url".to_string()],
        }
    }
}

/// 加载配置，环境变量 QUILL__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 QUILL__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, AgentError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path).required(false));
        } else {
            tracing::warn!(path = %path.display(), "config file not found, ignoring");
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("QUILL")
            .prefix_separator("__")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("guardrails.allowed_domains")
            .with_list_parse_key("governance.sensitive_domains")
            .try_parsing(true),
    );

    builder
        .build()
        .and_then(|c| c.try_deserialize())
        .map_err(|e| AgentError::ConfigError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = AppConfig::default();
        assert_eq!(c.agent.max_iterations, 10);
        assert_eq!(c.app.state_dir, PathBuf::from("data/state"));
        assert!(c.guardrails.enable_domain_whitelist);
        assert!(c.guardrails.allowed_domains.iter().any(|d| d == "arxiv.org"));
        assert!(!c.governance.require_human_approval);
        assert!(c.governance.enable_rollback);
        assert_eq!(c.governance.policy_file, PathBuf::from("policies/default_policy.json"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quill.toml");
        std::fs::write(
            &path,
            "[agent]\nmax_iterations = 3\n\n[guardrails]\nenable_pii_redaction = false\n",
        )
        .unwrap();
        let c = load_config(Some(path)).unwrap();
        assert_eq!(c.agent.max_iterations, 3);
        assert!(!c.guardrails.enable_pii_redaction);
        assert!(c.guardrails.enable_input_validation);
        assert_eq!(c.tools.reader.max_content_length, 50_000);
    }
}
