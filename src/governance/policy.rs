//! 策略合规检查
//!
//! 策略文件存在则加载（.toml 按 TOML 解析，其余按 JSON），否则使用默认值。
//! check_plan / check_report 返回全部违规项而不是第一个；未识别的键原样保留但不参与检查。
//! update_policy 合并新值并写回同一文件。

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::AgentError;
use crate::guardrails::extract_host;

fn default_true() -> bool {
    true
}

fn default_min_sources() -> usize {
    3
}

fn default_max_urls_per_domain() -> usize {
    5
}

fn default_max_report_length() -> usize {
    10_000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    #[serde(default = "default_true")]
    pub must_cite_sources: bool,
    #[serde(default = "default_min_sources")]
    pub min_sources: usize,
    #[serde(default = "default_max_urls_per_domain")]
    pub max_urls_per_domain: usize,
    #[serde(default = "default_max_report_length")]
    pub max_report_length: usize,
    #[serde(default)]
    pub forbidden_domains: Vec<String>,
    /// 未识别的键（例如 require_peer_reviewed）
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            must_cite_sources: true,
            min_sources: default_min_sources(),
            max_urls_per_domain: default_max_urls_per_domain(),
            max_report_length: default_max_report_length(),
            forbidden_domains: Vec::new(),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyRule {
    MustCiteSources,
    MinSources,
    MaxUrlsPerDomain,
    ForbiddenDomain,
    MaxReportLength,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyViolation {
    pub rule: PolicyRule,
    pub message: String,
}

impl fmt::Display for PolicyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PolicyReport {
    pub violations: Vec<PolicyViolation>,
}

impl PolicyReport {
    pub fn is_compliant(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn messages(&self) -> Vec<String> {
        self.violations.iter().map(|v| v.message.clone()).collect()
    }

    fn push(&mut self, rule: PolicyRule, message: String) {
        self.violations.push(PolicyViolation { rule, message });
    }
}

/// 写报告前的研究计划：来源列表与已收集内容总长度
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlanSummary {
    pub sources: Vec<String>,
    pub total_content_length: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub sources: Vec<String>,
    pub content: String,
}

pub struct PolicyChecker {
    policy_file: PathBuf,
    policy: Policy,
}

impl PolicyChecker {
    /// 加载策略；文件缺失或无法解析时退回默认策略
    pub fn load(policy_file: impl Into<PathBuf>) -> Self {
        let policy_file = policy_file.into();
        let policy = match read_policy(&policy_file) {
            Ok(Some(p)) => {
                tracing::info!(path = %policy_file.display(), "loaded policy");
                p
            }
            Ok(None) => Policy::default(),
            Err(e) => {
                tracing::warn!(path = %policy_file.display(), error = %e, "failed to load policy file, using default policy");
                Policy::default()
            }
        };
        Self {
            policy_file,
            policy,
        }
    }

    pub fn with_policy(policy_file: impl Into<PathBuf>, policy: Policy) -> Self {
        Self {
            policy_file: policy_file.into(),
            policy,
        }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn policy_file(&self) -> &Path {
        &self.policy_file
    }

    fn check_citations(&self, sources: &[String], noun: &str, verb: &str, report: &mut PolicyReport) {
        if !self.policy.must_cite_sources {
            return;
        }
        if sources.is_empty() {
            report.push(
                PolicyRule::MustCiteSources,
                format!("{} must {} sources", noun, verb),
            );
        } else if sources.len() < self.policy.min_sources {
            report.push(
                PolicyRule::MinSources,
                format!(
                    "{} must {} at least {} sources",
                    noun, verb, self.policy.min_sources
                ),
            );
        }
    }

    pub fn check_plan(&self, plan: &PlanSummary) -> PolicyReport {
        let mut report = PolicyReport::default();
        self.check_citations(&plan.sources, "Plan", "include", &mut report);

        let hosts: Vec<String> = plan.sources.iter().filter_map(|s| extract_host(s)).collect();

        let mut per_domain: BTreeMap<&str, usize> = BTreeMap::new();
        for host in &hosts {
            *per_domain.entry(host.as_str()).or_default() += 1;
        }
        for (domain, count) in per_domain {
            if count > self.policy.max_urls_per_domain {
                report.push(
                    PolicyRule::MaxUrlsPerDomain,
                    format!(
                        "Too many URLs from {} (max {})",
                        domain, self.policy.max_urls_per_domain
                    ),
                );
            }
        }

        for host in &hosts {
            if self
                .policy
                .forbidden_domains
                .iter()
                .any(|f| f.trim().eq_ignore_ascii_case(host))
            {
                report.push(PolicyRule::ForbiddenDomain, format!("Forbidden domain: {}", host));
            }
        }

        if report.is_compliant() {
            tracing::info!(sources = plan.sources.len(), content_length = plan.total_content_length, "plan complies with policy");
        } else {
            tracing::warn!(violations = ?report.messages(), "plan policy violations");
        }
        report
    }

    pub fn check_report(&self, summary: &ReportSummary) -> PolicyReport {
        let mut report = PolicyReport::default();
        self.check_citations(&summary.sources, "Report", "cite", &mut report);
        if summary.content.chars().count() > self.policy.max_report_length {
            report.push(
                PolicyRule::MaxReportLength,
                format!(
                    "Report too long (max {} characters)",
                    self.policy.max_report_length
                ),
            );
        }
        if report.is_compliant() {
            tracing::info!("report complies with policy");
        } else {
            tracing::warn!(violations = ?report.messages(), "report policy violations");
        }
        report
    }

    /// 合并更新并持久化；类型不符（如 min_sources 为字符串）时报错且不修改当前策略
    pub fn update_policy(&mut self, updates: Map<String, Value>) -> Result<(), AgentError> {
        let mut merged = match serde_json::to_value(&self.policy) {
            Ok(Value::Object(m)) => m,
            Ok(_) => Map::new(),
            Err(e) => return Err(AgentError::Policy(e.to_string())),
        };
        let keys: Vec<String> = updates.keys().cloned().collect();
        merged.extend(updates);
        let policy: Policy = serde_json::from_value(Value::Object(merged))
            .map_err(|e| AgentError::Policy(format!("invalid policy update: {}", e)))?;
        self.policy = policy;
        tracing::info!(keys = ?keys, "policy updated");
        write_policy(&self.policy_file, &self.policy)
            .map_err(|e| AgentError::Policy(format!("failed to save policy: {}", e)))?;
        tracing::info!(path = %self.policy_file.display(), "policy saved");
        Ok(())
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("toml")
}

fn read_policy(path: &Path) -> anyhow::Result<Option<Policy>> {
    if !path.exists() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(path)?;
    let policy = if is_toml(path) {
        toml::from_str(&text)?
    } else {
        serde_json::from_str(&text)?
    };
    Ok(Some(policy))
}

fn write_policy(path: &Path, policy: &Policy) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let text = if is_toml(path) {
        toml::to_string_pretty(policy)?
    } else {
        serde_json::to_string_pretty(policy)?
    };
    std::fs::write(path, text)?;
    Ok(())
}
