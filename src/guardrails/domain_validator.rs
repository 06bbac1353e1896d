//! 域名白名单校验
//!
//! 用 URL 解析器提取 host（小写，去掉 scheme / userinfo / 端口 / 路径），去掉 www. 前缀后
//! 与白名单逐项比较：相等或为其子域即通过。example.com.evil.net 不是 example.com 的子域。

/// 从 URL 中提取 host（小写，不含端口与路径）
///
/// 与发请求的 reqwest 使用同一解析器（`\` 在 http(s) URL 中是路径分隔符）；无法解析时返回 None。
pub fn extract_host(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url.trim()).ok()?;
    let host = parsed.host_str()?.trim_end_matches('.');
    if host.is_empty() {
        None
    } else {
        Some(host.to_lowercase())
    }
}

fn strip_www(domain: &str) -> &str {
    domain.strip_prefix("www.").unwrap_or(domain)
}

/// host 与 allowed 相等或为其子域（双方都先去掉 www.）
pub fn domain_matches(host: &str, allowed: &str) -> bool {
    let host = strip_www(host);
    let allowed = allowed.trim().to_lowercase();
    let allowed = strip_www(&allowed);
    if allowed.is_empty() {
        return false;
    }
    host == allowed || host.ends_with(&format!(".{}", allowed))
}

/// 域名白名单校验器；enabled=false 时总是通过
#[derive(Debug, Clone)]
pub struct DomainValidator {
    allowed_domains: Vec<String>,
    enabled: bool,
}

impl DomainValidator {
    pub fn new(allowed_domains: Vec<String>, enabled: bool) -> Self {
        let allowed_domains = allowed_domains
            .into_iter()
            .map(|d| d.trim().to_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        Self {
            allowed_domains,
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn allowed_domains(&self) -> &[String] {
        &self.allowed_domains
    }

    pub fn is_allowed(&self, url: &str) -> Result<(), String> {
        if !self.enabled {
            return Ok(());
        }
        let host = extract_host(url).ok_or_else(|| format!("Error parsing URL: {}", url))?;
        if self.allowed_domains.iter().any(|a| domain_matches(&host, a)) {
            tracing::debug!(domain = %host, "domain allowed");
            return Ok(());
        }
        let domain = strip_www(&host);
        let msg = format!(
            "Domain '{}' is not in the whitelist. Allowed domains: {}",
            domain,
            self.allowed_domains.join(", ")
        );
        tracing::warn!("{}", msg);
        Err(msg)
    }

    /// 运行时追加白名单域名（重复忽略）
    pub fn add_domain(&mut self, domain: &str) {
        let domain = domain.trim().to_lowercase();
        if !domain.is_empty() && !self.allowed_domains.contains(&domain) {
            tracing::info!(domain = %domain, "added domain to whitelist");
            self.allowed_domains.push(domain);
        }
    }
}
