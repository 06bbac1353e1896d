//! 人工审批
//!
//! requires_approval：关闭时恒为 false；gated_operations 中的操作总是需要审批；
//! url_operations 中的操作当目标 URL 命中敏感域名时需要审批。
//! request_approval 创建 pending 记录，交给 ApprovalDecider 决定并等待结果（不设超时，调用方自行包 timeout）。
//! 状态只允许 pending -> approved / rejected 一次。

use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::AgentError;
use crate::guardrails::{domain_matches, extract_host};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub approval_id: String,
    pub operation: String,
    pub context: Value,
    pub status: ApprovalStatus,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

/// 外部决策者给出的结论
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalDecision {
    pub approved: bool,
    pub reason: Option<String>,
}

impl ApprovalDecision {
    pub fn approve() -> Self {
        Self {
            approved: true,
            reason: None,
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            reason: Some(reason.into()),
        }
    }
}

/// 外部决策者（控制台、Webhook、测试桩……）；decide 可以无限期等待
#[async_trait]
pub trait ApprovalDecider: Send + Sync {
    async fn decide(&self, record: &ApprovalRecord) -> ApprovalDecision;
}

/// 控制台审批：在阻塞线程上读取 stdin 的 yes / no
pub struct ConsoleDecider;

#[async_trait]
impl ApprovalDecider for ConsoleDecider {
    async fn decide(&self, record: &ApprovalRecord) -> ApprovalDecision {
        println!("\n⚠️  HUMAN APPROVAL REQUIRED");
        println!("Operation: {}", record.operation);
        println!("Approval ID: {}", record.approval_id);
        println!("Context: {}", record.context);
        print!("\nApprove? (yes/no): ");
        let _ = io::stdout().flush();

        let answer = tokio::task::spawn_blocking(|| {
            let mut input = String::new();
            io::stdin().read_line(&mut input).ok().map(|_| input)
        })
        .await;

        match answer {
            Ok(Some(input)) if matches!(input.trim().to_lowercase().as_str(), "y" | "yes") => {
                ApprovalDecision::approve()
            }
            _ => ApprovalDecision::reject("User rejected"),
        }
    }
}

/// 固定结论（测试与无人值守运行）
pub struct StaticDecider {
    approve: bool,
}

impl StaticDecider {
    pub fn approve_all() -> Self {
        Self { approve: true }
    }

    pub fn reject_all() -> Self {
        Self { approve: false }
    }
}

#[async_trait]
impl ApprovalDecider for StaticDecider {
    async fn decide(&self, _record: &ApprovalRecord) -> ApprovalDecision {
        if self.approve {
            ApprovalDecision::approve()
        } else {
            ApprovalDecision::reject("Rejected by policy")
        }
    }
}

/// request_approval 的结果；无需审批时 approval_id 为 None
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalOutcome {
    pub approved: bool,
    pub approval_id: Option<String>,
    pub reason: Option<String>,
}

pub struct HumanApproval {
    enabled: bool,
    gated_operations: Vec<String>,
    url_operations: Vec<String>,
    sensitive_domains: Vec<String>,
    decider: Arc<dyn ApprovalDecider>,
    records: Mutex<HashMap<String, ApprovalRecord>>,
}

impl HumanApproval {
    pub fn new(enabled: bool, decider: Arc<dyn ApprovalDecider>) -> Self {
        Self {
            enabled,
            gated_operations: vec!["write_report".to_string()],
            url_operations: vec!["read_url".to_string()],
            sensitive_domains: Vec::new(),
            decider,
            records: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_gated_operations(mut self, operations: Vec<String>) -> Self {
        self.gated_operations = operations;
        self
    }

    pub fn with_url_operations(mut self, operations: Vec<String>) -> Self {
        self.url_operations = operations;
        self
    }

    pub fn with_sensitive_domains(mut self, domains: Vec<String>) -> Self {
        self.sensitive_domains = domains;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ApprovalRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn requires_approval(&self, operation: &str, context: &Value) -> bool {
        if !self.enabled {
            return false;
        }
        if self.gated_operations.iter().any(|o| o == operation) {
            return true;
        }
        if self.url_operations.iter().any(|o| o == operation) {
            let url = context.get("url").and_then(Value::as_str).unwrap_or("");
            return self.is_sensitive_url(url);
        }
        false
    }

    fn is_sensitive_url(&self, url: &str) -> bool {
        match extract_host(url) {
            Some(host) => self.sensitive_domains.iter().any(|d| domain_matches(&host, d)),
            None => false,
        }
    }

    /// 需要审批时创建 pending 记录并等待决策者；否则直接通过且不留记录
    pub async fn request_approval(
        &self,
        operation: &str,
        context: Value,
    ) -> Result<ApprovalOutcome, AgentError> {
        if !self.requires_approval(operation, &context) {
            return Ok(ApprovalOutcome {
                approved: true,
                approval_id: None,
                reason: None,
            });
        }

        let approval_id = uuid::Uuid::new_v4().to_string();
        let record = ApprovalRecord {
            approval_id: approval_id.clone(),
            operation: operation.to_string(),
            context,
            status: ApprovalStatus::Pending,
            created_at: Utc::now(),
            decided_at: None,
            reason: None,
        };
        self.lock().insert(approval_id.clone(), record.clone());
        tracing::warn!(operation = %operation, approval_id = %approval_id, "human approval required");

        let decision = self.decider.decide(&record).await;
        if decision.approved {
            self.approve(&approval_id, decision.reason.clone())?;
        } else {
            self.reject(&approval_id, decision.reason.clone())?;
        }
        Ok(ApprovalOutcome {
            approved: decision.approved,
            approval_id: Some(approval_id),
            reason: decision.reason,
        })
    }

    pub fn approve(&self, approval_id: &str, reason: Option<String>) -> Result<(), AgentError> {
        self.decide(approval_id, ApprovalStatus::Approved, reason)?;
        tracing::info!(approval_id = %approval_id, "approval granted");
        Ok(())
    }

    pub fn reject(&self, approval_id: &str, reason: Option<String>) -> Result<(), AgentError> {
        let shown = reason.clone().unwrap_or_default();
        self.decide(approval_id, ApprovalStatus::Rejected, reason)?;
        tracing::warn!(approval_id = %approval_id, reason = %shown, "approval rejected");
        Ok(())
    }

    fn decide(
        &self,
        approval_id: &str,
        status: ApprovalStatus,
        reason: Option<String>,
    ) -> Result<(), AgentError> {
        let mut records = self.lock();
        let record = records
            .get_mut(approval_id)
            .ok_or_else(|| AgentError::ApprovalNotFound(approval_id.to_string()))?;
        if record.status != ApprovalStatus::Pending {
            return Err(AgentError::ApprovalAlreadyDecided {
                id: approval_id.to_string(),
                status: record.status.as_str().to_string(),
            });
        }
        record.status = status;
        record.decided_at = Some(Utc::now());
        if reason.is_some() {
            record.reason = reason;
        }
        Ok(())
    }

    pub fn get_status(&self, approval_id: &str) -> Option<ApprovalStatus> {
        self.lock().get(approval_id).map(|r| r.status)
    }

    /// 所有审批记录（按创建时间排序）
    pub fn records(&self) -> Vec<ApprovalRecord> {
        let mut all: Vec<ApprovalRecord> = self.lock().values().cloned().collect();
        all.sort_by_key(|r| r.created_at);
        all
    }
}
