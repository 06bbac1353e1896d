//! 检查点存储：会话状态快照与回滚
//!
//! 每个检查点一个 JSON 文件 `<state_dir>/<checkpoint_id>.json`，内容 {checkpoint_id, timestamp, state}。
//! id = checkpoint_<本地时间 YYYYmmdd_HHMMSS>_<uuid 前 8 位>，每次写入唯一，因此多个会话可共享同一目录。
//! 存储从不修改调用方的实时状态：rollback 只返回快照，由调用方替换。

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{AgentError, SessionState};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub checkpoint_id: String,
    pub timestamp: DateTime<Utc>,
    pub state: SessionState,
}

/// list_checkpoints 的条目（不含完整状态）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckpointInfo {
    pub checkpoint_id: String,
    pub timestamp: DateTime<Utc>,
    pub file: PathBuf,
}

#[derive(Deserialize)]
struct CheckpointHeader {
    checkpoint_id: String,
    timestamp: DateTime<Utc>,
}

pub struct CheckpointStore {
    state_dir: PathBuf,
    enabled: bool,
}

impl CheckpointStore {
    pub fn new(state_dir: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            state_dir: state_dir.into(),
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    /// id 只能是单个文件名
    fn path_for(&self, checkpoint_id: &str) -> Option<PathBuf> {
        if checkpoint_id.is_empty()
            || checkpoint_id.contains(['/', '\\'])
            || checkpoint_id.contains("..")
        {
            return None;
        }
        Some(self.state_dir.join(format!("{}.json", checkpoint_id)))
    }

    /// 保存状态快照；回滚关闭时返回 None 且不写文件
    pub fn create_checkpoint(&self, state: &SessionState) -> Result<Option<String>, AgentError> {
        if !self.enabled {
            return Ok(None);
        }
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let checkpoint_id = format!(
            "checkpoint_{}_{}",
            Local::now().format("%Y%m%d_%H%M%S"),
            &suffix[..8]
        );
        let checkpoint = Checkpoint {
            checkpoint_id: checkpoint_id.clone(),
            timestamp: Utc::now(),
            state: state.clone(),
        };
        let path = self
            .path_for(&checkpoint_id)
            .ok_or_else(|| AgentError::Checkpoint(format!("invalid checkpoint id: {}", checkpoint_id)))?;
        write_checkpoint(&self.state_dir, &path, &checkpoint).map_err(|e| {
            tracing::error!(error = %e, "failed to create checkpoint");
            AgentError::Checkpoint(e.to_string())
        })?;
        tracing::info!(checkpoint_id = %checkpoint_id, iteration = state.iteration(), "checkpoint created");
        Ok(Some(checkpoint_id))
    }

    /// 读取快照；文件不存在返回 None，文件损坏返回错误
    pub fn load_checkpoint(&self, checkpoint_id: &str) -> Result<Option<SessionState>, AgentError> {
        let Some(path) = self.path_for(checkpoint_id) else {
            tracing::warn!(checkpoint_id = %checkpoint_id, "checkpoint not found");
            return Ok(None);
        };
        if !path.exists() {
            tracing::warn!(checkpoint_id = %checkpoint_id, "checkpoint not found");
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path)
            .map_err(|e| AgentError::Checkpoint(format!("failed to read {}: {}", path.display(), e)))?;
        let checkpoint: Checkpoint = serde_json::from_str(&text)
            .map_err(|e| AgentError::Checkpoint(format!("failed to parse {}: {}", path.display(), e)))?;
        tracing::info!(checkpoint_id = %checkpoint_id, "checkpoint loaded");
        Ok(Some(checkpoint.state))
    }

    /// 与 load_checkpoint 相同；调用方负责用返回的状态替换实时状态
    pub fn rollback(&self, checkpoint_id: &str) -> Result<Option<SessionState>, AgentError> {
        tracing::warn!(checkpoint_id = %checkpoint_id, "rolling back to checkpoint");
        let state = self.load_checkpoint(checkpoint_id)?;
        match &state {
            Some(s) => tracing::info!(checkpoint_id = %checkpoint_id, iteration = s.iteration(), "rolled back"),
            None => tracing::error!(checkpoint_id = %checkpoint_id, "rollback failed: checkpoint missing"),
        }
        Ok(state)
    }

    /// 所有检查点，按时间戳从新到旧；无法解析的文件跳过
    pub fn list_checkpoints(&self) -> Result<Vec<CheckpointInfo>, AgentError> {
        let pattern = self.state_dir.join("checkpoint_*.json");
        let entries = glob::glob(&pattern.to_string_lossy())
            .map_err(|e| AgentError::Checkpoint(e.to_string()))?;
        let mut list = Vec::new();
        for path in entries.flatten() {
            let header = std::fs::read_to_string(&path)
                .ok()
                .and_then(|t| serde_json::from_str::<CheckpointHeader>(&t).ok());
            match header {
                Some(h) => list.push(CheckpointInfo {
                    checkpoint_id: h.checkpoint_id,
                    timestamp: h.timestamp,
                    file: path,
                }),
                None => tracing::debug!(path = %path.display(), "skipping unreadable checkpoint"),
            }
        }
        list.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(list)
    }

    /// 删除快照；不存在时返回 false
    pub fn delete_checkpoint(&self, checkpoint_id: &str) -> Result<bool, AgentError> {
        let Some(path) = self.path_for(checkpoint_id) else {
            return Ok(false);
        };
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path)
            .map_err(|e| AgentError::Checkpoint(format!("failed to delete {}: {}", checkpoint_id, e)))?;
        tracing::info!(checkpoint_id = %checkpoint_id, "checkpoint deleted");
        Ok(true)
    }
}

fn write_checkpoint(dir: &Path, path: &Path, checkpoint: &Checkpoint) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir)?;
    let text = serde_json::to_string_pretty(checkpoint)?;
    std::fs::write(path, text)?;
    Ok(())
}
