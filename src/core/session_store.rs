//! 会话 id 持久化
//!
//! 记住已创建的 Assistant 与 Thread id，跨进程复用同一会话，避免每次启动都重新创建。

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::AgentError;

/// 已知的远程资源 id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionIds {
    #[serde(default)]
    pub assistant_id: Option<String>,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl SessionIds {
    pub fn is_empty(&self) -> bool {
        self.assistant_id.is_none() && self.thread_id.is_none()
    }
}

/// 会话 id 存储
pub trait SessionStore: Send + Sync {
    fn load(&self) -> Result<SessionIds, AgentError>;
    fn save(&self, ids: &SessionIds) -> Result<(), AgentError>;
    fn clear(&self) -> Result<(), AgentError>;
}

/// 进程内存储（测试与一次性运行）
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    ids: Mutex<SessionIds>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ids(ids: SessionIds) -> Self {
        Self {
            ids: Mutex::new(ids),
        }
    }
}

impl SessionStore for InMemorySessionStore {
    fn load(&self) -> Result<SessionIds, AgentError> {
        self.ids
            .lock()
            .map(|ids| ids.clone())
            .map_err(|e| AgentError::StoreError(e.to_string()))
    }

    fn save(&self, ids: &SessionIds) -> Result<(), AgentError> {
        let mut guard = self
            .ids
            .lock()
            .map_err(|e| AgentError::StoreError(e.to_string()))?;
        *guard = ids.clone();
        Ok(())
    }

    fn clear(&self) -> Result<(), AgentError> {
        self.save(&SessionIds::default())
    }
}

/// 单文件 JSON 存储；文件不存在时视为空会话
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn store_err(path: &Path, e: impl std::fmt::Display) -> AgentError {
    AgentError::StoreError(format!("{}: {}", path.display(), e))
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<SessionIds, AgentError> {
        if !self.path.exists() {
            return Ok(SessionIds::default());
        }
        let data = std::fs::read_to_string(&self.path).map_err(|e| store_err(&self.path, e))?;
        if data.trim().is_empty() {
            return Ok(SessionIds::default());
        }
        serde_json::from_str(&data).map_err(|e| store_err(&self.path, e))
    }

    fn save(&self, ids: &SessionIds) -> Result<(), AgentError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| store_err(parent, e))?;
            }
        }
        let json = serde_json::to_string_pretty(ids).map_err(|e| store_err(&self.path, e))?;
        std::fs::write(&self.path, json).map_err(|e| store_err(&self.path, e))?;
        tracing::debug!(path = %self.path.display(), "session ids saved");
        Ok(())
    }

    fn clear(&self) -> Result<(), AgentError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(store_err(&self.path, e)),
        }
    }
}
