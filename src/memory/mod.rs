//! 使命记忆：磁盘上的 memory/mission.md，由 memory_refresh 后台循环与 freedom_protocol 任务重读
//!
//! 文件不存在时使用配置中的使命陈述作为内容；读取失败才视为错误（交给 Supervisor 退避重启）。

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default)]
pub struct MemorySnapshot {
    pub content: String,
    pub refreshed_at: Option<DateTime<Utc>>,
    pub refresh_count: u64,
    /// 内容是否来自磁盘文件（否则为配置回退）
    pub from_file: bool,
}

#[derive(Debug)]
pub struct MissionMemory {
    path: PathBuf,
    fallback: String,
    state: RwLock<MemorySnapshot>,
}

impl MissionMemory {
    pub fn new(path: impl AsRef<Path>, fallback: impl Into<String>) -> Self {
        let fallback = fallback.into();
        Self {
            path: path.as_ref().to_path_buf(),
            state: RwLock::new(MemorySnapshot {
                content: fallback.clone(),
                ..Default::default()
            }),
            fallback,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 重读记忆文件，返回内容是否发生变化
    pub async fn refresh(&self) -> anyhow::Result<bool> {
        let (content, from_file) = match tokio::fs::read_to_string(&self.path).await {
            Ok(s) => (s.trim().to_string(), true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (self.fallback.clone(), false),
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "failed to read mission memory {}: {}",
                    self.path.display(),
                    e
                ))
            }
        };

        let mut state = self.state.write().await;
        let changed = state.content != content;
        state.content = content;
        state.from_file = from_file;
        state.refreshed_at = Some(Utc::now());
        state.refresh_count += 1;

        if changed {
            tracing::info!(
                "Mission memory refreshed from {} ({} chars)",
                if from_file { "file" } else { "config" },
                state.content.len()
            );
        }
        Ok(changed)
    }

    pub async fn snapshot(&self) -> MemorySnapshot {
        self.state.read().await.clone()
    }
}
