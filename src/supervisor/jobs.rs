//! 内置后台任务：自愈巡检与使命记忆刷新
//!
//! 两者都只操作各自的状态，不写任务存储。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::memory::MissionMemory;
use crate::supervisor::BackgroundJob;
use crate::tasks::store::resolve_source;

/// 自愈巡检：统计可达的任务源、检查使命记忆文件，并补建运行所需的目录
pub struct SelfHealJob {
    sources: Vec<String>,
    memory: Arc<MissionMemory>,
    required_dirs: Vec<PathBuf>,
    period: Duration,
}

impl SelfHealJob {
    pub fn new(
        sources: Vec<String>,
        memory: Arc<MissionMemory>,
        required_dirs: Vec<PathBuf>,
        period: Duration,
    ) -> Self {
        Self {
            sources,
            memory,
            required_dirs,
            period,
        }
    }
}

#[async_trait]
impl BackgroundJob for SelfHealJob {
    fn name(&self) -> &str {
        "self_heal"
    }

    fn period(&self) -> Duration {
        self.period
    }

    async fn tick(&self) -> anyhow::Result<()> {
        for dir in &self.required_dirs {
            if !dir.exists() {
                tokio::fs::create_dir_all(dir).await?;
                tracing::info!("Self-heal: recreated missing directory {}", dir.display());
            }
        }

        let reachable = self
            .sources
            .iter()
            .filter(|s| resolve_source(s).is_ok())
            .count();
        let memory_present = self.memory.path().is_file();

        tracing::info!(
            "Self-healing loop active: {}/{} task sources reachable, mission memory {}",
            reachable,
            self.sources.len(),
            if memory_present { "present" } else { "using config fallback" }
        );
        Ok(())
    }
}

/// 按自己的节奏重读使命记忆
pub struct MemoryRefreshJob {
    memory: Arc<MissionMemory>,
    period: Duration,
}

impl MemoryRefreshJob {
    pub fn new(memory: Arc<MissionMemory>, period: Duration) -> Self {
        Self { memory, period }
    }
}

#[async_trait]
impl BackgroundJob for MemoryRefreshJob {
    fn name(&self) -> &str {
        "memory_refresh"
    }

    fn period(&self) -> Duration {
        self.period
    }

    async fn tick(&self) -> anyhow::Result<()> {
        self.memory.refresh().await?;
        Ok(())
    }
}
