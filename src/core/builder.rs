//! 构建器：从 AppConfig 创建各组件
//!
//! 所有依赖配置的组件都在这里构造，再显式注入到 Dispatcher / Supervisor；
//! 外部协作方的端点与凭据也在注册表构造时注入。

use std::sync::Arc;
use std::time::Duration;

use crate::actions::{
    ActionHandler, ActionRegistry, BurnerAccountLog, MemoryRefreshAction, UnconfiguredAction,
    WebhookAction, BURNER_ACCOUNT_TASK_TYPE, MEMORY_REFRESH_TASK_TYPES, WEBHOOK_TASK_TYPES,
};
use crate::config::AppConfig;
use crate::core::{GhostError, MissionRecord};
use crate::memory::MissionMemory;
use crate::supervisor::{MemoryRefreshJob, SelfHealJob};
use crate::tasks::TaskStore;
use crate::voice::{CommandMatcher, SpoolDirectory, VoiceBridge};

pub struct GhostBuilder {
    config: AppConfig,
}

impl GhostBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn build_mission(&self) -> Arc<MissionRecord> {
        Arc::new(MissionRecord::from_config(&self.config.mission))
    }

    pub fn build_memory(&self) -> Arc<MissionMemory> {
        Arc::new(MissionMemory::new(
            &self.config.memory.path,
            self.config.mission.statement.trim(),
        ))
    }

    pub fn build_store(&self) -> Arc<TaskStore> {
        Arc::new(TaskStore::new(self.config.tasks.sources.clone()))
    }

    /// 构建动作注册表：内置类型 + 配置里额外声明的端点
    pub fn build_registry(&self, memory: Arc<MissionMemory>) -> ActionRegistry {
        let integrations = &self.config.integrations;
        let mut registry = ActionRegistry::new();

        for task_type in WEBHOOK_TASK_TYPES {
            match integrations.endpoints.get(*task_type) {
                Some(entry) => registry.register_arc(
                    task_type,
                    endpoint_handler(
                        task_type,
                        WebhookAction::from_entry(task_type, entry, integrations.request_timeout_secs),
                    ),
                ),
                None => registry.register(task_type, UnconfiguredAction::new(task_type)),
            }
        }

        // 额外端点：任意新类型只需在配置中声明即可接入
        for (task_type, entry) in &integrations.endpoints {
            if !registry.contains(task_type) {
                registry.register_arc(
                    task_type,
                    endpoint_handler(
                        task_type,
                        WebhookAction::from_entry(task_type, entry, integrations.request_timeout_secs),
                    ),
                );
            }
        }

        registry.register(
            BURNER_ACCOUNT_TASK_TYPE,
            BurnerAccountLog::new(&integrations.burner_log_path, self.config.accounts.clone()),
        );

        let refresh: Arc<dyn ActionHandler> = Arc::new(MemoryRefreshAction::new(memory));
        for task_type in MEMORY_REFRESH_TASK_TYPES {
            registry.register_arc(task_type, refresh.clone());
        }

        registry
    }

    pub fn build_self_heal(&self, memory: Arc<MissionMemory>) -> SelfHealJob {
        let mut required_dirs = Vec::new();
        if self.config.voice.enabled {
            required_dirs.push(self.config.voice.spool_dir.clone());
        }
        if let Some(parent) = self.config.integrations.burner_log_path.parent() {
            if !parent.as_os_str().is_empty() {
                required_dirs.push(parent.to_path_buf());
            }
        }
        SelfHealJob::new(
            self.config.tasks.sources.clone(),
            memory,
            required_dirs,
            Duration::from_secs(self.config.supervisor.self_heal_interval_secs),
        )
    }

    pub fn build_memory_refresh(&self, memory: Arc<MissionMemory>) -> MemoryRefreshJob {
        MemoryRefreshJob::new(
            memory,
            Duration::from_secs(self.config.supervisor.memory_refresh_interval_secs),
        )
    }

    /// 语音桥（未启用时返回 None）；指令正则无效属于配置错误
    pub fn build_voice_bridge(&self, store: &TaskStore) -> Result<Option<VoiceBridge>, GhostError> {
        let voice = &self.config.voice;
        if !voice.enabled {
            return Ok(None);
        }
        let matcher = CommandMatcher::new(&voice.commands)?;
        if matcher.is_empty() {
            tracing::warn!("Voice bridge enabled without commands; transcripts will only be logged");
        }
        let spool = Arc::new(SpoolDirectory::new(&voice.spool_dir));
        Ok(Some(
            VoiceBridge::new(spool.clone(), spool, matcher, store.injector()).with_timing(
                Duration::from_millis(voice.poll_interval_ms),
                Duration::from_millis(voice.cooldown_ms),
            ),
        ))
    }
}

/// 端点协作方构建失败时注册一个报告该错误的占位 handler，启动继续
fn endpoint_handler(task_type: &str, built: anyhow::Result<WebhookAction>) -> Arc<dyn ActionHandler> {
    match built {
        Ok(action) => Arc::new(action),
        Err(e) => {
            tracing::error!("Endpoint for '{}' unavailable: {}", task_type, e);
            Arc::new(UnconfiguredAction::with_reason(task_type, e.to_string()))
        }
    }
}
