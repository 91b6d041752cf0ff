//! 编排器：启动流程与主控循环
//!
//! 负责：输出使命记忆、加载任务源、冻结动作注册表、启动后台循环，
//! 然后运行调度器直到关闭信号，最后等待后台循环退出。

use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::shutdown::{
    run_with_graceful_shutdown, ShutdownCoordinator, ShutdownManager, ShutdownReason,
};
use crate::core::{GhostBuilder, GhostError};
use crate::dispatch::Dispatcher;
use crate::memory::MissionMemory;
use crate::supervisor::{BackgroundSupervisor, SupervisorDrain};

/// 已完成启动、尚未运行主循环的 Agent
pub struct Ghost {
    dispatcher: Arc<Dispatcher>,
    supervisor: Arc<BackgroundSupervisor>,
    memory: Arc<MissionMemory>,
    shutdown: Arc<ShutdownManager>,
    shutdown_timeout_secs: u64,
}

/// 按配置完成启动：任何单个任务源失败都不会中止启动；
/// 只有无效配置，或 fail_fast_on_empty 且未加载到任何任务时返回错误
pub async fn create_ghost(config: AppConfig) -> Result<Ghost, GhostError> {
    let builder = GhostBuilder::new(config);
    let cfg = builder.config().clone();

    tracing::info!("{} initialized", cfg.app.name);
    let mission = builder.build_mission();

    let memory = builder.build_memory();
    if let Err(e) = memory.refresh().await {
        tracing::warn!("Initial mission memory refresh failed: {}", e);
    }
    let active = memory.snapshot().await;
    tracing::info!(
        "Mission memory active ({}):\n{}",
        if active.from_file { memory.path().display().to_string() } else { "config".to_string() },
        active.content
    );

    let store = builder.build_store();
    let report = store.reload().await;
    for failure in &report.failures {
        tracing::warn!("Task source not loaded: {}", failure);
    }
    // 空序列的警告已由 reload 输出
    if report.tasks.is_empty() {
        if cfg.dispatch.fail_fast_on_empty {
            return Err(GhostError::NoTasksLoaded);
        }
    } else {
        tracing::info!(
            "Loaded {} tasks from {} files ({} sources failed)",
            report.tasks.len(),
            report.files_loaded,
            report.failures.len()
        );
    }

    // 注册表在任何循环启动前冻结
    let registry = Arc::new(builder.build_registry(memory.clone()));
    tracing::info!("Registered task types: {}", registry.task_types().join(", "));
    let voice = builder.build_voice_bridge(&store)?;

    let dispatcher = Arc::new(Dispatcher::new(store, registry, mission, &cfg.dispatch));

    let shutdown = Arc::new(ShutdownManager::new());
    let supervisor = Arc::new(BackgroundSupervisor::new(shutdown.token(), &cfg.supervisor));
    supervisor.start(Arc::new(builder.build_self_heal(memory.clone())))?;
    supervisor.start(Arc::new(builder.build_memory_refresh(memory.clone())))?;
    if let Some(voice) = voice {
        supervisor.start(Arc::new(voice))?;
    }

    Ok(Ghost {
        dispatcher,
        supervisor,
        memory,
        shutdown,
        shutdown_timeout_secs: cfg.supervisor.shutdown_timeout_secs,
    })
}

impl Ghost {
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn supervisor(&self) -> &Arc<BackgroundSupervisor> {
        &self.supervisor
    }

    pub fn memory(&self) -> &Arc<MissionMemory> {
        &self.memory
    }

    pub fn shutdown_manager(&self) -> &Arc<ShutdownManager> {
        &self.shutdown
    }

    /// 运行调度主循环直到 Ctrl+C / SIGTERM，然后等待后台循环退出
    pub async fn run(self) -> ShutdownReason {
        let mut coordinator = ShutdownCoordinator::new(self.shutdown_timeout_secs);
        coordinator.register(SupervisorDrain::new(self.supervisor.clone()));

        let token = self.shutdown.token();
        let reason = run_with_graceful_shutdown(
            self.shutdown.clone(),
            self.dispatcher.run(token),
            coordinator,
        )
        .await;
        tracing::info!("Ghost stopped ({})", reason);
        reason
    }
}
