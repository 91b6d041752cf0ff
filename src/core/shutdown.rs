//! 优雅关闭
//!
//! Ctrl+C / SIGTERM / 调度器自行结束都收敛到同一个 CancellationToken；
//! 第一个触发的原因被记录下来，供主流程在退出时输出。
//! token 取消后，ShutdownCoordinator 依次执行清理任务，每个任务受同一超时约束。

use std::fmt;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Ctrl+C
    UserInitiated,
    /// SIGTERM
    Signal,
    /// 调度主循环在没有关闭信号的情况下结束
    DispatcherExited,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ShutdownReason::UserInitiated => "Ctrl+C",
            ShutdownReason::Signal => "SIGTERM",
            ShutdownReason::DispatcherExited => "dispatcher exited",
        };
        f.write_str(s)
    }
}

/// 关闭信号：共享 token + 首个关闭原因
pub struct ShutdownManager {
    token: CancellationToken,
    reason: OnceLock<ShutdownReason>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            reason: OnceLock::new(),
        }
    }

    /// 调度器与后台循环共享的 token（后台循环各自再派生子 token）
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// 触发关闭；重复调用只保留第一次的原因
    pub fn shutdown(&self, reason: ShutdownReason) {
        if self.reason.set(reason).is_ok() {
            tracing::info!("Shutdown requested ({})", reason);
        }
        self.token.cancel();
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        self.reason.get().copied()
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn install_signal_handlers(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                manager.shutdown(ShutdownReason::UserInitiated);
            }
        });

        #[cfg(unix)]
        {
            let manager = Arc::clone(self);
            tokio::spawn(async move {
                use tokio::signal::unix::{signal, SignalKind};
                match signal(SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        sigterm.recv().await;
                        manager.shutdown(ShutdownReason::Signal);
                    }
                    Err(e) => tracing::warn!("SIGTERM handler not installed: {}", e),
                }
            });
        }
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

/// 关闭阶段的清理任务
#[async_trait::async_trait]
pub trait ShutdownCleanup: Send + Sync {
    async fn cleanup(&self) -> anyhow::Result<()>;

    fn name(&self) -> &'static str;
}

/// 按注册顺序执行清理；超时的任务被放弃，不阻塞后续任务
pub struct ShutdownCoordinator {
    cleanups: Vec<Arc<dyn ShutdownCleanup>>,
    timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            cleanups: Vec::new(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn register<T: ShutdownCleanup + 'static>(&mut self, task: T) {
        self.cleanups.push(Arc::new(task));
    }

    pub async fn run_cleanup(&self) {
        for task in &self.cleanups {
            match tokio::time::timeout(self.timeout, task.cleanup()).await {
                Ok(Ok(())) => tracing::info!("Cleanup '{}' done", task.name()),
                Ok(Err(e)) => tracing::warn!("Cleanup '{}' failed: {}", task.name(), e),
                Err(_) => tracing::warn!(
                    "Cleanup '{}' abandoned after {}s",
                    task.name(),
                    self.timeout.as_secs()
                ),
            }
        }
    }
}

/// 运行主循环直到其结束或收到关闭信号，然后取消 token 并执行清理；返回关闭原因
pub async fn run_with_graceful_shutdown<Fut>(
    manager: Arc<ShutdownManager>,
    app: Fut,
    coordinator: ShutdownCoordinator,
) -> ShutdownReason
where
    Fut: Future<Output = ()>,
{
    manager.install_signal_handlers();

    tokio::select! {
        _ = app => {}
        _ = manager.token.cancelled() => {}
    }

    manager.shutdown(ShutdownReason::DispatcherExited);
    coordinator.run_cleanup().await;
    manager.reason().unwrap_or(ShutdownReason::DispatcherExited)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_first_reason_wins() {
        let manager = ShutdownManager::new();
        let token = manager.token();
        assert_eq!(manager.reason(), None);

        manager.shutdown(ShutdownReason::Signal);
        manager.shutdown(ShutdownReason::UserInitiated);

        assert!(token.is_cancelled());
        assert!(manager.is_shutdown());
        assert_eq!(manager.reason(), Some(ShutdownReason::Signal));
    }

    struct Flag(Arc<AtomicBool>);

    #[async_trait::async_trait]
    impl ShutdownCleanup for Flag {
        async fn cleanup(&self) -> anyhow::Result<()> {
            self.0.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn name(&self) -> &'static str {
            "flag"
        }
    }

    struct Hangs;

    #[async_trait::async_trait]
    impl ShutdownCleanup for Hangs {
        async fn cleanup(&self) -> anyhow::Result<()> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }

        fn name(&self) -> &'static str {
            "hangs"
        }
    }

    #[tokio::test]
    async fn test_hanging_cleanup_does_not_block_later_ones() {
        let mut coordinator = ShutdownCoordinator::new(0);
        let called = Arc::new(AtomicBool::new(false));
        coordinator.register(Hangs);
        coordinator.register(Flag(called.clone()));

        coordinator.run_cleanup().await;
        assert!(called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_app_exit_cancels_token_and_reports_reason() {
        let manager = Arc::new(ShutdownManager::new());
        let token = manager.token();
        let cleaned = Arc::new(AtomicBool::new(false));
        let mut coordinator = ShutdownCoordinator::new(1);
        coordinator.register(Flag(cleaned.clone()));

        let reason = run_with_graceful_shutdown(manager, async {}, coordinator).await;

        assert_eq!(reason, ShutdownReason::DispatcherExited);
        assert!(token.is_cancelled());
        assert!(cleaned.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_requested_reason_survives_cleanup() {
        let manager = Arc::new(ShutdownManager::new());
        manager.shutdown(ShutdownReason::UserInitiated);

        let reason =
            run_with_graceful_shutdown(manager, std::future::pending::<()>(), ShutdownCoordinator::new(1)).await;
        assert_eq!(reason, ShutdownReason::UserInitiated);
    }
}
