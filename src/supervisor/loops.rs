//! 后台循环监管
//!
//! 每个 BackgroundJob 在进程启动时只启动一次，按自己的周期执行 tick。
//! tick 返回错误或 panic 时记为 BackgroundLoopFailure，按指数退避等待后重启该循环，
//! 不影响调度器与其他循环；成功一次即重置退避。所有循环共享关闭 token 的子 token。

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::SupervisorSection;
use crate::core::shutdown::ShutdownCleanup;
use crate::core::GhostError;
use crate::supervisor::Backoff;

/// 后台任务：名称、周期与单次执行体
#[async_trait]
pub trait BackgroundJob: Send + Sync {
    fn name(&self) -> &str;

    /// 两次 tick 之间的间隔
    fn period(&self) -> Duration;

    async fn tick(&self) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    BackingOff,
    Stopped,
}

impl LoopState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => LoopState::Running,
            1 => LoopState::BackingOff,
            _ => LoopState::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            LoopState::Running => 0,
            LoopState::BackingOff => 1,
            LoopState::Stopped => 2,
        }
    }
}

#[derive(Debug, Default)]
struct LoopStats {
    state: AtomicU8,
    ticks: AtomicU64,
    failures: AtomicU64,
}

impl LoopStats {
    fn set_state(&self, state: LoopState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }
}

/// 某个循环的状态快照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopStatus {
    pub name: String,
    pub state: LoopState,
    pub ticks: u64,
    /// 失败（即重启）次数
    pub failures: u64,
}

/// 一个受监管的循环
pub struct LoopHandle {
    name: String,
    stats: Arc<LoopStats>,
    cancel: CancellationToken,
    join: Option<JoinHandle<()>>,
}

impl LoopHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> LoopStatus {
        LoopStatus {
            name: self.name.clone(),
            state: LoopState::from_u8(self.stats.state.load(Ordering::SeqCst)),
            ticks: self.stats.ticks.load(Ordering::SeqCst),
            failures: self.stats.failures.load(Ordering::SeqCst),
        }
    }
}

pub struct BackgroundSupervisor {
    token: CancellationToken,
    backoff_initial: Duration,
    backoff_max: Duration,
    loops: Mutex<Vec<LoopHandle>>,
}

impl BackgroundSupervisor {
    pub fn new(token: CancellationToken, config: &SupervisorSection) -> Self {
        Self {
            token,
            backoff_initial: Duration::from_millis(config.backoff_initial_ms),
            backoff_max: Duration::from_millis(config.backoff_max_ms),
            loops: Mutex::new(Vec::new()),
        }
    }

    /// 启动一个循环；同名循环只能启动一次
    pub fn start(&self, job: Arc<dyn BackgroundJob>) -> Result<(), GhostError> {
        let name = job.name().to_string();
        let mut loops = self.loops.lock().unwrap_or_else(|e| e.into_inner());
        if loops.iter().any(|h| h.name == name) {
            return Err(GhostError::DuplicateLoop(name));
        }

        let stats = Arc::new(LoopStats::default());
        let cancel = self.token.child_token();
        let backoff = Backoff::new(self.backoff_initial, self.backoff_max);
        let join = tokio::spawn(supervise(job, stats.clone(), cancel.clone(), backoff));

        tracing::info!("Background loop '{}' started", name);
        loops.push(LoopHandle {
            name,
            stats,
            cancel,
            join: Some(join),
        });
        Ok(())
    }

    /// 单独停止某个循环
    pub fn stop(&self, name: &str) -> bool {
        let loops = self.loops.lock().unwrap_or_else(|e| e.into_inner());
        match loops.iter().find(|h| h.name == name) {
            Some(handle) => {
                handle.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn statuses(&self) -> Vec<LoopStatus> {
        let loops = self.loops.lock().unwrap_or_else(|e| e.into_inner());
        loops.iter().map(LoopHandle::status).collect()
    }

    /// 等待所有循环退出（需先触发关闭 token）
    pub async fn join_all(&self) {
        let joins: Vec<(String, JoinHandle<()>)> = {
            let mut loops = self.loops.lock().unwrap_or_else(|e| e.into_inner());
            loops
                .iter_mut()
                .filter_map(|h| h.join.take().map(|j| (h.name.clone(), j)))
                .collect()
        };
        for (name, join) in joins {
            if let Err(e) = join.await {
                tracing::warn!("Background loop '{}' ended abnormally: {}", name, e);
            }
        }
    }
}

async fn supervise(
    job: Arc<dyn BackgroundJob>,
    stats: Arc<LoopStats>,
    cancel: CancellationToken,
    mut backoff: Backoff,
) {
    let name = job.name().to_string();
    stats.set_state(LoopState::Running);

    while !cancel.is_cancelled() {
        // tick 内部的等待（如语音冷却）也要在关闭时立即放弃
        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            r = AssertUnwindSafe(job.tick()).catch_unwind() => r,
        };
        stats.ticks.fetch_add(1, Ordering::SeqCst);

        let delay = match result {
            Ok(Ok(())) => {
                backoff.reset();
                stats.set_state(LoopState::Running);
                job.period()
            }
            Ok(Err(e)) => failure_delay(&name, e.to_string(), &stats, &mut backoff),
            Err(_) => failure_delay(&name, "loop body panicked".to_string(), &stats, &mut backoff),
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    stats.set_state(LoopState::Stopped);
    tracing::info!("Background loop '{}' stopped", name);
}

fn failure_delay(name: &str, reason: String, stats: &LoopStats, backoff: &mut Backoff) -> Duration {
    let err = GhostError::BackgroundLoopFailure {
        name: name.to_string(),
        reason,
    };
    stats.failures.fetch_add(1, Ordering::SeqCst);
    stats.set_state(LoopState::BackingOff);
    let delay = backoff.next_delay();
    tracing::error!("{}; restarting in {}ms", err, delay.as_millis());
    delay
}

/// 关闭时等待所有后台循环退出
pub struct SupervisorDrain {
    supervisor: Arc<BackgroundSupervisor>,
}

impl SupervisorDrain {
    pub fn new(supervisor: Arc<BackgroundSupervisor>) -> Self {
        Self { supervisor }
    }
}

#[async_trait]
impl ShutdownCleanup for SupervisorDrain {
    async fn cleanup(&self) -> anyhow::Result<()> {
        self.supervisor.join_all().await;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "BackgroundLoops"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    struct Counting {
        name: &'static str,
        ticks: Arc<AtomicU32>,
        /// 前 n 次 tick 失败（奇数次失败返回 Err，偶数次 panic）
        fail_first: u32,
    }

    #[async_trait]
    impl BackgroundJob for Counting {
        fn name(&self) -> &str {
            self.name
        }

        fn period(&self) -> Duration {
            Duration::from_millis(5)
        }

        async fn tick(&self) -> anyhow::Result<()> {
            let n = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.fail_first {
                if n % 2 == 0 {
                    panic!("tick {} panicked", n);
                }
                anyhow::bail!("tick {} failed", n);
            }
            Ok(())
        }
    }

    fn config() -> SupervisorSection {
        SupervisorSection {
            backoff_initial_ms: 1,
            backoff_max_ms: 4,
            ..Default::default()
        }
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_failing_loop_restarts_with_backoff() {
        let token = CancellationToken::new();
        let supervisor = BackgroundSupervisor::new(token.clone(), &config());
        let ticks = Arc::new(AtomicU32::new(0));
        supervisor
            .start(Arc::new(Counting {
                name: "flaky",
                ticks: ticks.clone(),
                fail_first: 3,
            }))
            .unwrap();

        wait_until(|| ticks.load(Ordering::SeqCst) >= 5).await;
        let status = &supervisor.statuses()[0];
        assert_eq!(status.name, "flaky");
        assert_eq!(status.failures, 3);
        assert_eq!(status.state, LoopState::Running);

        token.cancel();
        supervisor.join_all().await;
        assert_eq!(supervisor.statuses()[0].state, LoopState::Stopped);
    }

    #[tokio::test]
    async fn test_failure_in_one_loop_does_not_stop_another() {
        let token = CancellationToken::new();
        let supervisor = BackgroundSupervisor::new(token.clone(), &config());
        let bad = Arc::new(AtomicU32::new(0));
        let good = Arc::new(AtomicU32::new(0));
        supervisor
            .start(Arc::new(Counting {
                name: "bad",
                ticks: bad.clone(),
                fail_first: u32::MAX,
            }))
            .unwrap();
        supervisor
            .start(Arc::new(Counting {
                name: "good",
                ticks: good.clone(),
                fail_first: 0,
            }))
            .unwrap();

        wait_until(|| good.load(Ordering::SeqCst) >= 5 && bad.load(Ordering::SeqCst) >= 3).await;

        token.cancel();
        supervisor.join_all().await;
    }

    struct Stuck {
        entered: Arc<AtomicU32>,
    }

    #[async_trait]
    impl BackgroundJob for Stuck {
        fn name(&self) -> &str {
            "stuck"
        }

        fn period(&self) -> Duration {
            Duration::from_millis(5)
        }

        async fn tick(&self) -> anyhow::Result<()> {
            self.entered.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_cancel_interrupts_long_tick() {
        let token = CancellationToken::new();
        let supervisor = BackgroundSupervisor::new(token.clone(), &config());
        let entered = Arc::new(AtomicU32::new(0));
        supervisor
            .start(Arc::new(Stuck {
                entered: entered.clone(),
            }))
            .unwrap();

        wait_until(|| entered.load(Ordering::SeqCst) == 1).await;
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), supervisor.join_all())
            .await
            .expect("loop should stop without finishing its tick");

        let status = &supervisor.statuses()[0];
        assert_eq!(status.state, LoopState::Stopped);
        assert_eq!(status.ticks, 0);
    }

    #[tokio::test]
    async fn test_duplicate_loop_rejected() {
        let supervisor = BackgroundSupervisor::new(CancellationToken::new(), &config());
        let job = || {
            Arc::new(Counting {
                name: "self_heal",
                ticks: Arc::new(AtomicU32::new(0)),
                fail_first: 0,
            })
        };
        supervisor.start(job()).unwrap();
        assert_eq!(
            supervisor.start(job()).unwrap_err(),
            GhostError::DuplicateLoop("self_heal".into())
        );
        assert!(supervisor.stop("self_heal"));
        assert!(!supervisor.stop("missing"));
        supervisor.join_all().await;
    }
}
