//! 调度器：前台主循环
//!
//! 每个周期按存储顺序遍历一次任务序列：解析 handler → （可选）价值观提醒 → 调用 handler。
//! 未知类型、失败、超时、panic 都只记录到本任务的结果里，然后继续下一个任务；
//! 周期之间按配置间隔休眠，收到关闭信号后在下一个任务边界或休眠点退出。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::actions::{ActionExecutor, ActionRegistry};
use crate::config::DispatchSection;
use crate::core::MissionRecord;
use crate::dispatch::{CycleReport, TaskOutcome, TaskStatus};
use crate::tasks::TaskStore;

pub struct Dispatcher {
    store: Arc<TaskStore>,
    registry: Arc<ActionRegistry>,
    executor: ActionExecutor,
    mission: Arc<MissionRecord>,
    interval: Duration,
    reload_each_cycle: bool,
    cycle: AtomicU64,
    last_report: RwLock<Option<CycleReport>>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<TaskStore>,
        registry: Arc<ActionRegistry>,
        mission: Arc<MissionRecord>,
        config: &DispatchSection,
    ) -> Self {
        Self {
            store,
            registry,
            executor: ActionExecutor::new(config.handler_timeout_secs)
                .with_retry(config.max_attempts, config.retry_backoff_ms),
            mission,
            interval: Duration::from_secs(config.cycle_interval_secs),
            reload_each_cycle: config.reload_each_cycle,
            cycle: AtomicU64::new(0),
            last_report: RwLock::new(None),
        }
    }

    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    pub async fn last_report(&self) -> Option<CycleReport> {
        self.last_report.read().await.clone()
    }

    /// 执行一个完整周期
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> CycleReport {
        let cycle = self.cycle.fetch_add(1, Ordering::Relaxed) + 1;
        let started_at = chrono::Utc::now();
        let start = Instant::now();

        // 第一个周期使用启动时已加载的序列
        let plan = self.store.next_cycle(self.reload_each_cycle && cycle > 1).await;
        tracing::debug!(
            "Cycle {} starting: {} persisted, {} injected",
            cycle,
            plan.persisted.len(),
            plan.injected.len()
        );

        let mut outcomes = Vec::with_capacity(plan.len());
        for (index, task) in plan.iter().enumerate() {
            let task_type = task.task_type();
            let injected = task.is_injected();

            if cancel.is_cancelled() {
                outcomes.push(TaskOutcome {
                    index,
                    task_type: task_type.to_string(),
                    injected,
                    advised: false,
                    status: TaskStatus::Cancelled,
                });
                continue;
            }

            let handler = match self.registry.resolve(task_type) {
                Ok(h) => h,
                Err(e) => {
                    tracing::warn!("[cycle {}] task #{} skipped: {}", cycle, index, e);
                    outcomes.push(TaskOutcome::from_error(index, task_type, injected, false, &e));
                    continue;
                }
            };

            let advised = task.values_suggestion();
            if advised {
                tracing::info!("[cycle {}] {} before '{}'", cycle, self.mission.advisory(), task_type);
            }

            let outcome = match self.executor.invoke_with_retry(&handler, task, cancel).await {
                Ok(()) => TaskOutcome {
                    index,
                    task_type: task_type.to_string(),
                    injected,
                    advised,
                    status: TaskStatus::Succeeded,
                },
                Err(e) => {
                    tracing::error!("[cycle {}] task #{} ('{}') failed: {}", cycle, index, task_type, e);
                    TaskOutcome::from_error(index, task_type, injected, advised, &e)
                }
            };
            outcomes.push(outcome);
        }

        let report = CycleReport {
            cycle,
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
            outcomes,
        };
        tracing::info!(
            "Cycle {} complete: {} processed, {} ok, {} failed, {} unknown ({}ms)",
            report.cycle,
            report.processed(),
            report.succeeded(),
            report.failures().len(),
            report.unknown(),
            report.duration_ms
        );
        *self.last_report.write().await = Some(report.clone());
        report
    }

    /// 主循环：直到取消
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            "Dispatcher started (interval {}s, reload each cycle: {})",
            self.interval.as_secs(),
            self.reload_each_cycle
        );
        while !cancel.is_cancelled() {
            self.run_cycle(&cancel).await;

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
        tracing::info!("Dispatcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::Map;

    use crate::actions::{ActionHandler, ActionOutcome};
    use crate::tasks::{TaskDescriptor, TaskOrigin};

    /// 记录调用顺序；payload 中 fail=true 时返回失败
    struct Recorder {
        calls: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl ActionHandler for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        async fn execute(&self, task: &TaskDescriptor) -> ActionOutcome {
            let label = task.payload_str("label").unwrap_or(task.task_type()).to_string();
            self.calls.lock().unwrap().push(label);
            if task.payload().get("fail").and_then(|v| v.as_bool()) == Some(true) {
                ActionOutcome::failure("requested failure")
            } else {
                ActionOutcome::Success
            }
        }
    }

    fn task(task_type: &str, label: &str, fail: bool) -> TaskDescriptor {
        let mut payload = Map::new();
        payload.insert("label".into(), label.into());
        payload.insert("fail".into(), fail.into());
        TaskDescriptor::new(task_type, payload, TaskOrigin::Persisted { source: "test".into() })
    }

    fn dispatcher(types: &[&str]) -> (Dispatcher, Arc<Mutex<Vec<String>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let recorder: Arc<dyn ActionHandler> = Arc::new(Recorder { calls: calls.clone() });
        let mut registry = ActionRegistry::new();
        for t in types {
            registry.register_arc(t, recorder.clone());
        }
        let config = DispatchSection {
            cycle_interval_secs: 0,
            reload_each_cycle: false,
            ..Default::default()
        };
        let d = Dispatcher::new(
            Arc::new(TaskStore::new(vec![])),
            Arc::new(registry),
            Arc::new(MissionRecord::new("m", vec!["v".into()])),
            &config,
        );
        (d, calls)
    }

    #[tokio::test]
    async fn test_single_failure_is_isolated() {
        let (d, calls) = dispatcher(&["job"]);
        d.store()
            .replace(vec![
                task("job", "a", false),
                task("job", "b", true),
                task("job", "c", false),
                task("job", "d", false),
            ])
            .await;

        let report = d.run_cycle(&CancellationToken::new()).await;

        assert_eq!(report.processed(), 4);
        assert_eq!(report.succeeded(), 3);
        let failures = report.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].index, 1);
        assert_eq!(failures[0].task_type, "job");
        assert_eq!(*calls.lock().unwrap(), vec!["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn test_unknown_type_is_counted_and_skipped() {
        let (d, calls) = dispatcher(&["known"]);
        d.store()
            .replace(vec![task("known", "a", false), task("mystery", "b", false), task("known", "c", false)])
            .await;

        let report = d.run_cycle(&CancellationToken::new()).await;

        assert_eq!(report.processed(), 3);
        assert_eq!(report.unknown(), 1);
        assert_eq!(report.outcomes[1].status, TaskStatus::UnknownType);
        assert!(!report.outcomes[1].advised);
        assert_eq!(*calls.lock().unwrap(), vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_order_is_stable_across_cycles() {
        let (d, calls) = dispatcher(&["job"]);
        d.store()
            .replace(vec![task("job", "A", false), task("job", "B", false), task("job", "C", false)])
            .await;

        let token = CancellationToken::new();
        d.run_cycle(&token).await;
        d.run_cycle(&token).await;

        assert_eq!(*calls.lock().unwrap(), vec!["A", "B", "C", "A", "B", "C"]);
        assert_eq!(d.last_report().await.unwrap().cycle, 2);
    }

    #[tokio::test]
    async fn test_advisory_follows_values_suggestion() {
        let (d, _) = dispatcher(&["job"]);
        d.store()
            .replace(vec![
                task("job", "default", false),
                task("job", "quiet", false).with_values_suggestion(false),
            ])
            .await;

        let report = d.run_cycle(&CancellationToken::new()).await;
        assert!(report.outcomes[0].advised);
        assert!(!report.outcomes[1].advised);
    }

    #[tokio::test]
    async fn test_cancelled_before_cycle_marks_every_task() {
        let (d, calls) = dispatcher(&["job"]);
        d.store().replace(vec![task("job", "a", false), task("job", "b", false)]).await;

        let token = CancellationToken::new();
        token.cancel();
        let report = d.run_cycle(&token).await;

        assert_eq!(report.processed(), 2);
        assert!(report.was_cancelled());
        assert!(calls.lock().unwrap().is_empty());
    }

    fn reloading_dispatcher(path: &std::path::Path, types: &[&str]) -> (Dispatcher, Arc<Mutex<Vec<String>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let recorder: Arc<dyn ActionHandler> = Arc::new(Recorder { calls: calls.clone() });
        let mut registry = ActionRegistry::new();
        for t in types {
            registry.register_arc(t, recorder.clone());
        }
        let config = DispatchSection {
            cycle_interval_secs: 0,
            reload_each_cycle: true,
            ..Default::default()
        };
        let d = Dispatcher::new(
            Arc::new(TaskStore::new(vec![path.to_string_lossy().to_string()])),
            Arc::new(registry),
            Arc::new(MissionRecord::new("m", vec!["v".into()])),
            &config,
        );
        (d, calls)
    }

    #[tokio::test]
    async fn test_reload_each_cycle_picks_up_edited_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tasks.json");
        std::fs::write(&path, r#"[{"type":"stock"}]"#).unwrap();
        let (d, calls) = reloading_dispatcher(&path, &["stock", "blog"]);
        d.store().reload().await;

        // 第一个周期用启动时的序列，即使文件已被改写
        std::fs::write(&path, r#"[{"type":"blog"},{"type":"stock"}]"#).unwrap();
        let token = CancellationToken::new();
        let first = d.run_cycle(&token).await;
        assert_eq!(first.processed(), 1);

        let second = d.run_cycle(&token).await;
        assert_eq!(second.processed(), 2);
        assert_eq!(*calls.lock().unwrap(), vec!["stock", "blog", "stock"]);
    }

    #[tokio::test]
    async fn test_deleted_task_file_stops_running_its_tasks() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tasks.json");
        std::fs::write(&path, r#"[{"type":"stock"}]"#).unwrap();
        let (d, calls) = reloading_dispatcher(&path, &["stock"]);
        d.store().reload().await;

        let token = CancellationToken::new();
        assert_eq!(d.run_cycle(&token).await.processed(), 1);

        std::fs::remove_file(&path).unwrap();
        assert_eq!(d.run_cycle(&token).await.processed(), 0);
        assert_eq!(d.run_cycle(&token).await.processed(), 0);
        assert_eq!(*calls.lock().unwrap(), vec!["stock"]);
    }

    #[tokio::test]
    async fn test_run_exits_on_cancel() {
        let (d, _) = dispatcher(&["job"]);
        let d = Arc::new(d);
        let token = CancellationToken::new();
        let handle = {
            let d = d.clone();
            let token = token.clone();
            tokio::spawn(async move { d.run(token).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("dispatcher should stop promptly")
            .unwrap();
    }
}
