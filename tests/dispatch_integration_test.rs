//! 调度集成测试：任务文件 → 注册表 → 调度周期 → 语音注入

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ghost::actions::{ActionHandler, ActionOutcome, ActionRegistry};
use ghost::config::{DispatchSection, VoiceCommandEntry};
use ghost::core::MissionRecord;
use ghost::dispatch::{Dispatcher, TaskStatus};
use ghost::tasks::{TaskDescriptor, TaskStore};
use ghost::voice::{CommandMatcher, Transcriber, VoiceBridge, WakeDetector};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

type Calls = Arc<Mutex<Vec<String>>>;

struct Recording {
    calls: Calls,
}

#[async_trait]
impl ActionHandler for Recording {
    fn name(&self) -> &str {
        "recording"
    }

    async fn execute(&self, task: &TaskDescriptor) -> ActionOutcome {
        self.calls.lock().unwrap().push(task.task_type().to_string());
        ActionOutcome::Success
    }
}

/// 第一次执行时把任务序列整体替换掉，用来模拟周期中途的重载
struct ReplacesStore {
    store: Arc<TaskStore>,
    calls: Calls,
}

#[async_trait]
impl ActionHandler for ReplacesStore {
    fn name(&self) -> &str {
        "replaces_store"
    }

    async fn execute(&self, task: &TaskDescriptor) -> ActionOutcome {
        self.calls.lock().unwrap().push(task.task_type().to_string());
        let replacement = ghost::tasks::parse_tasks(r#"[{"type":"stock"}]"#, "reload", false).unwrap();
        self.store.replace(replacement).await;
        ActionOutcome::Success
    }
}

fn dispatch_config() -> DispatchSection {
    DispatchSection {
        cycle_interval_secs: 0,
        reload_each_cycle: false,
        ..Default::default()
    }
}

fn mission() -> Arc<MissionRecord> {
    Arc::new(MissionRecord::new("mission", vec!["Autonomy".into()]))
}

#[tokio::test]
async fn test_end_to_end_unknown_type_does_not_stop_cycle() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tasks.json");
    std::fs::write(
        &path,
        r#"[
            {"type": "social_media", "payload": {"content": "hello"}},
            {"type": "unknown_x"},
            {"type": "stock", "payload": {"ticker": "ACME", "qty": 1}}
        ]"#,
    )
    .unwrap();

    let store = Arc::new(TaskStore::new(vec![path.to_string_lossy().to_string()]));
    let report = store.reload().await;
    assert!(report.failures.is_empty());

    let calls: Calls = Arc::new(Mutex::new(Vec::new()));
    let mut registry = ActionRegistry::new();
    registry.register("social_media", Recording { calls: calls.clone() });
    registry.register("stock", Recording { calls: calls.clone() });

    let dispatcher = Dispatcher::new(store, Arc::new(registry), mission(), &dispatch_config());
    let report = dispatcher.run_cycle(&CancellationToken::new()).await;

    assert_eq!(*calls.lock().unwrap(), vec!["social_media", "stock"]);
    assert_eq!(report.processed(), 3);
    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.outcomes[1].task_type, "unknown_x");
    assert_eq!(report.outcomes[1].status, TaskStatus::UnknownType);
    assert!(report.failures().is_empty());
}

#[tokio::test]
async fn test_reload_mid_cycle_takes_effect_next_cycle() {
    let store = Arc::new(TaskStore::new(vec![]));
    store
        .replace(ghost::tasks::parse_tasks(r#"[{"type":"blog"},{"type":"social_media"},{"type":"vision"}]"#, "initial", false).unwrap())
        .await;

    let calls: Calls = Arc::new(Mutex::new(Vec::new()));
    let mut registry = ActionRegistry::new();
    registry.register(
        "blog",
        ReplacesStore {
            store: store.clone(),
            calls: calls.clone(),
        },
    );
    for t in ["social_media", "vision", "stock"] {
        registry.register(t, Recording { calls: calls.clone() });
    }

    let dispatcher = Dispatcher::new(store, Arc::new(registry), mission(), &dispatch_config());
    let token = CancellationToken::new();

    let first = dispatcher.run_cycle(&token).await;
    assert_eq!(first.processed(), 3);
    assert_eq!(*calls.lock().unwrap(), vec!["blog", "social_media", "vision"]);

    calls.lock().unwrap().clear();
    let second = dispatcher.run_cycle(&token).await;
    assert_eq!(second.processed(), 1);
    assert_eq!(*calls.lock().unwrap(), vec!["stock"]);
}

struct OneShotVoice {
    transcript: Mutex<Option<String>>,
}

#[async_trait]
impl WakeDetector for OneShotVoice {
    async fn wake_detected(&self) -> bool {
        self.transcript.lock().unwrap().is_some()
    }
}

#[async_trait]
impl Transcriber for OneShotVoice {
    async fn transcribe(&self) -> anyhow::Result<String> {
        Ok(self.transcript.lock().unwrap().take().unwrap_or_default())
    }
}

#[tokio::test]
async fn test_voice_command_runs_in_next_cycle_only() {
    let store = Arc::new(TaskStore::new(vec![]));
    store
        .replace(ghost::tasks::parse_tasks(r#"[{"type":"blog","values_suggestion":false}]"#, "t", false).unwrap())
        .await;

    let calls: Calls = Arc::new(Mutex::new(Vec::new()));
    let mut registry = ActionRegistry::new();
    registry.register("blog", Recording { calls: calls.clone() });
    registry.register("social_media", Recording { calls: calls.clone() });

    let voice = Arc::new(OneShotVoice {
        transcript: Mutex::new(Some("please post the tiktok".into())),
    });
    let matcher = CommandMatcher::new(&[VoiceCommandEntry {
        pattern: "post .*tiktok".into(),
        task_type: "social_media".into(),
        payload: Default::default(),
        values_suggestion: true,
    }])
    .unwrap();
    let bridge = VoiceBridge::new(voice.clone(), voice, matcher, store.injector());

    let dispatcher = Dispatcher::new(store, Arc::new(registry), mission(), &dispatch_config());
    let token = CancellationToken::new();

    bridge.poll_once().await.unwrap();
    let first = dispatcher.run_cycle(&token).await;
    assert_eq!(first.processed(), 2);
    assert!(!first.outcomes[0].advised);
    assert!(first.outcomes[1].injected);
    assert!(first.outcomes[1].advised);

    let second = dispatcher.run_cycle(&token).await;
    assert_eq!(second.processed(), 1);
    assert_eq!(*calls.lock().unwrap(), vec!["blog", "social_media", "blog"]);
}
