//! 语音指令桥
//!
//! 状态机：Idle → Listening（检测到唤醒）→ Transcribing → Idle。
//! 转写结果命中指令则注入一条临时任务（下一个调度周期可见），否则只记录日志后丢弃。
//! 作为 BackgroundJob 由 Supervisor 按轮询间隔驱动；转写失败交给 Supervisor 退避。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::supervisor::BackgroundJob;
use crate::tasks::TaskInjector;
use crate::voice::{CommandMatcher, Transcriber, WakeDetector};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    Idle,
    Listening,
    Transcribing,
}

/// 一次轮询的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceEvent {
    /// 未检测到唤醒
    NoWake,
    /// 唤醒后转写为空
    Empty,
    /// 命中指令并注入任务
    Injected { task_type: String, transcript: String },
    Unrecognized(String),
}

pub struct VoiceBridge {
    detector: Arc<dyn WakeDetector>,
    transcriber: Arc<dyn Transcriber>,
    matcher: CommandMatcher,
    injector: TaskInjector,
    state: Mutex<VoiceState>,
    poll_interval: Duration,
    cooldown: Duration,
    received: AtomicU64,
    injected: AtomicU64,
}

impl VoiceBridge {
    pub fn new(
        detector: Arc<dyn WakeDetector>,
        transcriber: Arc<dyn Transcriber>,
        matcher: CommandMatcher,
        injector: TaskInjector,
    ) -> Self {
        Self {
            detector,
            transcriber,
            matcher,
            injector,
            state: Mutex::new(VoiceState::Idle),
            poll_interval: Duration::from_millis(500),
            cooldown: Duration::from_millis(2000),
            received: AtomicU64::new(0),
            injected: AtomicU64::new(0),
        }
    }

    pub fn with_timing(mut self, poll_interval: Duration, cooldown: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.cooldown = cooldown;
        self
    }

    pub fn state(&self) -> VoiceState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: VoiceState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    /// (收到的指令数, 注入的任务数)
    pub fn counters(&self) -> (u64, u64) {
        (
            self.received.load(Ordering::Relaxed),
            self.injected.load(Ordering::Relaxed),
        )
    }

    /// 执行一次完整的 Idle → … → Idle 轮询
    pub async fn poll_once(&self) -> anyhow::Result<VoiceEvent> {
        if !self.detector.wake_detected().await {
            return Ok(VoiceEvent::NoWake);
        }
        self.set_state(VoiceState::Listening);

        self.set_state(VoiceState::Transcribing);
        let transcript = self.transcriber.transcribe().await;
        self.set_state(VoiceState::Idle);
        let transcript = transcript?;

        if transcript.trim().is_empty() {
            return Ok(VoiceEvent::Empty);
        }
        self.received.fetch_add(1, Ordering::Relaxed);
        tracing::info!("Voice command received: {}", transcript);

        match self.matcher.match_command(&transcript) {
            Some(task) => {
                let task_type = task.task_type().to_string();
                if !self.injector.inject(task) {
                    anyhow::bail!("task store is gone, cannot inject '{}'", task_type);
                }
                self.injected.fetch_add(1, Ordering::Relaxed);
                tracing::info!("Voice command mapped to '{}', queued for next cycle", task_type);
                Ok(VoiceEvent::Injected {
                    task_type,
                    transcript,
                })
            }
            None => {
                tracing::info!("Voice command not recognized, dropped");
                Ok(VoiceEvent::Unrecognized(transcript))
            }
        }
    }
}

#[async_trait]
impl BackgroundJob for VoiceBridge {
    fn name(&self) -> &str {
        "voice_bridge"
    }

    fn period(&self) -> Duration {
        self.poll_interval
    }

    async fn tick(&self) -> anyhow::Result<()> {
        match self.poll_once().await? {
            VoiceEvent::NoWake => {}
            _ => tokio::time::sleep(self.cooldown).await,
        }
        Ok(())
    }
}
