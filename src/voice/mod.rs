//! 语音指令桥：唤醒检测与转写两个外部协作方的契约，以及把转写结果注入调度的桥

pub mod bridge;
pub mod matcher;
pub mod spool;

use async_trait::async_trait;

pub use bridge::{VoiceBridge, VoiceEvent, VoiceState};
pub use matcher::CommandMatcher;
pub use spool::SpoolDirectory;

/// 唤醒词检测（轮询）
#[async_trait]
pub trait WakeDetector: Send + Sync {
    async fn wake_detected(&self) -> bool;
}

/// 语音转写；可能阻塞，超时由实现自行处理
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self) -> anyhow::Result<String>;
}
