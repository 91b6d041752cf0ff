//! 后台循环监管：自愈、记忆刷新、语音桥等长驻循环的启动、退避重启与关闭

pub mod backoff;
pub mod jobs;
pub mod loops;

pub use backoff::Backoff;
pub use jobs::{MemoryRefreshJob, SelfHealJob};
pub use loops::{BackgroundJob, BackgroundSupervisor, LoopHandle, LoopState, LoopStatus, SupervisorDrain};
