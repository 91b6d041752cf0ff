//! 调度过程中的错误类型
//!
//! 任务级与循环级错误都在各自边界被捕获并记录，不会向上传播导致进程退出；
//! 只有 NoTasksLoaded（配置了 fail_fast_on_empty 时）与 Config 会中止启动。

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GhostError {
    /// 任务源（文件或 glob）不存在，跳过该源
    #[error("Task source missing: {0}")]
    TaskSourceMissing(String),

    /// 任务源内容无法解析为任务描述，跳过该源
    #[error("Task parse error in {source_name}: {message}")]
    TaskParseError { source_name: String, message: String },

    /// 没有为该类型注册 handler，跳过该任务
    #[error("Unknown task type: {0}")]
    UnknownTaskType(String),

    #[error("Handler for '{task_type}' failed: {reason}")]
    HandlerFailure { task_type: String, reason: String },

    #[error("Handler for '{task_type}' timed out after {secs}s")]
    HandlerTimeout { task_type: String, secs: u64 },

    #[error("Handler for '{task_type}' panicked: {message}")]
    HandlerPanicked { task_type: String, message: String },

    /// 后台循环单次执行失败，由 Supervisor 退避后重启
    #[error("Background loop '{name}' failed: {reason}")]
    BackgroundLoopFailure { name: String, reason: String },

    #[error("Background loop '{0}' is already running")]
    DuplicateLoop(String),

    #[error("No tasks loaded from any source")]
    NoTasksLoaded,

    #[error("Config error: {0}")]
    Config(String),
}

impl GhostError {
    /// 是否只影响当前任务/源/循环（除启动期错误外都可恢复）
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, GhostError::NoTasksLoaded | GhostError::Config(_))
    }
}
