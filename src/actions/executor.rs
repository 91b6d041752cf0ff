//! 动作执行器
//!
//! 对每次 handler 调用施加超时与 panic 隔离，失败 / 超时 / panic 统一转为 GhostError；
//! 可配置重试次数与重试间隔；每次尝试输出结构化审计日志（JSON）。

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::actions::{ActionHandler, ActionOutcome};
use crate::core::GhostError;
use crate::tasks::TaskDescriptor;

pub struct ActionExecutor {
    timeout: Duration,
    max_attempts: u32,
    retry_backoff: Duration,
}

impl ActionExecutor {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_secs),
            max_attempts: 1,
            retry_backoff: Duration::from_millis(1000),
        }
    }

    pub fn with_retry(mut self, max_attempts: u32, backoff_ms: u64) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_backoff = Duration::from_millis(backoff_ms);
        self
    }

    /// 单次调用；超时返回 HandlerTimeout，Failure 返回 HandlerFailure，panic 返回 HandlerPanicked
    pub async fn invoke(
        &self,
        handler: &Arc<dyn ActionHandler>,
        task: &TaskDescriptor,
    ) -> Result<(), GhostError> {
        let start = Instant::now();
        let task_type = task.task_type().to_string();
        let result = timeout(
            self.timeout,
            AssertUnwindSafe(handler.execute(task)).catch_unwind(),
        )
        .await;

        let outcome = match &result {
            Ok(Ok(ActionOutcome::Success)) => "ok",
            Ok(Ok(ActionOutcome::Failure(_))) => "error",
            Ok(Err(_)) => "panic",
            Err(_) => "timeout",
        };
        let audit = serde_json::json!({
            "event": "action_audit",
            "task_type": task_type,
            "handler": handler.name(),
            "injected": task.is_injected(),
            "ok": outcome == "ok",
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
        });
        tracing::info!(audit = %audit.to_string(), "action");

        match result {
            Ok(Ok(ActionOutcome::Success)) => Ok(()),
            Ok(Ok(ActionOutcome::Failure(reason))) => Err(GhostError::HandlerFailure { task_type, reason }),
            Ok(Err(panic)) => Err(GhostError::HandlerPanicked {
                task_type,
                message: panic_message(panic.as_ref()),
            }),
            Err(_) => Err(GhostError::HandlerTimeout {
                task_type,
                secs: self.timeout.as_secs(),
            }),
        }
    }

    /// 按 max_attempts 重试；重试间隔内收到取消信号时返回最后一次错误
    pub async fn invoke_with_retry(
        &self,
        handler: &Arc<dyn ActionHandler>,
        task: &TaskDescriptor,
        cancel: &CancellationToken,
    ) -> Result<(), GhostError> {
        let mut attempt = 1;
        loop {
            match self.invoke(handler, task).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt >= self.max_attempts => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        "Attempt {}/{} for '{}' failed: {}",
                        attempt,
                        self.max_attempts,
                        task.task_type(),
                        e
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(e),
                        _ = tokio::time::sleep(self.retry_backoff) => {}
                    }
                    attempt += 1;
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
