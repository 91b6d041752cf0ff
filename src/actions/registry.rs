//! 动作注册表
//!
//! 所有外部协作方实现 ActionHandler trait（name / execute），由 ActionRegistry 按任务类型注册与查找；
//! ActionExecutor 在调用时加超时与 panic 隔离并统一转为 GhostError。
//! 注册在任何循环启动前完成，之后以 Arc 只读共享。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::GhostError;
use crate::tasks::{normalize_type, TaskDescriptor};

/// handler 的执行结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Success,
    Failure(String),
}

impl ActionOutcome {
    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure(reason.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl<E: std::fmt::Display> From<Result<(), E>> for ActionOutcome {
    fn from(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => Self::Success,
            Err(e) => Self::Failure(e.to_string()),
        }
    }
}

/// 动作 handler：外部协作方的唯一契约；凭据在构造时注入，调度器不感知协议细节
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// handler 名称（用于审计日志）
    fn name(&self) -> &str;

    async fn execute(&self, task: &TaskDescriptor) -> ActionOutcome;
}

/// 动作注册表：任务类型（小写）→ Arc<dyn ActionHandler>
#[derive(Default)]
pub struct ActionRegistry {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册或覆盖某类型的 handler
    pub fn register(&mut self, task_type: &str, handler: impl ActionHandler + 'static) {
        self.register_arc(task_type, Arc::new(handler));
    }

    /// 多个类型共享同一个 handler 实例时使用
    pub fn register_arc(&mut self, task_type: &str, handler: Arc<dyn ActionHandler>) {
        let key = normalize_type(task_type);
        if self.handlers.insert(key.clone(), handler).is_some() {
            tracing::debug!("Handler for '{}' overridden", key);
        }
    }

    pub fn resolve(&self, task_type: &str) -> Result<Arc<dyn ActionHandler>, GhostError> {
        let key = normalize_type(task_type);
        self.handlers
            .get(&key)
            .cloned()
            .ok_or(GhostError::UnknownTaskType(key))
    }

    pub fn contains(&self, task_type: &str) -> bool {
        self.handlers.contains_key(&normalize_type(task_type))
    }

    /// 已注册的类型（排序，便于日志）
    pub fn task_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
