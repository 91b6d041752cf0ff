//! 调度周期报告：每个输入任务对应一条结果，顺序与执行顺序一致

use chrono::{DateTime, Utc};

use crate::core::GhostError;

#[derive(Debug, Clone, PartialEq)]
pub enum TaskStatus {
    Succeeded,
    /// handler 失败、超时或 panic
    Failed(String),
    /// 没有注册 handler
    UnknownType,
    /// 关闭信号到达时尚未开始
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct TaskOutcome {
    /// 在本周期执行序列中的位置
    pub index: usize,
    pub task_type: String,
    pub injected: bool,
    /// 是否在执行前输出了价值观提醒
    pub advised: bool,
    pub status: TaskStatus,
}

impl TaskOutcome {
    pub(crate) fn from_error(index: usize, task_type: &str, injected: bool, advised: bool, err: &GhostError) -> Self {
        let status = match err {
            GhostError::UnknownTaskType(_) => TaskStatus::UnknownType,
            other => TaskStatus::Failed(other.to_string()),
        };
        Self {
            index,
            task_type: task_type.to_string(),
            injected,
            advised,
            status,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle: u64,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub outcomes: Vec<TaskOutcome>,
}

impl CycleReport {
    /// 已处理的任务数（等于输入任务数）
    pub fn processed(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.count(|s| matches!(s, TaskStatus::Succeeded))
    }

    pub fn unknown(&self) -> usize {
        self.count(|s| matches!(s, TaskStatus::UnknownType))
    }

    pub fn failures(&self) -> Vec<&TaskOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, TaskStatus::Failed(_)))
            .collect()
    }

    pub fn was_cancelled(&self) -> bool {
        self.outcomes.iter().any(|o| o.status == TaskStatus::Cancelled)
    }

    fn count(&self, pred: impl Fn(&TaskStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }
}
