//! freedom_protocol / memory_refresh 任务：立即重读使命记忆

use std::sync::Arc;

use async_trait::async_trait;

use crate::actions::{ActionHandler, ActionOutcome};
use crate::memory::MissionMemory;
use crate::tasks::TaskDescriptor;

pub struct MemoryRefreshAction {
    memory: Arc<MissionMemory>,
}

impl MemoryRefreshAction {
    pub fn new(memory: Arc<MissionMemory>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl ActionHandler for MemoryRefreshAction {
    fn name(&self) -> &str {
        "memory_refresh"
    }

    async fn execute(&self, _task: &TaskDescriptor) -> ActionOutcome {
        self.memory.refresh().await.map(|_| ()).into()
    }
}
