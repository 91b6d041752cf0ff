//! 动作：注册表、执行器与内置协作方

pub mod burner_log;
pub mod executor;
pub mod memory_refresh;
pub mod registry;
pub mod webhook;

pub use burner_log::BurnerAccountLog;
pub use executor::ActionExecutor;
pub use memory_refresh::MemoryRefreshAction;
pub use registry::{ActionHandler, ActionOutcome, ActionRegistry};
pub use webhook::{UnconfiguredAction, WebhookAction};

/// 通过 webhook 接入的外部集成类型；未配置端点时注册为 UnconfiguredAction
pub const WEBHOOK_TASK_TYPES: &[&str] = &[
    "social_media",
    "blog",
    "stock",
    "vision",
    "nova",
    "zapier",
    "webhook",
];

/// 触发使命记忆重读的任务类型
pub const MEMORY_REFRESH_TASK_TYPES: &[&str] = &["freedom_protocol", "memory_refresh"];

pub const BURNER_ACCOUNT_TASK_TYPE: &str = "burner_account";
