//! 任务：描述（TaskDescriptor）与存储（TaskStore）

pub mod descriptor;
pub mod store;

pub use descriptor::{normalize_type, TaskDescriptor, TaskOrigin};
pub use store::{parse_tasks, CyclePlan, LoadReport, TaskInjector, TaskStore};
