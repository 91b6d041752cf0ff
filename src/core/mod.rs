//! 核心层：错误分类、使命记录、组件构建、启动编排与优雅关闭

pub mod builder;
pub mod error;
pub mod mission;
pub mod orchestrator;
pub mod shutdown;

pub use builder::GhostBuilder;
pub use error::GhostError;
pub use mission::MissionRecord;
pub use orchestrator::{create_ghost, Ghost};
pub use shutdown::{ShutdownManager, ShutdownReason};
