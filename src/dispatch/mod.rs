//! 调度：前台周期循环与周期报告

pub mod dispatcher;
pub mod report;

pub use dispatcher::Dispatcher;
pub use report::{CycleReport, TaskOutcome, TaskStatus};
