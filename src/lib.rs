//! Ghost - Rust 个人自动化智能体
//!
//! 模块划分：
//! - **actions**: 动作注册表、执行器（超时 / 重试 / panic 隔离）与内置协作方
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误分类、使命记录、构建、启动编排、优雅关闭
//! - **dispatch**: 前台调度周期与周期报告
//! - **memory**: 可刷新的使命记忆
//! - **observability**: 日志初始化
//! - **supervisor**: 后台循环监管（自愈、记忆刷新、语音桥）
//! - **tasks**: 任务描述与任务存储
//! - **voice**: 唤醒 / 转写协作方契约与语音指令桥

pub mod actions;
pub mod config;
pub mod core;
pub mod dispatch;
pub mod memory;
pub mod observability;
pub mod supervisor;
pub mod tasks;
pub mod voice;

pub use crate::core::{create_ghost, Ghost, GhostError};
