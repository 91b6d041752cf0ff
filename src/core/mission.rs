//! 使命与价值观记录：进程级只读文本，仅用于启动输出与执行前提醒（advisory）

use std::fmt::Write as _;

use crate::config::MissionSection;

/// 只读使命记录；构造后不再修改，由 Dispatcher 持有 Arc 引用
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissionRecord {
    statement: String,
    values: Vec<String>,
}

impl MissionRecord {
    pub fn new(statement: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            statement: statement.into(),
            values,
        }
    }

    pub fn from_config(section: &MissionSection) -> Self {
        Self::new(section.statement.trim(), section.values.clone())
    }

    pub fn statement(&self) -> &str {
        &self.statement
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// 执行前提醒文本：每条价值观一行
    pub fn advisory(&self) -> String {
        let mut out = String::from("Value reminder:");
        for value in &self.values {
            let _ = write!(out, "\n  - {}", value);
        }
        out
    }
}
