//! 任务描述：一条声明式任务（类型标签 + 不透明 payload + 是否提醒价值观）
//!
//! 文件中的任务对象除 type / payload / values_suggestion 外的字段都并入 payload，
//! 显式 payload 中的同名键优先。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 任务来源
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum TaskOrigin {
    /// 来自持久化任务源，每次重载都会重新读取
    Persisted { source: String },
    /// 语音桥注入，只存活一个调度周期
    Voice { id: String, transcript: String },
}

/// 一条任务；派发后不可变，重载时整体替换
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskDescriptor {
    task_type: String,
    payload: Map<String, Value>,
    values_suggestion: bool,
    origin: TaskOrigin,
}

/// 文件中的原始任务对象
#[derive(Debug, Deserialize)]
struct RawTask {
    #[serde(rename = "type")]
    task_type: String,
    #[serde(default)]
    payload: Map<String, Value>,
    #[serde(default = "default_values_suggestion")]
    values_suggestion: bool,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

fn default_values_suggestion() -> bool {
    true
}

/// 类型标签规范化：去空白、转小写
pub fn normalize_type(tag: &str) -> String {
    tag.trim().to_lowercase()
}

impl TaskDescriptor {
    pub fn new(task_type: &str, payload: Map<String, Value>, origin: TaskOrigin) -> Self {
        Self {
            task_type: normalize_type(task_type),
            payload,
            values_suggestion: true,
            origin,
        }
    }

    pub fn with_values_suggestion(mut self, enabled: bool) -> Self {
        self.values_suggestion = enabled;
        self
    }

    /// 从 JSON 值解析一条任务；type 缺失、为空或不是对象时返回错误信息
    pub fn from_value(value: Value, source: &str) -> Result<Self, String> {
        if !value.is_object() {
            return Err(format!("expected task object, got {}", value_kind(&value)));
        }
        let raw: RawTask = serde_json::from_value(value).map_err(|e| e.to_string())?;
        if raw.task_type.trim().is_empty() {
            return Err("task 'type' must not be empty".to_string());
        }

        let mut payload = raw.extra;
        for (k, v) in raw.payload {
            payload.insert(k, v);
        }

        Ok(Self::new(
            &raw.task_type,
            payload,
            TaskOrigin::Persisted {
                source: source.to_string(),
            },
        )
        .with_values_suggestion(raw.values_suggestion))
    }

    pub fn task_type(&self) -> &str {
        &self.task_type
    }

    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    /// 取 payload 中的字符串字段
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(|v| v.as_str())
    }

    pub fn values_suggestion(&self) -> bool {
        self.values_suggestion
    }

    pub fn origin(&self) -> &TaskOrigin {
        &self.origin
    }

    pub fn is_injected(&self) -> bool {
        matches!(self.origin, TaskOrigin::Voice { .. })
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
