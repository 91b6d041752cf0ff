//! Webhook 协作方：把任务以 JSON POST 到配置的端点
//!
//! social_media / blog / stock / vision / nova / zapier 等外部集成都通过它接入，
//! 具体协议由端点另一侧负责。Bearer token 在构造时从环境变量读取。

use std::time::Duration;

use async_trait::async_trait;

use crate::actions::{ActionHandler, ActionOutcome};
use crate::config::EndpointEntry;
use crate::tasks::TaskDescriptor;

pub struct WebhookAction {
    name: String,
    url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl WebhookAction {
    /// HTTP 客户端构建失败（如 TLS 后端不可用）时返回错误
    pub fn new(name: &str, url: &str, token: Option<String>, timeout_secs: u64) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build HTTP client for '{}': {}", name, e))?;
        Ok(Self {
            name: name.to_string(),
            url: url.to_string(),
            token,
            client,
        })
    }

    /// 从配置条目构建；token_env 指向的环境变量未设置时告警并以无凭据方式调用
    pub fn from_entry(task_type: &str, entry: &EndpointEntry, timeout_secs: u64) -> anyhow::Result<Self> {
        let token = entry.token_env.as_deref().and_then(|var| match std::env::var(var) {
            Ok(v) if !v.is_empty() => Some(v),
            _ => {
                tracing::warn!("Credential env {} for '{}' is not set", var, task_type);
                None
            }
        });
        Self::new(task_type, &entry.url, token, timeout_secs)
    }
}

#[async_trait]
impl ActionHandler for WebhookAction {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, task: &TaskDescriptor) -> ActionOutcome {
        let body = serde_json::json!({
            "task_type": task.task_type(),
            "payload": task.payload(),
            "origin": task.origin(),
            "sent_at": chrono::Utc::now().to_rfc3339(),
        });

        let mut request = self.client.post(&self.url).json(&body);
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }

        match request.send().await {
            Ok(resp) if resp.status().is_success() => ActionOutcome::Success,
            Ok(resp) => {
                let status = resp.status();
                let text = resp.text().await.unwrap_or_default();
                let preview: String = text.chars().take(200).collect();
                ActionOutcome::failure(format!("{} returned {}: {}", self.url, status, preview))
            }
            Err(e) => ActionOutcome::failure(format!("request to {} failed: {}", self.url, e)),
        }
    }
}

/// 已知类型但没有可用端点：每次执行都报告失败，而不是当作未知类型
pub struct UnconfiguredAction {
    task_type: String,
    reason: String,
}

impl UnconfiguredAction {
    pub fn new(task_type: &str) -> Self {
        Self {
            task_type: task_type.to_string(),
            reason: format!(
                "no endpoint configured for '{}' (set [integrations.endpoints.{}])",
                task_type, task_type
            ),
        }
    }

    /// 端点已配置但协作方无法构建
    pub fn with_reason(task_type: &str, reason: impl Into<String>) -> Self {
        Self {
            task_type: task_type.to_string(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl ActionHandler for UnconfiguredAction {
    fn name(&self) -> &str {
        "unconfigured"
    }

    async fn execute(&self, _task: &TaskDescriptor) -> ActionOutcome {
        ActionOutcome::failure(self.reason.clone())
    }
}
