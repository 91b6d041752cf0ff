//! burner_account 协作方：把账户记录追加到本地 JSON Lines 日志

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::actions::{ActionHandler, ActionOutcome};
use crate::config::AccountsSection;
use crate::tasks::TaskDescriptor;

pub struct BurnerAccountLog {
    path: PathBuf,
    accounts: AccountsSection,
}

impl BurnerAccountLog {
    pub fn new(path: impl AsRef<Path>, accounts: AccountsSection) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            accounts,
        }
    }

    async fn append(&self, task: &TaskDescriptor) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let entry = serde_json::json!({
            "logged_at": chrono::Utc::now().to_rfc3339(),
            "account": task.payload(),
            "burner_email": self.accounts.burner_email,
            "admin_email": self.accounts.admin_email,
        });
        let mut line = entry.to_string();
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl ActionHandler for BurnerAccountLog {
    fn name(&self) -> &str {
        "burner_log"
    }

    async fn execute(&self, task: &TaskDescriptor) -> ActionOutcome {
        self.append(task).await.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map, Value};
    use tempfile::TempDir;

    use crate::tasks::TaskOrigin;

    #[tokio::test]
    async fn test_appends_one_line_per_task() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs/burner.jsonl");
        let log = BurnerAccountLog::new(
            &path,
            AccountsSection {
                admin_email: Some("admin@example.com".into()),
                burner_email: Some("burner@example.com".into()),
            },
        );

        let mut payload = Map::new();
        payload.insert("account_id".into(), json!("acct-1"));
        let task = TaskDescriptor::new("burner_account", payload, TaskOrigin::Persisted { source: "t".into() });

        assert!(log.execute(&task).await.is_success());
        assert!(log.execute(&task).await.is_success());

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let entry: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(entry["account"]["account_id"], "acct-1");
        assert_eq!(entry["burner_email"], "burner@example.com");
    }
}
