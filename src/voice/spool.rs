//! 投递目录式语音协作方：外部唤醒词 / 转写程序把每条转写结果写成目录中的一个 *.txt 文件
//!
//! 目录中有 *.txt 即视为唤醒；transcribe 取文件名最小的一条，读取后删除。

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::voice::{Transcriber, WakeDetector};

pub struct SpoolDirectory {
    dir: PathBuf,
}

impl SpoolDirectory {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn pending(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("txt") && path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

#[async_trait]
impl WakeDetector for SpoolDirectory {
    async fn wake_detected(&self) -> bool {
        match self.pending().await {
            Ok(files) => !files.is_empty(),
            Err(e) => {
                tracing::debug!("Voice spool {} unreadable: {}", self.dir.display(), e);
                false
            }
        }
    }
}

#[async_trait]
impl Transcriber for SpoolDirectory {
    async fn transcribe(&self) -> anyhow::Result<String> {
        let Some(path) = self.pending().await?.into_iter().next() else {
            return Ok(String::new());
        };
        let text = tokio::fs::read_to_string(&path).await?;
        tokio::fs::remove_file(&path).await?;
        Ok(text.trim().to_string())
    }
}
