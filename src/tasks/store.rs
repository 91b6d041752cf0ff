//! 任务存储：从一个或多个任务源加载有序任务序列，并接收语音桥注入的临时任务
//!
//! - 任务源可以是文件路径或 glob 模式（如 tasks/*.json），支持 .json 与 .toml
//! - 单个源失败（不存在 / 无法解析）只跳过该源，记录到 LoadReport.failures
//! - 重载整体替换 Arc<Vec<_>>：调度周期持有旧 Arc，周期内看到的序列不会被改动
//! - 注入走无界 mpsc，调度周期开始时一次性取出

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, Mutex, RwLock};

use crate::core::GhostError;
use crate::tasks::TaskDescriptor;

/// 一次加载的结果：成功的任务（按源顺序、源内顺序）与失败的源
#[derive(Debug, Default)]
pub struct LoadReport {
    pub tasks: Vec<TaskDescriptor>,
    pub failures: Vec<GhostError>,
    /// 成功加载的文件数
    pub files_loaded: usize,
}

/// 一个调度周期要执行的任务：持久化序列快照 + 本周期取出的注入任务
#[derive(Debug, Clone)]
pub struct CyclePlan {
    pub persisted: Arc<Vec<TaskDescriptor>>,
    pub injected: Vec<TaskDescriptor>,
}

impl CyclePlan {
    pub fn len(&self) -> usize {
        self.persisted.len() + self.injected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 按执行顺序遍历：持久化任务在前，注入任务在后
    pub fn iter(&self) -> impl Iterator<Item = &TaskDescriptor> {
        self.persisted.iter().chain(self.injected.iter())
    }
}

/// 注入端：语音桥等后台循环持有的克隆
#[derive(Debug, Clone)]
pub struct TaskInjector {
    tx: mpsc::UnboundedSender<TaskDescriptor>,
}

impl TaskInjector {
    /// 注入一条临时任务，下一个调度周期可见；存储已销毁时返回 false
    pub fn inject(&self, task: TaskDescriptor) -> bool {
        self.tx.send(task).is_ok()
    }
}

pub struct TaskStore {
    sources: Vec<String>,
    current: RwLock<Arc<Vec<TaskDescriptor>>>,
    inject_tx: mpsc::UnboundedSender<TaskDescriptor>,
    inject_rx: Mutex<mpsc::UnboundedReceiver<TaskDescriptor>>,
}

impl TaskStore {
    pub fn new(sources: Vec<String>) -> Self {
        let (inject_tx, inject_rx) = mpsc::unbounded_channel();
        Self {
            sources,
            current: RwLock::new(Arc::new(Vec::new())),
            inject_tx,
            inject_rx: Mutex::new(inject_rx),
        }
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    pub fn injector(&self) -> TaskInjector {
        TaskInjector {
            tx: self.inject_tx.clone(),
        }
    }

    /// 读取所有任务源，不修改当前序列
    pub async fn load(&self) -> LoadReport {
        let mut report = LoadReport::default();

        for source in &self.sources {
            let files = match resolve_source(source) {
                Ok(files) => files,
                Err(e) => {
                    tracing::warn!("Task source skipped: {}", e);
                    report.failures.push(e);
                    continue;
                }
            };

            for file in files {
                match load_file(&file).await {
                    Ok(tasks) => {
                        tracing::debug!("Loaded {} tasks from {}", tasks.len(), file.display());
                        report.files_loaded += 1;
                        report.tasks.extend(tasks);
                    }
                    Err(e) => {
                        tracing::warn!("Task source skipped: {}", e);
                        report.failures.push(e);
                    }
                }
            }
        }

        report
    }

    /// 重新加载并整体替换当前序列
    ///
    /// 没有任何文件加载成功、且失败全部是读取/解析错误时保留旧序列；
    /// 只要有源已不存在，就按实际加载结果替换（可能为空）。
    pub async fn reload(&self) -> LoadReport {
        let report = self.load().await;

        let transient_only = !report.failures.is_empty()
            && report
                .failures
                .iter()
                .all(|e| !matches!(e, GhostError::TaskSourceMissing(_)));
        if report.files_loaded == 0 && transient_only {
            let current = self.current.read().await;
            if !current.is_empty() {
                tracing::warn!(
                    "All task sources failed to read or parse, keeping previous {} tasks",
                    current.len()
                );
                return report;
            }
        }

        if report.tasks.is_empty() {
            tracing::warn!(
                "No tasks loaded from {} sources; continuing with an empty task set",
                self.sources.len()
            );
        }
        *self.current.write().await = Arc::new(report.tasks.clone());
        report
    }

    /// 直接替换当前序列（测试与嵌入使用）
    pub async fn replace(&self, tasks: Vec<TaskDescriptor>) {
        *self.current.write().await = Arc::new(tasks);
    }

    /// 当前序列快照
    pub async fn snapshot(&self) -> Arc<Vec<TaskDescriptor>> {
        Arc::clone(&*self.current.read().await)
    }

    /// 取出所有待执行的注入任务
    pub async fn drain_injected(&self) -> Vec<TaskDescriptor> {
        let mut rx = self.inject_rx.lock().await;
        let mut tasks = Vec::new();
        while let Ok(task) = rx.try_recv() {
            tasks.push(task);
        }
        tasks
    }

    /// 组装下一个周期：按需重载，然后取快照与注入任务
    pub async fn next_cycle(&self, reload: bool) -> CyclePlan {
        if reload {
            self.reload().await;
        }
        CyclePlan {
            persisted: self.snapshot().await,
            injected: self.drain_injected().await,
        }
    }
}

fn is_glob_pattern(source: &str) -> bool {
    source.contains(['*', '?', '['])
}

/// 将任务源展开为文件列表；glob 结果按路径排序以保证顺序确定
pub(crate) fn resolve_source(source: &str) -> Result<Vec<PathBuf>, GhostError> {
    if !is_glob_pattern(source) {
        let path = PathBuf::from(source);
        return if path.is_file() {
            Ok(vec![path])
        } else {
            Err(GhostError::TaskSourceMissing(source.to_string()))
        };
    }

    let paths = glob::glob(source).map_err(|e| GhostError::TaskParseError {
        source_name: source.to_string(),
        message: format!("invalid pattern: {}", e),
    })?;
    let mut files: Vec<PathBuf> = paths.flatten().filter(|p| p.is_file()).collect();
    if files.is_empty() {
        return Err(GhostError::TaskSourceMissing(source.to_string()));
    }
    files.sort();
    Ok(files)
}

async fn load_file(path: &Path) -> Result<Vec<TaskDescriptor>, GhostError> {
    let name = path.display().to_string();
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            GhostError::TaskSourceMissing(name.clone())
        } else {
            GhostError::TaskParseError {
                source_name: name.clone(),
                message: e.to_string(),
            }
        }
    })?;

    let is_toml = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);

    parse_tasks(&content, &name, is_toml)
}

/// 解析任务源内容：任务数组、单个任务对象，或带 tasks 数组的对象
pub fn parse_tasks(content: &str, source: &str, is_toml: bool) -> Result<Vec<TaskDescriptor>, GhostError> {
    let parse_err = |message: String| GhostError::TaskParseError {
        source_name: source.to_string(),
        message,
    };

    let root: Value = if is_toml {
        let table: toml::Value = toml::from_str(content).map_err(|e| parse_err(e.to_string()))?;
        serde_json::to_value(table).map_err(|e| parse_err(e.to_string()))?
    } else {
        serde_json::from_str(content).map_err(|e| parse_err(e.to_string()))?
    };

    let items = match root {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("tasks") {
            Some(Value::Array(items)) if !obj.contains_key("type") => items,
            Some(other) => {
                obj.insert("tasks".to_string(), other);
                vec![Value::Object(obj)]
            }
            None => vec![Value::Object(obj)],
        },
        other => return Err(parse_err(format!("expected array or object, got {}", other))),
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            TaskDescriptor::from_value(item, source).map_err(|e| parse_err(format!("task #{}: {}", i, e)))
        })
        .collect()
}
