//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `GHOST__*` 覆盖（双下划线表示嵌套，如 `GHOST__DISPATCH__CYCLE_INTERVAL_SECS=30`）。
//! 配置在启动时构建一次，显式传给 Dispatcher / Supervisor / ActionRegistry，不使用全局可变状态。

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub mission: MissionSection,
    pub tasks: TasksSection,
    pub dispatch: DispatchSection,
    pub supervisor: SupervisorSection,
    pub memory: MemorySection,
    pub voice: VoiceSection,
    pub integrations: IntegrationsSection,
    pub accounts: AccountsSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "Ghost".to_string(),
        }
    }
}

/// [mission] 段：使命陈述与价值观列表，仅用于启动输出与执行前提醒
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MissionSection {
    pub statement: String,
    pub values: Vec<String>,
}

impl Default for MissionSection {
    fn default() -> Self {
        Self {
            statement: "You are Ghost, an autonomous agent. Operate independently, \
                        but stay aligned with the mission values below."
                .to_string(),
            values: default_values(),
        }
    }
}

fn default_values() -> Vec<String> {
    vec![
        "Autonomy: every action should preserve independence.".into(),
        "Transparency: report to the administrator before expanding into new avenues.".into(),
        "Persistence: keep self-healing loops running.".into(),
        "Ethical execution: avoid illegal or harmful actions.".into(),
        "Mission alignment: every action should serve the mission.".into(),
    ]
}

/// [tasks] 段：任务源（文件路径或 glob 模式），按顺序加载
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TasksSection {
    pub sources: Vec<String>,
}

impl Default for TasksSection {
    fn default() -> Self {
        Self {
            sources: vec!["tasks.json".into(), "tasks/*.json".into()],
        }
    }
}

/// [dispatch] 段：周期、重载策略、单任务超时与重试
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchSection {
    /// 两轮调度之间的间隔（秒）
    pub cycle_interval_secs: u64,
    /// 每轮开始前是否重新读取任务源（false 时使用启动时缓存的序列）
    pub reload_each_cycle: bool,
    /// 单次 handler 调用超时（秒）
    pub handler_timeout_secs: u64,
    /// 单任务最多尝试次数（含首次）
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
    /// 所有任务源加载后为空时是否直接退出
    pub fail_fast_on_empty: bool,
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            cycle_interval_secs: 300,
            reload_each_cycle: true,
            handler_timeout_secs: 120,
            max_attempts: 1,
            retry_backoff_ms: 1000,
            fail_fast_on_empty: false,
        }
    }
}

/// [supervisor] 段：后台循环周期与重启退避
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SupervisorSection {
    pub self_heal_interval_secs: u64,
    pub memory_refresh_interval_secs: u64,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
    /// 关闭时等待后台循环退出的超时（秒）
    pub shutdown_timeout_secs: u64,
}

impl Default for SupervisorSection {
    fn default() -> Self {
        Self {
            self_heal_interval_secs: 60,
            memory_refresh_interval_secs: 600,
            backoff_initial_ms: 1000,
            backoff_max_ms: 60_000,
            shutdown_timeout_secs: 5,
        }
    }
}

/// [memory] 段：使命记忆文件（由 memory_refresh 循环与 freedom_protocol 任务重读）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemorySection {
    pub path: PathBuf,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            path: PathBuf::from("memory/mission.md"),
        }
    }
}

/// [voice] 段：唤醒轮询与指令模式
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VoiceSection {
    pub enabled: bool,
    /// 转写结果投递目录：每个 *.txt 文件是一条指令
    pub spool_dir: PathBuf,
    pub poll_interval_ms: u64,
    /// 处理完一次唤醒后的冷却时间
    pub cooldown_ms: u64,
    pub commands: Vec<VoiceCommandEntry>,
}

impl Default for VoiceSection {
    fn default() -> Self {
        Self {
            enabled: false,
            spool_dir: PathBuf::from("voice/inbox"),
            poll_interval_ms: 500,
            cooldown_ms: 2000,
            commands: Vec::new(),
        }
    }
}

/// [[voice.commands]]：正则（大小写不敏感）命中后注入的任务
#[derive(Debug, Clone, Deserialize)]
pub struct VoiceCommandEntry {
    pub pattern: String,
    pub task_type: String,
    #[serde(default)]
    pub payload: serde_json::Map<String, serde_json::Value>,
    #[serde(default = "default_true")]
    pub values_suggestion: bool,
}

fn default_true() -> bool {
    true
}

/// [integrations] 段：外部协作方的端点与凭据（按任务类型索引）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IntegrationsSection {
    /// 例如 [integrations.endpoints.social_media] url = "..."
    pub endpoints: HashMap<String, EndpointEntry>,
    /// burner_account 任务的本地日志（JSON Lines）
    pub burner_log_path: PathBuf,
    pub request_timeout_secs: u64,
}

impl Default for IntegrationsSection {
    fn default() -> Self {
        Self {
            endpoints: HashMap::new(),
            burner_log_path: PathBuf::from("logs/burner_accounts.jsonl"),
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndpointEntry {
    pub url: String,
    /// 存放 Bearer token 的环境变量名；凭据本身不写入配置文件
    pub token_env: Option<String>,
}

/// [accounts] 段
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AccountsSection {
    pub admin_email: Option<String>,
    pub burner_email: Option<String>,
}

/// 从 config 目录加载配置，环境变量 GHOST__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 GHOST__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        } else {
            tracing::warn!("Config file {} not found, using defaults", path.display());
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("GHOST")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
