//! Ghost - Rust 个人自动化智能体
//!
//! 入口：初始化日志、加载配置（可选的第一个参数为配置文件路径）、完成启动并运行调度主循环。

use std::path::PathBuf;

use anyhow::Context;
use ghost::{config::load_config, create_ghost, observability};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = load_config(config_path).context("Failed to load config")?;

    let ghost = create_ghost(config).await.context("Failed to start Ghost")?;
    ghost.run().await;

    Ok(())
}
