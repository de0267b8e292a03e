//! 执行一轮评论同步
//!
//! 配置全部来自环境变量（见 `SyncConfig::from_env`），由外部调度器定时调用。
//! Ctrl-C 会在两条评论之间停止本轮；已写入账本的记录保持有效。

use std::process::ExitCode;

use comment_sync::{version, SyncConfig, SyncEngine};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("🚀 {}", version::version_line());

    let config = match SyncConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("❌ 配置无效: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let engine = match SyncEngine::from_config(config).await {
        Ok(engine) => engine,
        Err(e) => {
            error!("❌ 初始化失败: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("收到中断信号，当前评论处理完后停止");
            ctrl_c.cancel();
        }
    });

    match engine.run_pass(&cancel).await {
        Ok(report) => {
            if report.cancelled {
                warn!("⏹️ 本轮同步已取消，未处理的评论留给下一轮");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("❌ 同步失败: {}", e);
            ExitCode::FAILURE
        }
    }
}
