//! comment-sync - 频道评论 → 工单 的增量同步
//!
//! 把频道视频下的公开评论与回复镜像到外部工单系统，每条评论至多一张工单：
//! - 📒 同步账本：已转发的评论 id 持久化在 SQLite，跨运行去重
//! - 📼 视频目录缓存：频道视频列表缓存在 sled，默认 2 天过期
//! - ⏱️ 时间窗口：只处理回看窗口内的评论（默认 24 小时）
//! - 🎫 工单派发：成功（HTTP 201）后才写账本，失败留给下一轮重试
//! - 🧵 并发扫描：多个视频并行拉取，同一评论 id 有锁保护
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use comment_sync::{SyncConfig, SyncEngine};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SyncConfig::from_env()?;
//!     let engine = SyncEngine::from_config(config).await?;
//!
//!     let report = engine.run_pass(&CancellationToken::new()).await?;
//!     println!("本轮创建工单: {}", report.dispatched());
//!
//!     Ok(())
//! }
//! ```

// 导出核心模块
pub mod config;
pub mod dispatch;
pub mod error;
pub mod http_client;
pub mod model;
pub mod source;
pub mod storage;
pub mod sync;
pub mod utils;
pub mod version;

#[cfg(test)]
pub(crate) mod testing;

// 重新导出核心类型，方便使用
pub use config::{
    HttpClientConfig, RetryConfig, ScopeMode, SyncConfig, SyncConfigBuilder, TicketConfig,
    TicketCredentials, YouTubeConfig,
};
pub use dispatch::{
    DispatchFailure, GorgiasDispatcher, TicketDispatcher, TicketPayload, TicketReceipt,
};
pub use error::{Result, SyncError};
pub use model::{Comment, CommentThread, SyncScope, VideoMeta};
pub use source::{CommentFeed, CommentSource, VideoMetadataCache, YouTubeFeed};
pub use storage::{SqliteSyncLedger, StorageManager, SyncLedger, VideoCatalogCache};
pub use sync::{PassPhase, PassReport, SyncEngine, Verdict};
pub use utils::{TimeFormatter, TimezoneConfig};
