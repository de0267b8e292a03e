//! 存储模块 - 同步状态的持久化层
//!
//! 两份持久状态，都位于 `data_dir` 下：
//! - SyncLedger: 已转发评论 id 集合（SQLite，`data.db`）
//! - VideoCatalogCache: 频道视频 id 列表 + 刷新时间（sled，`kv/`）

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;

pub mod catalog;
pub mod kv;
pub mod ledger;
pub mod migrate;

pub use catalog::{CatalogRecord, VideoCatalogCache, DEFAULT_CATALOG_MAX_AGE};
pub use kv::KvStore;
pub use ledger::{SqliteSyncLedger, SyncLedger};

/// 存储管理器：统一打开账本与目录缓存
#[derive(Clone)]
pub struct StorageManager {
    ledger: Arc<SqliteSyncLedger>,
    catalog: VideoCatalogCache,
}

impl StorageManager {
    /// 打开 `data_dir` 下的全部持久状态
    pub async fn open(data_dir: &Path, ledger_timeout: Duration) -> Result<Self> {
        let ledger = SqliteSyncLedger::open(data_dir, ledger_timeout).await?;
        let kv = KvStore::new(data_dir).await?;

        tracing::info!("存储初始化完成: {}", data_dir.display());

        Ok(Self {
            ledger: Arc::new(ledger),
            catalog: VideoCatalogCache::new(kv),
        })
    }

    pub fn ledger(&self) -> Arc<SqliteSyncLedger> {
        self.ledger.clone()
    }

    pub fn catalog(&self) -> &VideoCatalogCache {
        &self.catalog
    }
}
