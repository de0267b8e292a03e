//! 同步账本 - 已转发评论 id 的持久化集合
//!
//! 只回答"某个 id 是否已派发过"，不记录顺序，也不提供更新或删除。
//! 任何存储层失败都映射为 `LedgerUnavailable`，由编排层中止本轮同步。

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::error::{Result, SyncError};
use crate::storage::migrate;

/// 账本数据库文件名
pub const LEDGER_FILE: &str = "data.db";

/// 同步账本
#[async_trait]
pub trait SyncLedger: Send + Sync {
    /// 纯查询，无副作用
    async fn is_synced(&self, id: &str) -> Result<bool>;

    /// 幂等插入；已存在时为 no-op
    async fn mark_synced(&self, id: &str) -> Result<()>;

    /// 已记录的条目数
    async fn synced_count(&self) -> Result<u64>;
}

/// 基于 SQLite 的账本
#[derive(Debug, Clone)]
pub struct SqliteSyncLedger {
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
    /// 单次账本 I/O 超时
    io_timeout: Duration,
}

impl SqliteSyncLedger {
    /// 打开 `<data_dir>/data.db`，执行 migration
    pub async fn open(data_dir: &Path, io_timeout: Duration) -> Result<Self> {
        tokio::fs::create_dir_all(data_dir).await
            .map_err(|e| SyncError::LedgerUnavailable(format!("创建数据目录失败: {}", e)))?;
        let path = data_dir.join(LEDGER_FILE);

        let open_path = path.clone();
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection> {
            let mut conn = Connection::open(&open_path)
                .map_err(|e| SyncError::LedgerUnavailable(format!("打开账本数据库失败: {}", e)))?;
            migrate::init_db(&mut conn)?;
            Ok(conn)
        })
        .await
        .map_err(|e| SyncError::LedgerUnavailable(format!("账本初始化任务失败: {}", e)))??;

        info!("✅ 同步账本已打开: {}", path.display());

        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
            io_timeout,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 占住连接，模拟卡住的存储层
    #[cfg(test)]
    pub(crate) fn hold_connection(&self) -> parking_lot::MutexGuard<'_, Connection> {
        self.conn.lock()
    }

    /// 在阻塞线程池上执行一次账本操作，并施加超时
    async fn with_conn<T, F>(&self, op: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        let task = tokio::task::spawn_blocking(move || {
            let guard = conn.lock();
            f(&guard)
        });

        match tokio::time::timeout(self.io_timeout, task).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(e))) => Err(SyncError::LedgerUnavailable(format!("{} 失败: {}", op, e))),
            Ok(Err(e)) => Err(SyncError::LedgerUnavailable(format!("{} 任务异常: {}", op, e))),
            Err(_) => Err(SyncError::LedgerUnavailable(format!(
                "{} 超时 ({:?})",
                op, self.io_timeout
            ))),
        }
    }
}

#[async_trait]
impl SyncLedger for SqliteSyncLedger {
    async fn is_synced(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.with_conn("查询账本", move |conn| {
            conn.query_row("SELECT 1 FROM sync WHERE id = ?1", params![id], |_| Ok(()))
                .optional()
                .map(|row| row.is_some())
        })
        .await
    }

    async fn mark_synced(&self, id: &str) -> Result<()> {
        let owned = id.to_string();
        let inserted = self
            .with_conn("写入账本", move |conn| {
                conn.execute("INSERT OR IGNORE INTO sync (id) VALUES (?1)", params![owned])
            })
            .await?;
        if inserted == 0 {
            debug!("账本已存在该 id，忽略: {}", id);
        }
        Ok(())
    }

    async fn synced_count(&self) -> Result<u64> {
        self.with_conn("统计账本", |conn| {
            conn.query_row("SELECT COUNT(*) FROM sync", [], |row| row.get::<_, i64>(0))
        })
        .await
        .map(|n| n.max(0) as u64)
    }
}
