//! 视频目录缓存
//!
//! 全频道视频枚举是昂贵的分页调用，这里把完整的视频 id 列表与刷新时间
//! 作为同一条记录存入 KV，读写都是整条替换：列表和时间戳不会来自两次不同的刷新。
//! 列表要么为空（未填充或已失效），要么来自一次完整的枚举。

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;
use crate::storage::kv::{keys, KvStore};
use crate::utils::time;

/// 默认最大缓存时长：2 天
pub const DEFAULT_CATALOG_MAX_AGE: Duration = Duration::from_secs(2 * 24 * 3600);

/// 持久化的目录记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRecord {
    /// 按枚举顺序排列的视频 id
    pub video_ids: Vec<String>,
    /// 最近一次完整刷新的时间（UTC 毫秒）
    pub last_refreshed_at: i64,
}

impl CatalogRecord {
    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        time::from_millis(self.last_refreshed_at)
    }
}

/// 视频目录缓存
#[derive(Debug, Clone)]
pub struct VideoCatalogCache {
    kv: KvStore,
}

impl VideoCatalogCache {
    pub fn new(kv: KvStore) -> Self {
        Self { kv }
    }

    /// 读取完整记录；不存在或已清空时返回 None
    pub async fn load(&self) -> Result<Option<CatalogRecord>> {
        let record: Option<CatalogRecord> = self.kv.get(keys::VIDEO_CATALOG).await?;
        Ok(record.filter(|r| !r.video_ids.is_empty()))
    }

    /// 缓存的视频 id；缓存缺失或已清空时为空
    pub async fn get_cached_video_ids(&self) -> Result<Vec<String>> {
        Ok(self.load().await?.map(|r| r.video_ids).unwrap_or_default())
    }

    /// 原子覆盖整个列表与刷新时间
    pub async fn replace_cache(
        &self,
        video_ids: Vec<String>,
        observed_at: DateTime<Utc>,
    ) -> Result<()> {
        let record = CatalogRecord {
            video_ids,
            last_refreshed_at: observed_at.timestamp_millis(),
        };
        self.kv.set(keys::VIDEO_CATALOG, &record).await?;
        info!(
            "📼 视频目录已刷新: {} 个视频, refreshed_at={}",
            record.video_ids.len(),
            observed_at.to_rfc3339()
        );
        Ok(())
    }

    /// 显式失效：列表与时间戳一起清除
    pub async fn invalidate(&self) -> Result<()> {
        if self.kv.delete(keys::VIDEO_CATALOG).await? {
            debug!("视频目录缓存已失效");
        }
        Ok(())
    }

    /// 过期策略：`now - observed_at > max_age`
    pub fn is_stale(observed_at: DateTime<Utc>, now: DateTime<Utc>, max_age: Duration) -> bool {
        match chrono::Duration::from_std(max_age) {
            Ok(max_age) => now.signed_duration_since(observed_at) > max_age,
            // 超出 chrono 可表示范围的 max_age 视为永不过期
            Err(_) => false,
        }
    }

    /// 当前缓存在 `now` 时刻是否需要重新枚举（缺失即需要）
    pub async fn needs_refresh(&self, now: DateTime<Utc>, max_age: Duration) -> Result<bool> {
        Ok(match self.load().await? {
            Some(record) => match record.refreshed_at() {
                Some(at) => Self::is_stale(at, now, max_age),
                None => true,
            },
            None => true,
        })
    }
}
