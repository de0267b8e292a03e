//! 视频元信息缓存
//!
//! 生命周期与一轮同步相同：由编排器创建，以引用传入拉取路径，本轮结束即丢弃。
//! 查询失败也会被缓存（记为 None），同一轮里不会对同一个视频反复请求。

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::model::VideoMeta;

use super::CommentFeed;

#[derive(Debug, Default)]
pub struct VideoMetadataCache {
    entries: Mutex<HashMap<String, Option<VideoMeta>>>,
}

impl VideoMetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已缓存（含失败）的视频数
    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn get(&self, video_id: &str) -> Option<Option<VideoMeta>> {
        self.entries.lock().get(video_id).cloned()
    }

    /// 命中缓存直接返回，否则向上游查询一次
    pub async fn get_or_fetch(
        &self,
        feed: &dyn CommentFeed,
        video_id: &str,
        timeout: Duration,
    ) -> Option<VideoMeta> {
        if let Some(cached) = self.get(video_id) {
            return cached;
        }

        // 查询期间不持有锁，并发扫描时最多重复查询一次
        let meta = match tokio::time::timeout(timeout, feed.video_metadata(video_id)).await {
            Ok(Ok(meta)) => {
                debug!("视频元信息: video_id={}, found={}", video_id, meta.is_some());
                meta
            }
            Ok(Err(e)) => {
                warn!("⚠️ 获取视频元信息失败: video_id={}, error={}", video_id, e);
                None
            }
            Err(_) => {
                warn!("⚠️ 获取视频元信息超时: video_id={}", video_id);
                None
            }
        };

        self.entries
            .lock()
            .entry(video_id.to_string())
            .or_insert(meta)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeFeed;

    #[tokio::test]
    async fn test_lookup_is_cached_per_video() {
        let feed = FakeFeed::new();
        feed.add_video_meta("v1", "Unboxing", Some("https://img/v1.jpg"));
        let cache = VideoMetadataCache::new();

        let first = cache.get_or_fetch(&feed, "v1", Duration::from_secs(1)).await;
        let second = cache.get_or_fetch(&feed, "v1", Duration::from_secs(1)).await;

        assert_eq!(first.as_ref().map(|m| m.title.as_str()), Some("Unboxing"));
        assert_eq!(first, second);
        assert_eq!(feed.metadata_calls(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_lookup_is_cached_as_none() {
        let feed = FakeFeed::new();
        feed.fail_metadata("v2");
        let cache = VideoMetadataCache::new();

        assert!(cache.get_or_fetch(&feed, "v2", Duration::from_secs(1)).await.is_none());
        assert!(cache.get_or_fetch(&feed, "v2", Duration::from_secs(1)).await.is_none());
        assert_eq!(feed.metadata_calls(), 1);
        assert_eq!(cache.get("v2"), Some(None));
    }
}
