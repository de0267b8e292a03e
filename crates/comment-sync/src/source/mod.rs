//! 评论源适配器
//!
//! `CommentFeed` 是上游分页 API 的原始形态（一次一页），`CommentSource` 在其上
//! 提供调用方真正需要的东西：
//! - 透明翻页的惰性评论串流，每次调用都从第一页重新开始
//! - 有回复的顶层评论会展开完整的回复列表（按发布时间从新到旧）
//! - 频道自己发布的评论/回复在这里就被剔除
//! - 每次上游调用都带超时，失败统一为 `SourceUnavailable`，不做内部重试

pub mod metadata;
pub mod youtube;

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, SyncError};
use crate::model::{Comment, CommentThread, SyncScope, VideoMeta};

pub use metadata::VideoMetadataCache;
pub use youtube::YouTubeFeed;

/// 上游返回的一条评论（顶层或回复）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawComment {
    pub id: String,
    pub author: String,
    pub author_channel_id: Option<String>,
    pub text: String,
    pub published_at: String,
}

/// 上游返回的一个评论串（不含回复正文）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawThread {
    pub video_id: String,
    pub top_level: RawComment,
    pub total_reply_count: u32,
}

/// 一页结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_page_token: Option<String>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_page_token: None,
        }
    }
}

/// 上游分页 API
#[async_trait]
pub trait CommentFeed: Send + Sync {
    /// 按时间倒序列出评论串
    async fn list_threads(
        &self,
        scope: &SyncScope,
        page_token: Option<&str>,
    ) -> Result<Page<RawThread>>;

    /// 列出某条顶层评论的回复
    async fn list_replies(
        &self,
        parent_id: &str,
        page_token: Option<&str>,
    ) -> Result<Page<RawComment>>;

    /// 列出频道的视频 id
    async fn list_channel_videos(
        &self,
        channel_id: &str,
        page_token: Option<&str>,
    ) -> Result<Page<String>>;

    /// 查询视频标题与缩略图；视频不存在时返回 None
    async fn video_metadata(&self, video_id: &str) -> Result<Option<VideoMeta>>;
}

/// 翻页游标
struct PageCursor<T> {
    buffered: VecDeque<T>,
    next_page_token: Option<String>,
    exhausted: bool,
}

impl<T> PageCursor<T> {
    fn new() -> Self {
        Self {
            buffered: VecDeque::new(),
            next_page_token: None,
            exhausted: false,
        }
    }

    fn absorb(&mut self, page: Page<T>) {
        self.buffered.extend(page.items);
        self.exhausted = page.next_page_token.is_none();
        self.next_page_token = page.next_page_token;
    }
}

/// 评论源适配器
#[derive(Clone)]
pub struct CommentSource {
    feed: Arc<dyn CommentFeed>,
    channel_id: String,
    timeout: Duration,
}

impl CommentSource {
    pub fn new(
        feed: Arc<dyn CommentFeed>,
        channel_id: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            feed,
            channel_id: channel_id.into(),
            timeout,
        }
    }

    /// 给上游调用加超时
    async fn call<T, F>(&self, scope: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::source_unavailable(
                scope,
                format!("上游请求超时 ({:?})", self.timeout),
            )),
        }
    }

    /// 指定范围内的评论串流，最新的在前
    ///
    /// 流是惰性的：消费方停止拉取后不会再请求下一页。
    pub fn threads<'a>(
        &'a self,
        scope: SyncScope,
        metadata: &'a VideoMetadataCache,
    ) -> BoxStream<'a, Result<CommentThread>> {
        stream::try_unfold(PageCursor::<RawThread>::new(), move |mut cursor| {
            let scope = scope.clone();
            async move {
                loop {
                    if let Some(raw) = cursor.buffered.pop_front() {
                        let thread = self.build_thread(raw, metadata).await?;
                        // 整串都是频道自己的评论时不产出
                        if thread.is_empty() {
                            continue;
                        }
                        return Ok(Some((thread, cursor)));
                    }
                    if cursor.exhausted {
                        return Ok(None);
                    }

                    let page = self
                        .call(
                            &scope.to_string(),
                            self.feed.list_threads(&scope, cursor.next_page_token.as_deref()),
                        )
                        .await?;
                    debug!("📄 {} 评论串分页: {} 条", scope, page.items.len());
                    cursor.absorb(page);
                }
            }
        })
        .boxed()
    }

    /// 组装一个评论串：顶层评论 + 全部回复（从新到旧），剔除频道自己的评论
    async fn build_thread(
        &self,
        raw: RawThread,
        metadata: &VideoMetadataCache,
    ) -> Result<CommentThread> {
        let meta = metadata
            .get_or_fetch(self.feed.as_ref(), &raw.video_id, self.timeout)
            .await;

        let top_level = to_comment(raw.top_level.clone(), &raw.video_id, meta.as_ref(), None);

        let mut replies = Vec::new();
        if raw.total_reply_count > 0 {
            for reply in self.fetch_replies(&raw.top_level.id).await? {
                replies.push(to_comment(
                    reply,
                    &raw.video_id,
                    meta.as_ref(),
                    Some(&raw.top_level.text),
                ));
            }
        }

        replies.retain(|c| !c.is_authored_by(&self.channel_id));
        sort_newest_first(&mut replies);

        Ok(CommentThread {
            top_level: Some(top_level).filter(|c| !c.is_authored_by(&self.channel_id)),
            replies,
        })
    }

    /// 拉取一条顶层评论的全部回复
    async fn fetch_replies(&self, parent_id: &str) -> Result<Vec<RawComment>> {
        let scope = format!("replies:{}", parent_id);
        let mut replies = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self
                .call(&scope, self.feed.list_replies(parent_id, page_token.as_deref()))
                .await?;
            replies.extend(page.items);
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(replies)
    }

    /// 完整枚举频道视频：要么返回全部 id，要么返回错误，不会返回部分列表
    pub async fn enumerate_channel_videos(&self) -> Result<Vec<String>> {
        let scope = format!("videos:{}", self.channel_id);
        let mut video_ids = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self
                .call(
                    &scope,
                    self.feed.list_channel_videos(&self.channel_id, page_token.as_deref()),
                )
                .await?;
            video_ids.extend(page.items);
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        info!("📼 频道视频枚举完成: channel_id={}, {} 个视频", self.channel_id, video_ids.len());
        Ok(video_ids)
    }
}

fn to_comment(
    raw: RawComment,
    video_id: &str,
    meta: Option<&VideoMeta>,
    parent_text: Option<&str>,
) -> Comment {
    Comment {
        id: raw.id,
        author: raw.author,
        author_channel_id: raw.author_channel_id,
        text: raw.text,
        published_at: raw.published_at,
        video_id: video_id.to_string(),
        video_title: meta.map(|m| m.title.clone()),
        video_thumbnail_url: meta.and_then(|m| m.thumbnail_url.clone()),
        is_reply: parent_text.is_some(),
        parent_text: parent_text.unwrap_or_default().to_string(),
    }
}

/// 按发布时间从新到旧；无法解析时间的排在最后
fn sort_newest_first(comments: &mut [Comment]) {
    comments.sort_by(|a, b| b.published_at().cmp(&a.published_at()));
}
