//! 测试替身：内存评论源、记录型派发器、总是失败的账本

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::dispatch::{DispatchFailure, TicketDispatcher, TicketReceipt};
use crate::error::{Result, SyncError};
use crate::model::{Comment, SyncScope, VideoMeta};
use crate::source::{CommentFeed, Page, RawComment, RawThread};
use crate::storage::SyncLedger;

pub fn hours_ago(now: DateTime<Utc>, hours: i64) -> String {
    (now - chrono::Duration::hours(hours)).to_rfc3339()
}

/// 正文固定为 `text of <id>`
pub fn raw_comment(id: &str, author: &str, published_at: &str) -> RawComment {
    RawComment {
        id: id.to_string(),
        author: author.to_string(),
        author_channel_id: Some(format!("UC_{}", author.to_lowercase())),
        text: format!("text of {}", id),
        published_at: published_at.to_string(),
    }
}

pub fn comment_at(id: &str, now: DateTime<Utc>, hours: i64) -> Comment {
    Comment {
        id: id.to_string(),
        author: "Ada".to_string(),
        author_channel_id: Some("UC_ada".to_string()),
        text: format!("text of {}", id),
        published_at: hours_ago(now, hours),
        video_id: "v1".to_string(),
        video_title: None,
        video_thumbnail_url: None,
        is_reply: false,
        parent_text: String::new(),
    }
}

fn paginate<T: Clone>(items: &[T], page_token: Option<&str>, page_size: usize) -> Page<T> {
    let offset = page_token.and_then(|t| t.parse::<usize>().ok()).unwrap_or(0);
    let end = (offset + page_size).min(items.len());
    let slice = items.get(offset..end).unwrap_or_default().to_vec();
    Page {
        items: slice,
        next_page_token: (end < items.len()).then(|| end.to_string()),
    }
}

#[derive(Default)]
struct FeedState {
    threads: Vec<(RawThread, Vec<RawComment>)>,
    videos: Vec<String>,
    metadata: HashMap<String, VideoMeta>,
    failing_threads: HashSet<String>,
    failing_metadata: HashSet<String>,
    failing_video_page: Option<usize>,
    slow_threads: HashMap<String, Duration>,
}

/// 内存评论源，页码即偏移量
pub struct FakeFeed {
    state: Mutex<FeedState>,
    page_size: usize,
    thread_page_calls: AtomicUsize,
    video_page_calls: AtomicUsize,
    metadata_calls: AtomicUsize,
}

impl FakeFeed {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FeedState::default()),
            page_size: 100,
            thread_page_calls: AtomicUsize::new(0),
            video_page_calls: AtomicUsize::new(0),
            metadata_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn add_thread(&self, video_id: &str, top_level: RawComment, replies: Vec<RawComment>) {
        let thread = RawThread {
            video_id: video_id.to_string(),
            top_level,
            total_reply_count: replies.len() as u32,
        };
        self.state.lock().threads.push((thread, replies));
    }

    pub fn set_videos(&self, video_ids: &[&str]) {
        self.state.lock().videos = video_ids.iter().map(|v| v.to_string()).collect();
    }

    pub fn add_video_meta(&self, video_id: &str, title: &str, thumbnail_url: Option<&str>) {
        self.state.lock().metadata.insert(
            video_id.to_string(),
            VideoMeta {
                video_id: video_id.to_string(),
                title: title.to_string(),
                thumbnail_url: thumbnail_url.map(str::to_string),
            },
        );
    }

    pub fn fail_threads(&self, video_id: &str) {
        self.state.lock().failing_threads.insert(video_id.to_string());
    }

    pub fn fail_metadata(&self, video_id: &str) {
        self.state.lock().failing_metadata.insert(video_id.to_string());
    }

    /// 该视频的评论串每页都要等 `delay` 才返回
    pub fn delay_threads(&self, video_id: &str, delay: Duration) {
        self.state.lock().slow_threads.insert(video_id.to_string(), delay);
    }

    /// 视频枚举在第 `page` 页（从 0 开始）失败
    pub fn fail_video_page(&self, page: usize) {
        self.state.lock().failing_video_page = Some(page);
    }

    pub fn thread_page_calls(&self) -> usize {
        self.thread_page_calls.load(Ordering::SeqCst)
    }

    pub fn video_page_calls(&self) -> usize {
        self.video_page_calls.load(Ordering::SeqCst)
    }

    pub fn metadata_calls(&self) -> usize {
        self.metadata_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommentFeed for FakeFeed {
    async fn list_threads(
        &self,
        scope: &SyncScope,
        page_token: Option<&str>,
    ) -> Result<Page<RawThread>> {
        self.thread_page_calls.fetch_add(1, Ordering::SeqCst);
        let delay = match scope {
            SyncScope::Video(id) => self.state.lock().slow_threads.get(id).copied(),
            SyncScope::Channel(_) => None,
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let state = self.state.lock();
        let threads: Vec<RawThread> = match scope {
            SyncScope::Video(id) => {
                if state.failing_threads.contains(id) {
                    return Err(SyncError::source_unavailable(
                        scope.to_string(),
                        "HTTP 403: quotaExceeded",
                    ));
                }
                state
                    .threads
                    .iter()
                    .filter(|(t, _)| &t.video_id == id)
                    .map(|(t, _)| t.clone())
                    .collect()
            }
            SyncScope::Channel(_) => state.threads.iter().map(|(t, _)| t.clone()).collect(),
        };
        Ok(paginate(&threads, page_token, self.page_size))
    }

    async fn list_replies(
        &self,
        parent_id: &str,
        page_token: Option<&str>,
    ) -> Result<Page<RawComment>> {
        let state = self.state.lock();
        let replies = state
            .threads
            .iter()
            .find(|(t, _)| t.top_level.id == parent_id)
            .map(|(_, replies)| replies.clone())
            .unwrap_or_default();
        Ok(paginate(&replies, page_token, self.page_size))
    }

    async fn list_channel_videos(
        &self,
        _channel_id: &str,
        page_token: Option<&str>,
    ) -> Result<Page<String>> {
        self.video_page_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock();
        let page = paginate(&state.videos, page_token, self.page_size);
        let index = page_token.and_then(|t| t.parse::<usize>().ok()).unwrap_or(0) / self.page_size;
        if state.failing_video_page == Some(index) {
            return Err(SyncError::source_unavailable("videos", "HTTP 500: backendError"));
        }
        Ok(page)
    }

    async fn video_metadata(&self, video_id: &str) -> Result<Option<VideoMeta>> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock();
        if state.failing_metadata.contains(video_id) {
            return Err(SyncError::source_unavailable(format!("video:{}", video_id), "HTTP 404"));
        }
        Ok(state.metadata.get(video_id).cloned())
    }
}

/// 记录每次派发；可按 id 配置失败
pub struct RecordingDispatcher {
    dispatched: Mutex<Vec<Comment>>,
    failures: Mutex<HashMap<String, DispatchFailure>>,
    attempts: AtomicUsize,
    delay: Option<Duration>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self {
            dispatched: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            attempts: AtomicUsize::new(0),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn fail_for(&self, comment_id: &str, failure: DispatchFailure) {
        self.failures.lock().insert(comment_id.to_string(), failure);
    }

    pub fn heal(&self, comment_id: &str) {
        self.failures.lock().remove(comment_id);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// 成功派发的评论，按派发顺序
    pub fn dispatched(&self) -> Vec<Comment> {
        self.dispatched.lock().clone()
    }

    pub fn dispatched_ids(&self) -> Vec<String> {
        self.dispatched.lock().iter().map(|c| c.id.clone()).collect()
    }
}

#[async_trait]
impl TicketDispatcher for RecordingDispatcher {
    async fn dispatch(
        &self,
        comment: &Comment,
    ) -> std::result::Result<TicketReceipt, DispatchFailure> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let failure = self.failures.lock().get(&comment.id).cloned();
        if let Some(failure) = failure {
            return Err(failure);
        }
        let mut dispatched = self.dispatched.lock();
        dispatched.push(comment.clone());
        Ok(TicketReceipt {
            ticket_id: Some(dispatched.len() as u64),
        })
    }
}

/// 存储层不可用的账本
pub struct FailingLedger;

#[async_trait]
impl SyncLedger for FailingLedger {
    async fn is_synced(&self, _id: &str) -> Result<bool> {
        Err(SyncError::LedgerUnavailable("database is locked".to_string()))
    }

    async fn mark_synced(&self, _id: &str) -> Result<()> {
        Err(SyncError::LedgerUnavailable("database is locked".to_string()))
    }

    async fn synced_count(&self) -> Result<u64> {
        Err(SyncError::LedgerUnavailable("database is locked".to_string()))
    }
}
