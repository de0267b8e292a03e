//! 时间窗口过滤 + 去重
//!
//! 每条评论按固定顺序判定：
//! 1. 发布时间无法解析 → `InvalidTimestamp`
//! 2. 早于截止时间 → `TooOld`
//! 3. 账本里已有 → `Duplicate`
//! 4. 否则派发；成功后写账本，失败不写
//!
//! 3、4 两步在同一个 per-id 锁内完成，并发扫描时同一个 id 不会被派发两次。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::dispatch::{DispatchFailure, TicketDispatcher, TicketReceipt};
use crate::error::{Result, SyncError};
use crate::model::{Comment, CommentThread};
use crate::storage::SyncLedger;

/// 单条评论的判定结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    InvalidTimestamp,
    TooOld,
    Duplicate,
    Dispatched(TicketReceipt),
    DispatchFailed(DispatchFailure),
}

/// 时间窗口判定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowCheck {
    Invalid,
    TooOld,
    InWindow(DateTime<Utc>),
}

/// 只看时间，不碰账本
pub fn classify_window(comment: &Comment, cutoff: DateTime<Utc>) -> WindowCheck {
    match comment.published_at() {
        None => WindowCheck::Invalid,
        Some(at) if at < cutoff => WindowCheck::TooOld,
        Some(at) => WindowCheck::InWindow(at),
    }
}

/// 各判定结果计数
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerdictCounts {
    pub invalid_timestamp: u64,
    pub too_old: u64,
    pub duplicate: u64,
    pub dispatched: u64,
    pub dispatch_failed: u64,
    /// 因同一评论串内遇到过旧回复而未评估的回复数
    pub short_circuited: u64,
}

impl VerdictCounts {
    pub fn record(&mut self, verdict: &Verdict) {
        match verdict {
            Verdict::InvalidTimestamp => self.invalid_timestamp += 1,
            Verdict::TooOld => self.too_old += 1,
            Verdict::Duplicate => self.duplicate += 1,
            Verdict::Dispatched(_) => self.dispatched += 1,
            Verdict::DispatchFailed(_) => self.dispatch_failed += 1,
        }
    }

    pub fn merge(&mut self, other: &VerdictCounts) {
        self.invalid_timestamp += other.invalid_timestamp;
        self.too_old += other.too_old;
        self.duplicate += other.duplicate;
        self.dispatched += other.dispatched;
        self.dispatch_failed += other.dispatch_failed;
        self.short_circuited += other.short_circuited;
    }

    /// 被评估过的评论总数
    pub fn evaluated(&self) -> u64 {
        self.invalid_timestamp
            + self.too_old
            + self.duplicate
            + self.dispatched
            + self.dispatch_failed
    }
}

/// 一个评论串的处理结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadOutcome {
    pub counts: VerdictCounts,
    pub cancelled: bool,
}

/// 窗口过滤与去重引擎
///
/// 每轮同步创建一个，per-id 锁表随本轮结束释放。
pub struct DedupFilter {
    ledger: Arc<dyn SyncLedger>,
    dispatcher: Arc<dyn TicketDispatcher>,
    dispatch_timeout: Duration,
    /// 去重锁（每个评论 id 一个锁，防止并发派发）
    dedup_locks: parking_lot::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DedupFilter {
    pub fn new(
        ledger: Arc<dyn SyncLedger>,
        dispatcher: Arc<dyn TicketDispatcher>,
        dispatch_timeout: Duration,
    ) -> Self {
        Self {
            ledger,
            dispatcher,
            dispatch_timeout,
            dedup_locks: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    fn dedup_lock(&self, comment_id: &str) -> Arc<Mutex<()>> {
        self.dedup_locks
            .lock()
            .entry(comment_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// 判定并处理单条评论
    ///
    /// 只有账本不可用时返回 Err，其余情况都体现在 `Verdict` 里。
    pub async fn process_comment(
        &self,
        comment: &Comment,
        cutoff: DateTime<Utc>,
    ) -> Result<Verdict> {
        match classify_window(comment, cutoff) {
            WindowCheck::Invalid => {
                let err = SyncError::InvalidTimestamp {
                    comment_id: comment.id.clone(),
                    value: comment.published_at.clone(),
                };
                warn!("⚠️ 跳过评论: video_id={}, stage=window, {}", comment.video_id, err);
                return Ok(Verdict::InvalidTimestamp);
            }
            WindowCheck::TooOld => {
                debug!(
                    "评论超出时间窗口: comment_id={}, published_at={}",
                    comment.id, comment.published_at
                );
                return Ok(Verdict::TooOld);
            }
            WindowCheck::InWindow(_) => {}
        }

        let lock = self.dedup_lock(&comment.id);
        let _guard = lock.lock().await;

        if self.ledger.is_synced(&comment.id).await? {
            debug!("评论已同步过: comment_id={}", comment.id);
            return Ok(Verdict::Duplicate);
        }

        let attempt = self.dispatcher.dispatch(comment);
        let dispatched = match tokio::time::timeout(self.dispatch_timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(DispatchFailure::SinkUnavailable(format!(
                "派发超时 ({:?})",
                self.dispatch_timeout
            ))),
        };

        match dispatched {
            Ok(receipt) => {
                if let Err(e) = self.ledger.mark_synced(&comment.id).await {
                    // 工单已创建但账本没写成功，下一轮可能重复派发，必须中止
                    error!(
                        "❌ 写入账本失败: comment_id={}, video_id={}, stage=mark_synced, error={}",
                        comment.id, comment.video_id, e
                    );
                    return Err(e);
                }
                info!(
                    "✅ 评论已同步: comment_id={}, video_id={}, reply={}",
                    comment.id, comment.video_id, comment.is_reply
                );
                Ok(Verdict::Dispatched(receipt))
            }
            Err(failure) => {
                warn!(
                    "❌ 派发失败，下一轮重试: comment_id={}, video_id={}, stage=dispatch, kind={}, error={}",
                    comment.id,
                    comment.video_id,
                    failure.kind(),
                    failure
                );
                Ok(Verdict::DispatchFailed(failure))
            }
        }
    }

    /// 处理一个评论串
    ///
    /// 顶层评论过旧不影响它的回复；回复列表已按时间倒序排好，
    /// 遇到第一条过旧回复即可跳过其余回复。每两条评论之间检查取消。
    pub async fn process_thread(
        &self,
        thread: &CommentThread,
        cutoff: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<ThreadOutcome> {
        let mut outcome = ThreadOutcome::default();

        if let Some(top) = &thread.top_level {
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                return Ok(outcome);
            }
            let verdict = self.process_comment(top, cutoff).await?;
            outcome.counts.record(&verdict);
        }

        for (index, reply) in thread.replies.iter().enumerate() {
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }
            let verdict = self.process_comment(reply, cutoff).await?;
            outcome.counts.record(&verdict);

            if verdict == Verdict::TooOld {
                let remaining = (thread.replies.len() - index - 1) as u64;
                if remaining > 0 {
                    debug!(
                        "回复已超出时间窗口，跳过同串剩余 {} 条: comment_id={}",
                        remaining, reply.id
                    );
                }
                outcome.counts.short_circuited += remaining;
                break;
            }
        }

        Ok(outcome)
    }
}
