//! 同步引擎
//!
//! 职责：
//! - 驱动一轮同步：Idle → RefreshingCatalog → Enumerating → Dispatching → Idle
//! - 目录过期时在任何视频扫描开始前刷新一次，失败沿用旧缓存
//! - 并发扫描多个视频；单个视频失败不影响其他视频
//! - 账本不可用时中止整轮

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{ScopeMode, SyncConfig};
use crate::dispatch::{GorgiasDispatcher, TicketDispatcher};
use crate::error::{Result, SyncError};
use crate::model::SyncScope;
use crate::source::{CommentFeed, CommentSource, VideoMetadataCache, YouTubeFeed};
use crate::storage::{StorageManager, SyncLedger, VideoCatalogCache};
use crate::utils::time;

use super::filter::{DedupFilter, VerdictCounts};
use super::retry::RetryPolicy;
use super::{PassPhase, PassReport};

/// 单个范围的扫描结果
#[derive(Debug, Default)]
struct ScopeOutcome {
    counts: VerdictCounts,
    source_failed: bool,
    cancelled: bool,
}

/// 同步引擎
pub struct SyncEngine {
    config: SyncConfig,
    source: CommentSource,
    ledger: Arc<dyn SyncLedger>,
    catalog: VideoCatalogCache,
    dispatcher: Arc<dyn TicketDispatcher>,
    retry_policy: RetryPolicy,
    phase: RwLock<PassPhase>,
    /// 同一进程内同一时刻只允许一轮
    pass_lock: Mutex<()>,
}

impl SyncEngine {
    pub fn new(
        config: SyncConfig,
        feed: Arc<dyn CommentFeed>,
        ledger: Arc<dyn SyncLedger>,
        catalog: VideoCatalogCache,
        dispatcher: Arc<dyn TicketDispatcher>,
    ) -> Self {
        let source = CommentSource::new(feed, config.channel_id.clone(), config.source_timeout());
        let retry_policy = RetryPolicy::from(&config.catalog_retry);
        Self {
            config,
            source,
            ledger,
            catalog,
            dispatcher,
            retry_policy,
            phase: RwLock::new(PassPhase::Idle),
            pass_lock: Mutex::new(()),
        }
    }

    /// 按配置组装：YouTube 评论源 + Gorgias 派发器 + data_dir 下的持久状态
    pub async fn from_config(config: SyncConfig) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.data_dir)?;

        let storage = StorageManager::open(&config.data_dir, config.ledger_timeout()).await?;
        let feed = Arc::new(YouTubeFeed::from_config(&config)?);
        let dispatcher = Arc::new(GorgiasDispatcher::from_config(&config)?);

        Ok(Self::new(
            config,
            feed,
            storage.ledger(),
            storage.catalog().clone(),
            dispatcher,
        ))
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// 当前阶段
    pub fn phase(&self) -> PassPhase {
        *self.phase.read()
    }

    fn enter(&self, phase: PassPhase) {
        let mut current = self.phase.write();
        if *current != phase {
            debug!("同步阶段: {:?} → {:?}", *current, phase);
            *current = phase;
        }
    }

    /// 执行一轮同步
    pub async fn run_pass(&self, cancel: &CancellationToken) -> Result<PassReport> {
        self.run_pass_at(Utc::now(), cancel).await
    }

    /// 以指定的 `now` 执行一轮同步（截止时间与目录过期都以它为准）
    pub async fn run_pass_at(
        &self,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<PassReport> {
        let _pass = self
            .pass_lock
            .try_lock()
            .map_err(|_| SyncError::Config("已有一轮同步正在进行".to_string()))?;

        let started = Instant::now();
        let cutoff = time::cutoff(now, self.config.lookback());
        let mut report = PassReport::new(now, cutoff);

        info!(
            "🔄 开始同步: channel_id={}, mode={:?}, cutoff={}",
            self.config.channel_id,
            self.config.scope_mode,
            cutoff.to_rfc3339()
        );

        let result = self.drive_pass(now, cutoff, cancel, &mut report).await;
        self.enter(PassPhase::Idle);
        report.duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(()) => {
                info!(
                    "✅ 同步结束: dispatched={}, failed={}, duplicate={}, too_old={}, scopes={}/{} (failed {}), cancelled={}, {}ms",
                    report.counts.dispatched,
                    report.counts.dispatch_failed,
                    report.counts.duplicate,
                    report.counts.too_old,
                    report.scopes_scanned,
                    report.scopes_total,
                    report.scopes_failed,
                    report.cancelled,
                    report.duration_ms
                );
                Ok(report)
            }
            Err(e) => {
                error!(
                    "❌ 同步中止: dispatched_before_abort={}, error={}",
                    report.counts.dispatched, e
                );
                Err(e)
            }
        }
    }

    async fn drive_pass(
        &self,
        now: DateTime<Utc>,
        cutoff: DateTime<Utc>,
        cancel: &CancellationToken,
        report: &mut PassReport,
    ) -> Result<()> {
        let scopes = match self.config.scope_mode {
            ScopeMode::Channel => {
                self.enter(PassPhase::Enumerating);
                vec![SyncScope::Channel(self.config.channel_id.clone())]
            }
            ScopeMode::PerVideo => {
                self.enter(PassPhase::RefreshingCatalog);
                let fresh = self.refresh_catalog(now, cancel, report).await;

                self.enter(PassPhase::Enumerating);
                let video_ids = match fresh {
                    Some(ids) => ids,
                    None => self.cached_video_ids().await,
                };
                video_ids.into_iter().map(SyncScope::Video).collect()
            }
        };

        report.scopes_total = scopes.len();
        if scopes.is_empty() {
            info!("📭 没有可扫描的视频，本轮无工作");
            return Ok(());
        }
        if cancel.is_cancelled() {
            report.cancelled = true;
            return Ok(());
        }

        self.enter(PassPhase::Dispatching);

        let metadata = VideoMetadataCache::new();
        let filter = DedupFilter::new(
            self.ledger.clone(),
            self.dispatcher.clone(),
            self.config.dispatch_timeout(),
        );
        // 致命错误时用它让其他扫描在下一条评论前停下
        let scan_cancel = cancel.child_token();

        let mut scans = stream::iter(scopes)
            .map(|scope| self.scan_scope(scope, &filter, &metadata, cutoff, &scan_cancel))
            .buffer_unordered(self.config.max_concurrent_videos.max(1));

        let mut fatal: Option<SyncError> = None;
        while let Some(result) = scans.next().await {
            match result {
                Ok(outcome) => {
                    report.counts.merge(&outcome.counts);
                    report.scopes_scanned += 1;
                    if outcome.source_failed {
                        report.scopes_failed += 1;
                    }
                    if outcome.cancelled {
                        report.cancelled = true;
                    }
                }
                Err(e) => {
                    // 先排空其余扫描，不在派发与写账本之间丢弃任何 future
                    scan_cancel.cancel();
                    if fatal.is_none() {
                        fatal = Some(e);
                    }
                }
            }
        }

        if cancel.is_cancelled() {
            report.cancelled = true;
        }
        debug!("本轮查询视频元信息 {} 个", metadata.len());

        match fatal {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// 目录过期或缺失时完整枚举一次；返回本次刷新得到的列表
    async fn refresh_catalog(
        &self,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
        report: &mut PassReport,
    ) -> Option<Vec<String>> {
        let max_age = self.config.catalog_max_age();
        let needs_refresh = match self.catalog.needs_refresh(now, max_age).await {
            Ok(needs) => needs,
            Err(e) => {
                warn!("⚠️ 读取视频目录缓存失败，按缺失处理: {}", e);
                true
            }
        };
        if !needs_refresh {
            debug!("视频目录缓存未过期，直接使用");
            return None;
        }

        let source = &self.source;
        match self
            .retry_policy
            .run("视频目录枚举", cancel, move || source.enumerate_channel_videos())
            .await
        {
            Ok(video_ids) => {
                if let Err(e) = self.catalog.replace_cache(video_ids.clone(), now).await {
                    warn!("⚠️ 写入视频目录缓存失败，本轮直接使用枚举结果: {}", e);
                }
                report.catalog_refreshed = true;
                Some(video_ids)
            }
            Err(e) => {
                let err = SyncError::CatalogRefresh(e.to_string());
                warn!("⚠️ {}，沿用旧缓存", err);
                report.catalog_refresh_failed = true;
                None
            }
        }
    }

    async fn cached_video_ids(&self) -> Vec<String> {
        match self.catalog.get_cached_video_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                warn!("⚠️ 读取视频目录缓存失败，按空列表处理: {}", e);
                Vec::new()
            }
        }
    }

    /// 扫描一个范围；上游失败只放弃这个范围，账本失败向上传播
    async fn scan_scope(
        &self,
        scope: SyncScope,
        filter: &DedupFilter,
        metadata: &VideoMetadataCache,
        cutoff: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<ScopeOutcome> {
        let mut outcome = ScopeOutcome::default();
        let mut threads = self.source.threads(scope.clone(), metadata);

        loop {
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }
            let thread = match threads.next().await {
                Some(Ok(thread)) => thread,
                Some(Err(e)) => {
                    warn!(
                        "⚠️ 评论源不可用，跳过该范围剩余内容: scope={}, stage=fetch, error={}",
                        scope, e
                    );
                    outcome.source_failed = true;
                    break;
                }
                None => break,
            };

            let thread_outcome = filter.process_thread(&thread, cutoff, cancel).await?;
            outcome.counts.merge(&thread_outcome.counts);
            if thread_outcome.cancelled {
                outcome.cancelled = true;
                break;
            }
        }

        debug!(
            "范围扫描完成: scope={}, evaluated={}, dispatched={}",
            scope,
            outcome.counts.evaluated(),
            outcome.counts.dispatched
        );
        Ok(outcome)
    }
}
