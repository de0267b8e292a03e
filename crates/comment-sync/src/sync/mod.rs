//! 同步模块
//!
//! 一轮同步：刷新视频目录（如已过期）→ 枚举评论 → 时间窗口过滤 + 去重 → 派发 → 写账本。

pub mod engine;
pub mod filter;
pub mod retry;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use engine::SyncEngine;
pub use filter::{classify_window, DedupFilter, ThreadOutcome, Verdict, VerdictCounts, WindowCheck};
pub use retry::RetryPolicy;

/// 一轮同步所处的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PassPhase {
    /// 空闲
    Idle,
    /// 检查并刷新视频目录缓存
    RefreshingCatalog,
    /// 确定本轮要扫描的范围
    Enumerating,
    /// 拉取评论、过滤、派发
    Dispatching,
}

/// 一轮同步的汇总
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassReport {
    pub started_at: DateTime<Utc>,
    /// 本轮的截止时间（`started_at - lookback`）
    pub cutoff: DateTime<Utc>,
    /// 本轮是否完成了一次目录刷新
    pub catalog_refreshed: bool,
    /// 目录刷新是否失败（沿用旧缓存或空列表）
    pub catalog_refresh_failed: bool,
    /// 本轮计划扫描的范围数（视频数，或频道模式下的 1）
    pub scopes_total: usize,
    pub scopes_scanned: usize,
    /// 上游不可用导致中途放弃的范围数
    pub scopes_failed: usize,
    pub counts: VerdictCounts,
    pub cancelled: bool,
    pub duration_ms: u64,
}

impl PassReport {
    pub fn new(started_at: DateTime<Utc>, cutoff: DateTime<Utc>) -> Self {
        Self {
            started_at,
            cutoff,
            catalog_refreshed: false,
            catalog_refresh_failed: false,
            scopes_total: 0,
            scopes_scanned: 0,
            scopes_failed: 0,
            counts: VerdictCounts::default(),
            cancelled: false,
            duration_ms: 0,
        }
    }

    pub fn dispatched(&self) -> u64 {
        self.counts.dispatched
    }
}
