//! 同步配置
//!
//! 配置来源只有两种：代码里用 `SyncConfig::builder()` 组装，或由 `SyncConfig::from_env()`
//! 从环境变量读取。凭证在这里一次性变成强类型，之后显式传给各个组件。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, SyncError};
use crate::utils::TimezoneConfig;

/// 旧脚本使用的默认工单 API 地址
pub const DEFAULT_TICKET_API_URL: &str = "https://truecable.gorgias.com/api/tickets";
pub const DEFAULT_YOUTUBE_API_BASE: &str = "https://www.googleapis.com/youtube/v3";
pub const DEFAULT_WATCH_URL: &str = "https://www.youtube.com/watch";

/// HTTP 客户端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpClientConfig {
    /// 连接超时（秒）
    pub connect_timeout_secs: Option<u64>,
    /// 请求超时（秒）
    pub request_timeout_secs: Option<u64>,
    pub user_agent: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: Some(10),
            request_timeout_secs: Some(30),
            user_agent: Some(format!("comment-sync/{}", crate::version::VERSION)),
        }
    }
}

/// 评论拉取范围模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScopeMode {
    /// 先读视频目录，再逐个视频拉取
    PerVideo,
    /// 直接拉取与频道相关的全部评论串，不使用目录缓存
    Channel,
}

impl ScopeMode {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "video" | "per_video" | "per-video" => Some(ScopeMode::PerVideo),
            "channel" => Some(ScopeMode::Channel),
            _ => None,
        }
    }
}

/// 上游评论源配置
#[derive(Clone, Serialize, Deserialize)]
pub struct YouTubeConfig {
    pub api_key: String,
    pub api_base_url: String,
    /// 深链接前缀
    pub watch_url: String,
    /// 每页条数（上游上限 100）
    pub page_size: u32,
}

impl Default for YouTubeConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base_url: DEFAULT_YOUTUBE_API_BASE.to_string(),
            watch_url: DEFAULT_WATCH_URL.to_string(),
            page_size: 100,
        }
    }
}

impl fmt::Debug for YouTubeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("YouTubeConfig")
            .field("api_key", &"***")
            .field("api_base_url", &self.api_base_url)
            .field("watch_url", &self.watch_url)
            .field("page_size", &self.page_size)
            .finish()
    }
}

/// 工单系统凭证
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TicketCredentials {
    /// `Authorization: Bearer <token>`
    Bearer { token: String },
    /// HTTP Basic（用户邮箱 + API key）
    Basic { username: String, api_key: String },
}

impl TicketCredentials {
    pub fn is_empty(&self) -> bool {
        match self {
            TicketCredentials::Bearer { token } => token.is_empty(),
            TicketCredentials::Basic { username, api_key } => {
                username.is_empty() || api_key.is_empty()
            }
        }
    }
}

impl fmt::Debug for TicketCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TicketCredentials::Bearer { .. } => f.write_str("Bearer(***)"),
            TicketCredentials::Basic { username, .. } => write!(f, "Basic({}:***)", username),
        }
    }
}

/// 工单下游配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketConfig {
    pub api_url: String,
    pub credentials: TicketCredentials,
    /// 入站消息的发件人邮箱（部分工单系统要求）
    pub sender_email: Option<String>,
    pub tags: Vec<String>,
    pub assignee_user_id: Option<u64>,
    /// 工单正文中时间的显示时区
    pub timezone: TimezoneConfig,
}

impl Default for TicketConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_TICKET_API_URL.to_string(),
            credentials: TicketCredentials::Bearer { token: String::new() },
            sender_email: None,
            tags: vec!["YouTube".to_string(), "Comment".to_string()],
            assignee_user_id: None,
            timezone: TimezoneConfig::utc(),
        }
    }
}

/// 重试配置（仅用于视频目录枚举）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// 最大重试次数（不含首次尝试）
    pub max_retries: u32,
    /// 基础延迟（毫秒）
    pub base_delay_ms: u64,
    /// 最大延迟（毫秒）
    pub max_delay_ms: u64,
    /// 指数退避因子
    pub backoff_factor: f64,
    /// 随机抖动因子 (0.0-1.0)
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_factor: 2.0,
            jitter_factor: 0.1,
        }
    }
}

/// 同步配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// 持久状态目录（账本 + 目录缓存）
    pub data_dir: PathBuf,
    /// 频道 id，同时是排除自评论的身份
    pub channel_id: String,
    pub youtube: YouTubeConfig,
    pub ticket: TicketConfig,
    /// 回看窗口（秒）
    pub lookback_secs: u64,
    /// 视频目录最大缓存时长（秒）
    pub catalog_max_age_secs: u64,
    pub scope_mode: ScopeMode,
    /// 并发扫描的视频数
    pub max_concurrent_videos: usize,
    /// 单次上游调用超时（秒）
    pub source_timeout_secs: u64,
    /// 单次派发超时（秒）
    pub dispatch_timeout_secs: u64,
    /// 单次账本 I/O 超时（秒）
    pub ledger_timeout_secs: u64,
    pub http_client_config: HttpClientConfig,
    pub catalog_retry: RetryConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            channel_id: String::new(),
            youtube: YouTubeConfig::default(),
            ticket: TicketConfig::default(),
            lookback_secs: 24 * 3600,
            catalog_max_age_secs: 2 * 24 * 3600,
            scope_mode: ScopeMode::PerVideo,
            max_concurrent_videos: 4,
            source_timeout_secs: 30,
            dispatch_timeout_secs: 30,
            ledger_timeout_secs: 10,
            http_client_config: HttpClientConfig::default(),
            catalog_retry: RetryConfig::default(),
        }
    }
}

impl SyncConfig {
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::new()
    }

    pub fn lookback(&self) -> Duration {
        Duration::from_secs(self.lookback_secs)
    }

    pub fn catalog_max_age(&self) -> Duration {
        Duration::from_secs(self.catalog_max_age_secs)
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source_timeout_secs)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_secs)
    }

    pub fn ledger_timeout(&self) -> Duration {
        Duration::from_secs(self.ledger_timeout_secs)
    }

    /// 从进程环境变量读取
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 从任意键值来源读取（便于测试）
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |key: &str| {
            get(key).ok_or_else(|| SyncError::Config(format!("缺少环境变量 {}", key)))
        };

        let mut builder = SyncConfig::builder()
            .channel_id(require("CHANNEL_ID")?)
            .youtube_api_key(require("YOUTUBE_API_KEY")?);

        let api_key = require("GORGIAS_API_KEY")?;
        builder = builder.credentials(match get("GORGIAS_USERNAME") {
            Some(username) => TicketCredentials::Basic { username, api_key },
            None => TicketCredentials::Bearer { token: api_key },
        });

        if let Some(url) = get("GORGIAS_API_URL") {
            builder = builder.ticket_api_url(url);
        }
        if let Some(email) = get("GORGIAS_SENDER_EMAIL") {
            builder = builder.sender_email(email);
        }
        if let Some(raw) = get("GORGIAS_ASSIGNEE_ID") {
            let id = raw.parse::<u64>().map_err(|_| {
                SyncError::Config(format!("GORGIAS_ASSIGNEE_ID 不是合法数字: {}", raw))
            })?;
            builder = builder.assignee_user_id(id);
        }
        if let Some(dir) = get("COMMENT_SYNC_DATA_DIR") {
            builder = builder.data_dir(dir);
        }
        if let Some(hours) = parse_u64(&get, "COMMENT_SYNC_LOOKBACK_HOURS")? {
            builder = builder.lookback(hours_to_duration("COMMENT_SYNC_LOOKBACK_HOURS", hours)?);
        }
        if let Some(hours) = parse_u64(&get, "COMMENT_SYNC_CATALOG_MAX_AGE_HOURS")? {
            let max_age = hours_to_duration("COMMENT_SYNC_CATALOG_MAX_AGE_HOURS", hours)?;
            builder = builder.catalog_max_age(max_age);
        }
        if let Some(raw) = get("COMMENT_SYNC_SCOPE") {
            let mode = ScopeMode::parse(&raw)
                .ok_or_else(|| SyncError::Config(format!("COMMENT_SYNC_SCOPE 取值无效: {}", raw)))?;
            builder = builder.scope_mode(mode);
        }
        if let Some(n) = parse_u64(&get, "COMMENT_SYNC_CONCURRENCY")? {
            builder = builder.max_concurrent_videos(n as usize);
        }
        if let Some(raw) = get("COMMENT_SYNC_TZ_OFFSET_MINUTES") {
            let minutes = raw.parse::<i32>().map_err(|_| {
                SyncError::Config(format!(
                    "COMMENT_SYNC_TZ_OFFSET_MINUTES 不是合法数字: {}",
                    raw
                ))
            })?;
            builder = builder.timezone(TimezoneConfig::from_minutes(minutes));
        }

        let config = builder.build();
        config.validate()?;
        Ok(config)
    }

    /// 校验必填项
    pub fn validate(&self) -> Result<()> {
        if self.channel_id.is_empty() {
            return Err(SyncError::Config("channel_id 不能为空".to_string()));
        }
        if self.youtube.api_key.is_empty() {
            return Err(SyncError::Config("YouTube API key 不能为空".to_string()));
        }
        if self.ticket.credentials.is_empty() {
            return Err(SyncError::Config("工单系统凭证不能为空".to_string()));
        }
        if self.ticket.api_url.is_empty() {
            return Err(SyncError::Config("工单 API 地址不能为空".to_string()));
        }
        if self.max_concurrent_videos == 0 {
            return Err(SyncError::Config("max_concurrent_videos 至少为 1".to_string()));
        }
        if self.youtube.page_size == 0 || self.youtube.page_size > 100 {
            return Err(SyncError::Config(format!(
                "page_size 必须在 1..=100 之间: {}",
                self.youtube.page_size
            )));
        }
        Ok(())
    }
}

fn parse_u64<F>(get: &F, key: &str) -> Result<Option<u64>>
where
    F: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|raw| {
            raw.parse::<u64>()
                .map_err(|_| SyncError::Config(format!("{} 不是合法数字: {}", key, raw)))
        })
        .transpose()
}

fn hours_to_duration(key: &str, hours: u64) -> Result<Duration> {
    hours
        .checked_mul(3600)
        .map(Duration::from_secs)
        .ok_or_else(|| SyncError::Config(format!("{} 超出范围: {}", key, hours)))
}

/// 同步配置构建器
pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl SyncConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SyncConfig::default(),
        }
    }

    pub fn data_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.data_dir = path.as_ref().to_path_buf();
        self
    }

    pub fn channel_id<S: Into<String>>(mut self, channel_id: S) -> Self {
        self.config.channel_id = channel_id.into();
        self
    }

    pub fn youtube_api_key<S: Into<String>>(mut self, key: S) -> Self {
        self.config.youtube.api_key = key.into();
        self
    }

    pub fn youtube_api_base_url<S: Into<String>>(mut self, url: S) -> Self {
        self.config.youtube.api_base_url = url.into();
        self
    }

    pub fn watch_url<S: Into<String>>(mut self, url: S) -> Self {
        self.config.youtube.watch_url = url.into();
        self
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.config.youtube.page_size = page_size;
        self
    }

    pub fn ticket_api_url<S: Into<String>>(mut self, url: S) -> Self {
        self.config.ticket.api_url = url.into();
        self
    }

    pub fn credentials(mut self, credentials: TicketCredentials) -> Self {
        self.config.ticket.credentials = credentials;
        self
    }

    pub fn sender_email<S: Into<String>>(mut self, email: S) -> Self {
        self.config.ticket.sender_email = Some(email.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.ticket.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn assignee_user_id(mut self, id: u64) -> Self {
        self.config.ticket.assignee_user_id = Some(id);
        self
    }

    pub fn timezone(mut self, tz: TimezoneConfig) -> Self {
        self.config.ticket.timezone = tz;
        self
    }

    pub fn lookback(mut self, lookback: Duration) -> Self {
        self.config.lookback_secs = lookback.as_secs();
        self
    }

    pub fn catalog_max_age(mut self, max_age: Duration) -> Self {
        self.config.catalog_max_age_secs = max_age.as_secs();
        self
    }

    pub fn scope_mode(mut self, mode: ScopeMode) -> Self {
        self.config.scope_mode = mode;
        self
    }

    pub fn max_concurrent_videos(mut self, n: usize) -> Self {
        self.config.max_concurrent_videos = n;
        self
    }

    pub fn source_timeout(mut self, timeout: Duration) -> Self {
        self.config.source_timeout_secs = timeout.as_secs();
        self
    }

    pub fn dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.config.dispatch_timeout_secs = timeout.as_secs();
        self
    }

    pub fn ledger_timeout(mut self, timeout: Duration) -> Self {
        self.config.ledger_timeout_secs = timeout.as_secs();
        self
    }

    pub fn http_client_config(mut self, config: HttpClientConfig) -> Self {
        self.config.http_client_config = config;
        self
    }

    pub fn catalog_retry(mut self, config: RetryConfig) -> Self {
        self.config.catalog_retry = config;
        self
    }

    pub fn build(self) -> SyncConfig {
        self.config
    }
}

impl Default for SyncConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
