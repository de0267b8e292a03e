use thiserror::Error;

use crate::dispatch::DispatchFailure;

/// 同步流程中的错误
///
/// 只有 `LedgerUnavailable` 会中止整轮同步，其余错误都只影响单条评论或单个视频。
#[derive(Debug, Error)]
pub enum SyncError {
    /// 上游评论/视频 API 不可用（传输失败、鉴权失败、超时）
    #[error("Source unavailable [{scope}]: {reason}")]
    SourceUnavailable { scope: String, reason: String },

    /// 评论发布时间无法解析
    #[error("Invalid timestamp for comment {comment_id}: {value}")]
    InvalidTimestamp { comment_id: String, value: String },

    /// 工单派发失败
    #[error("Dispatch failed: {0}")]
    Dispatch(#[from] DispatchFailure),

    /// 账本存储不可用：无法保证至多一次，必须中止本轮
    #[error("Ledger unavailable: {0}")]
    LedgerUnavailable(String),

    /// 视频目录刷新失败（非致命，继续使用旧缓存或空列表）
    #[error("Catalog refresh failed: {0}")]
    CatalogRefresh(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("KV store error: {0}")]
    KvStore(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    IO(String),

    #[error("Timeout: {0}")]
    Timeout(String),
}

impl SyncError {
    /// 是否必须中止整轮同步
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::LedgerUnavailable(_))
    }

    pub fn source_unavailable(scope: impl Into<String>, reason: impl ToString) -> Self {
        SyncError::SourceUnavailable {
            scope: scope.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<rusqlite::Error> for SyncError {
    fn from(error: rusqlite::Error) -> Self {
        SyncError::LedgerUnavailable(error.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(error: serde_json::Error) -> Self {
        SyncError::Serialization(error.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(error: std::io::Error) -> Self {
        SyncError::IO(error.to_string())
    }
}

impl From<sled::Error> for SyncError {
    fn from(error: sled::Error) -> Self {
        SyncError::KvStore(error.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(error: reqwest::Error) -> Self {
        let scope = error
            .url()
            .map(|u| u.path().to_string())
            .unwrap_or_else(|| "http".to_string());
        // URL 查询串里可能有 API key
        SyncError::source_unavailable(scope, error.without_url())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_ledger_errors_are_fatal() {
        assert!(SyncError::LedgerUnavailable("disk gone".into()).is_fatal());
        assert!(!SyncError::source_unavailable("video:abc", "503").is_fatal());
        assert!(!SyncError::CatalogRefresh("quota".into()).is_fatal());
        let dispatch = DispatchFailure::SinkUnavailable("timeout".into());
        assert!(!SyncError::Dispatch(dispatch).is_fatal());
    }

    #[test]
    fn test_rusqlite_error_maps_to_ledger_unavailable() {
        let err: SyncError = rusqlite::Error::InvalidQuery.into();
        assert!(matches!(err, SyncError::LedgerUnavailable(_)));
    }

    #[tokio::test]
    async fn test_reqwest_error_drops_query_string() {
        let error = reqwest::Client::new()
            .get("http://127.0.0.1:9/videos?key=secret-in-query")
            .send()
            .await
            .unwrap_err();
        let err: SyncError = error.into();
        assert!(matches!(&err, SyncError::SourceUnavailable { scope, .. } if scope == "/videos"));
        assert!(!err.to_string().contains("secret-in-query"));
    }
}
