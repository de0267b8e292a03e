//! 工单派发
//!
//! 每条新评论对应一次外部写入。所有失败都只影响当前评论：记录日志、不写账本，
//! 下一轮同步自然会重试。

pub mod gorgias;
pub mod payload;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::Comment;

pub use gorgias::GorgiasDispatcher;
pub use payload::{TicketMessage, TicketPayload, TicketSender, TicketTemplate};

/// 派发失败原因
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum DispatchFailure {
    /// 凭证被拒绝（401/403）
    #[error("auth rejected (HTTP {status}): {body}")]
    AuthRejected { status: u16, body: String },

    /// 下游不可达或超时
    #[error("sink unavailable: {0}")]
    SinkUnavailable(String),

    /// 下游返回非 201
    #[error("sink rejected payload (HTTP {status}): {body}")]
    SinkRejectedPayload { status: u16, body: String },
}

impl DispatchFailure {
    /// 按 HTTP 状态码归类非成功响应
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => DispatchFailure::AuthRejected { status, body },
            _ => DispatchFailure::SinkRejectedPayload { status, body },
        }
    }

    /// 日志里使用的简短标签
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchFailure::AuthRejected { .. } => "auth_rejected",
            DispatchFailure::SinkUnavailable(_) => "sink_unavailable",
            DispatchFailure::SinkRejectedPayload { .. } => "sink_rejected_payload",
        }
    }
}

/// 派发成功的回执
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketReceipt {
    /// 下游返回的工单 id（若响应里有）
    pub ticket_id: Option<u64>,
}

/// 工单派发器
#[async_trait]
pub trait TicketDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        comment: &Comment,
    ) -> std::result::Result<TicketReceipt, DispatchFailure>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status() {
        assert_eq!(
            DispatchFailure::from_status(401, "bad key".into()).kind(),
            "auth_rejected"
        );
        assert_eq!(DispatchFailure::from_status(403, String::new()).kind(), "auth_rejected");
        assert_eq!(
            DispatchFailure::from_status(400, "missing sender".into()),
            DispatchFailure::SinkRejectedPayload {
                status: 400,
                body: "missing sender".into()
            }
        );
        assert_eq!(
            DispatchFailure::from_status(200, String::new()).kind(),
            "sink_rejected_payload"
        );
    }

    #[test]
    fn test_display_carries_status_and_body() {
        let failure = DispatchFailure::from_status(422, "{\"error\":\"subject\"}".into());
        let rendered = failure.to_string();
        assert!(rendered.contains("422"));
        assert!(rendered.contains("subject"));
    }
}
