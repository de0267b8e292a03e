//! Gorgias 工单派发器
//!
//! POST 工单 API，HTTP 201 视为成功；凭证在构造时传入，不在调用时读取环境。

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use tracing::{error, info};

use crate::config::{SyncConfig, TicketCredentials};
use crate::error::Result;
use crate::http_client;
use crate::model::Comment;

use super::{DispatchFailure, TicketDispatcher, TicketPayload, TicketReceipt, TicketTemplate};

/// 创建工单响应（只关心 id）
#[derive(Debug, Deserialize)]
struct CreatedTicket {
    id: Option<u64>,
}

pub struct GorgiasDispatcher {
    client: Client,
    api_url: String,
    credentials: TicketCredentials,
    template: TicketTemplate,
}

impl GorgiasDispatcher {
    pub fn new(
        client: Client,
        api_url: impl Into<String>,
        credentials: TicketCredentials,
        template: TicketTemplate,
    ) -> Self {
        Self {
            client,
            api_url: api_url.into(),
            credentials,
            template,
        }
    }

    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        let client = http_client::build_client(&config.http_client_config)?;
        Ok(Self::new(
            client,
            config.ticket.api_url.clone(),
            config.ticket.credentials.clone(),
            TicketTemplate::from_config(config),
        ))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            TicketCredentials::Bearer { token } => request.bearer_auth(token),
            TicketCredentials::Basic { username, api_key } => {
                request.basic_auth(username, Some(api_key))
            }
        }
    }
}

#[async_trait]
impl TicketDispatcher for GorgiasDispatcher {
    async fn dispatch(
        &self,
        comment: &Comment,
    ) -> std::result::Result<TicketReceipt, DispatchFailure> {
        let payload = TicketPayload::from_comment(comment, &self.template);

        let response = self
            .authorize(self.client.post(&self.api_url))
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                error!("❌ 连接工单 API 失败: comment_id={}, error={}", comment.id, e);
                DispatchFailure::SinkUnavailable(e.to_string())
            })?;

        let status = response.status();
        if status.as_u16() != 201 {
            let body = http_client::error_body(response).await;
            error!(
                "❌ 创建工单失败: comment_id={}, video_id={}, status={}, body={}",
                comment.id, comment.video_id, status, body
            );
            return Err(DispatchFailure::from_status(status.as_u16(), body));
        }

        // 响应体解析失败不影响"已创建"这个事实
        let ticket_id = response
            .json::<CreatedTicket>()
            .await
            .ok()
            .and_then(|t| t.id);

        info!(
            "🎫 工单已创建: comment_id={}, video_id={}, ticket_id={:?}",
            comment.id, comment.video_id, ticket_id
        );
        Ok(TicketReceipt { ticket_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpClientConfig;

    fn dispatcher(credentials: TicketCredentials) -> GorgiasDispatcher {
        let config = SyncConfig::builder()
            .channel_id("UC_owner")
            .youtube_api_key("k")
            .credentials(credentials.clone())
            .build();
        GorgiasDispatcher::new(
            http_client::build_client(&HttpClientConfig::default()).unwrap(),
            "http://127.0.0.1:9/api/tickets",
            credentials,
            TicketTemplate::from_config(&config),
        )
    }

    #[test]
    fn test_bearer_header() {
        let d = dispatcher(TicketCredentials::Bearer { token: "tok".into() });
        let request = d.authorize(d.client.post(&d.api_url)).build().unwrap();
        assert_eq!(
            request.headers().get("authorization").unwrap(),
            "Bearer tok"
        );
    }

    #[test]
    fn test_basic_header() {
        let d = dispatcher(TicketCredentials::Basic {
            username: "ops@example.com".into(),
            api_key: "key".into(),
        });
        let request = d.authorize(d.client.post(&d.api_url)).build().unwrap();
        let header = request.headers().get("authorization").unwrap().to_str().unwrap();
        assert!(header.starts_with("Basic "));
    }

    #[tokio::test]
    async fn test_unreachable_sink_is_sink_unavailable() {
        // 端口 9（discard）在测试环境中通常没有监听者
        let d = dispatcher(TicketCredentials::Bearer { token: "tok".into() });
        let comment = Comment {
            id: "c1".into(),
            author: "Ada".into(),
            author_channel_id: None,
            text: "hi".into(),
            published_at: "2024-05-01T10:00:00Z".into(),
            video_id: "v1".into(),
            video_title: None,
            video_thumbnail_url: None,
            is_reply: false,
            parent_text: String::new(),
        };
        let err = d.dispatch(&comment).await.unwrap_err();
        assert!(matches!(err, DispatchFailure::SinkUnavailable(_)));
    }
}
