//! HTTP 客户端模块
//!
//! 上游评论源与下游工单系统共用同一套 reqwest 客户端构建逻辑：
//! 连接超时 + 请求超时 + User-Agent。

use std::time::Duration;
use reqwest::{Client, Response};
use tracing::info;

use crate::config::HttpClientConfig;
use crate::error::{Result, SyncError};

/// 按配置创建 reqwest 客户端
pub fn build_client(config: &HttpClientConfig) -> Result<Client> {
    let mut builder = Client::builder();

    if let Some(timeout) = config.connect_timeout_secs {
        builder = builder.connect_timeout(Duration::from_secs(timeout));
    }

    if let Some(timeout) = config.request_timeout_secs {
        builder = builder.timeout(Duration::from_secs(timeout));
    }

    if let Some(ua) = &config.user_agent {
        builder = builder.user_agent(ua.clone());
    }

    let client = builder
        .build()
        .map_err(|e| SyncError::Config(format!("创建 HTTP 客户端失败: {}", e)))?;

    info!(
        "✅ HTTP 客户端已创建 (connect_timeout={:?}s, request_timeout={:?}s)",
        config.connect_timeout_secs, config.request_timeout_secs
    );

    Ok(client)
}

/// 读取错误响应正文（截断，避免日志被大响应淹没）
pub async fn error_body(response: Response) -> String {
    const MAX_BODY: usize = 2048;
    let text = response
        .text()
        .await
        .unwrap_or_else(|_| "无法读取错误信息".to_string());
    truncate(text, MAX_BODY)
}

fn truncate(mut text: String, max: usize) -> String {
    if text.len() > max {
        let mut cut = max;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
        text.push('…');
    }
    text
}
