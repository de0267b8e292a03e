//! YouTube Data API v3 评论源
//!
//! 使用 API key 鉴权，`maxResults` 分页，`nextPageToken` 翻页。
//! 频道视频通过 channels → uploads 播放列表 → playlistItems 枚举。

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::{SyncConfig, YouTubeConfig};
use crate::error::{Result, SyncError};
use crate::http_client;
use crate::model::{SyncScope, VideoMeta};

use super::{CommentFeed, Page, RawComment, RawThread};

/// playlistItems 接口的单页上限
const PLAYLIST_PAGE_LIMIT: u32 = 50;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreadItem {
    snippet: ThreadSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreadSnippet {
    video_id: Option<String>,
    top_level_comment: CommentItem,
    #[serde(default)]
    total_reply_count: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentItem {
    id: String,
    snippet: CommentSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentSnippet {
    #[serde(default)]
    author_display_name: String,
    author_channel_id: Option<AuthorChannelId>,
    #[serde(default)]
    text_display: String,
    #[serde(default)]
    published_at: String,
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthorChannelId {
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelItem {
    content_details: ChannelContentDetails,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelContentDetails {
    related_playlists: RelatedPlaylists,
}

#[derive(Debug, Deserialize)]
struct RelatedPlaylists {
    uploads: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItem {
    content_details: PlaylistContentDetails,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistContentDetails {
    video_id: String,
}

#[derive(Debug, Deserialize)]
struct VideoItem {
    id: String,
    snippet: VideoSnippet,
}

#[derive(Debug, Deserialize)]
struct VideoSnippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    thumbnails: HashMap<String, Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

impl From<CommentItem> for RawComment {
    fn from(item: CommentItem) -> Self {
        RawComment {
            id: item.id,
            author: item.snippet.author_display_name,
            author_channel_id: item.snippet.author_channel_id.map(|a| a.value),
            text: item.snippet.text_display,
            published_at: item.snippet.published_at,
        }
    }
}

impl ThreadItem {
    fn into_raw(self, fallback_video_id: Option<&str>) -> RawThread {
        let video_id = self
            .snippet
            .video_id
            .clone()
            .or_else(|| self.snippet.top_level_comment.snippet.video_id.clone())
            .or_else(|| fallback_video_id.map(str::to_string))
            .unwrap_or_default();
        RawThread {
            video_id,
            top_level: self.snippet.top_level_comment.into(),
            total_reply_count: self.snippet.total_reply_count,
        }
    }
}

impl VideoItem {
    /// 缩略图优先取高清
    fn into_meta(self) -> VideoMeta {
        let mut thumbnails = self.snippet.thumbnails;
        let thumbnail_url = ["maxres", "standard", "high", "medium", "default"]
            .iter()
            .find_map(|k| thumbnails.remove(*k))
            .map(|t| t.url);
        VideoMeta {
            video_id: self.id,
            title: self.snippet.title,
            thumbnail_url,
        }
    }
}

/// YouTube 评论源
pub struct YouTubeFeed {
    client: Client,
    config: YouTubeConfig,
    /// channel_id → uploads 播放列表 id
    uploads_playlists: Mutex<HashMap<String, String>>,
}

impl YouTubeFeed {
    pub fn new(client: Client, config: YouTubeConfig) -> Self {
        Self {
            client,
            config,
            uploads_playlists: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        let client = http_client::build_client(&config.http_client_config)?;
        Ok(Self::new(client, config.youtube.clone()))
    }

    fn endpoint(&self, resource: &str) -> String {
        format!("{}/{}", self.config.api_base_url.trim_end_matches('/'), resource)
    }

    /// GET 并解析 JSON；传输失败、鉴权失败、非 2xx 都视为上游不可用
    ///
    /// URL 里带着 API key，错误信息里一律去掉 URL。
    async fn get_json<T: DeserializeOwned>(
        &self,
        resource: &str,
        scope: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let response = self
            .client
            .get(self.endpoint(resource))
            .query(&[("key", self.config.api_key.as_str())])
            .query(query)
            .send()
            .await
            .map_err(|e| SyncError::source_unavailable(scope, e.without_url()))?;

        let status = response.status();
        if !status.is_success() {
            let body = http_client::error_body(response).await;
            warn!(
                "❌ YouTube API 请求失败: resource={}, scope={}, status={}",
                resource, scope, status
            );
            return Err(SyncError::source_unavailable(
                scope,
                format!("HTTP {}: {}", status.as_u16(), body),
            ));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| {
                SyncError::source_unavailable(scope, format!("响应解析失败: {}", e.without_url()))
            })
    }

    async fn uploads_playlist(&self, channel_id: &str) -> Result<String> {
        let cached = self.uploads_playlists.lock().get(channel_id).cloned();
        if let Some(id) = cached {
            return Ok(id);
        }

        let scope = format!("channel:{}", channel_id);
        let response: ListResponse<ChannelItem> = self
            .get_json(
                "channels",
                &scope,
                &[("part", "contentDetails".to_string()), ("id", channel_id.to_string())],
            )
            .await?;

        let playlist = response
            .items
            .into_iter()
            .next()
            .and_then(|c| c.content_details.related_playlists.uploads)
            .ok_or_else(|| SyncError::source_unavailable(&scope, "频道不存在或没有上传列表"))?;

        debug!("频道上传列表: channel_id={}, playlist={}", channel_id, playlist);
        self.uploads_playlists
            .lock()
            .insert(channel_id.to_string(), playlist.clone());
        Ok(playlist)
    }
}

fn with_page_token(
    mut query: Vec<(&'static str, String)>,
    page_token: Option<&str>,
) -> Vec<(&'static str, String)> {
    if let Some(token) = page_token {
        query.push(("pageToken", token.to_string()));
    }
    query
}

#[async_trait]
impl CommentFeed for YouTubeFeed {
    async fn list_threads(
        &self,
        scope: &SyncScope,
        page_token: Option<&str>,
    ) -> Result<Page<RawThread>> {
        let mut query = vec![
            ("part", "snippet".to_string()),
            ("order", "time".to_string()),
            ("textFormat", "html".to_string()),
            ("maxResults", self.config.page_size.to_string()),
        ];
        let fallback_video = match scope {
            SyncScope::Channel(id) => {
                query.push(("allThreadsRelatedToChannelId", id.clone()));
                None
            }
            SyncScope::Video(id) => {
                query.push(("videoId", id.clone()));
                Some(id.as_str())
            }
        };

        let response: ListResponse<ThreadItem> = self
            .get_json("commentThreads", &scope.to_string(), &with_page_token(query, page_token))
            .await?;

        Ok(Page {
            items: response
                .items
                .into_iter()
                .map(|t| t.into_raw(fallback_video))
                .collect(),
            next_page_token: response.next_page_token,
        })
    }

    async fn list_replies(
        &self,
        parent_id: &str,
        page_token: Option<&str>,
    ) -> Result<Page<RawComment>> {
        let query = vec![
            ("part", "snippet".to_string()),
            ("parentId", parent_id.to_string()),
            ("textFormat", "html".to_string()),
            ("maxResults", self.config.page_size.to_string()),
        ];
        let response: ListResponse<CommentItem> = self
            .get_json(
                "comments",
                &format!("replies:{}", parent_id),
                &with_page_token(query, page_token),
            )
            .await?;

        Ok(Page {
            items: response.items.into_iter().map(RawComment::from).collect(),
            next_page_token: response.next_page_token,
        })
    }

    async fn list_channel_videos(
        &self,
        channel_id: &str,
        page_token: Option<&str>,
    ) -> Result<Page<String>> {
        let playlist = self.uploads_playlist(channel_id).await?;
        let query = vec![
            ("part", "contentDetails".to_string()),
            ("playlistId", playlist),
            ("maxResults", self.config.page_size.min(PLAYLIST_PAGE_LIMIT).to_string()),
        ];
        let response: ListResponse<PlaylistItem> = self
            .get_json(
                "playlistItems",
                &format!("videos:{}", channel_id),
                &with_page_token(query, page_token),
            )
            .await?;

        Ok(Page {
            items: response
                .items
                .into_iter()
                .map(|i| i.content_details.video_id)
                .collect(),
            next_page_token: response.next_page_token,
        })
    }

    async fn video_metadata(&self, video_id: &str) -> Result<Option<VideoMeta>> {
        let response: ListResponse<VideoItem> = self
            .get_json(
                "videos",
                &format!("video:{}", video_id),
                &[("part", "snippet".to_string()), ("id", video_id.to_string())],
            )
            .await?;
        Ok(response.items.into_iter().next().map(VideoItem::into_meta))
    }
}
