//! 评论领域模型
//!
//! 评论一经拉取即不可变：同步只关心某个 id "是否已转发过"，不建模编辑或删除。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 一条评论或回复
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    /// 评论 id（顶层评论与回复共用同一个 id 空间，跨运行稳定）
    pub id: String,
    /// 作者显示名
    pub author: String,
    /// 作者频道 id，用于排除频道自己的评论
    #[serde(default)]
    pub author_channel_id: Option<String>,
    /// 渲染后的正文（可能含 HTML 转义）
    pub text: String,
    /// 原始发布时间字符串（RFC 3339），解析失败属于数据质量问题
    pub published_at: String,
    pub video_id: String,
    #[serde(default)]
    pub video_title: Option<String>,
    #[serde(default)]
    pub video_thumbnail_url: Option<String>,
    #[serde(default)]
    pub is_reply: bool,
    /// 回复所属顶层评论的正文；非回复时为空
    #[serde(default)]
    pub parent_text: String,
}

impl Comment {
    /// 解析发布时间
    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        crate::utils::time::parse_rfc3339_utc(&self.published_at)
    }

    /// 是否由指定频道本身发布
    pub fn is_authored_by(&self, channel_id: &str) -> bool {
        self.author_channel_id.as_deref() == Some(channel_id)
    }

    /// 指向原评论的深链接：`<watch_url>?v=<video_id>&lc=<comment_id>`
    pub fn deep_link(&self, watch_url: &str) -> String {
        format!("{}?v={}&lc={}", watch_url, self.video_id, self.id)
    }
}

/// 评论串：一条顶层评论及其回复
///
/// 回复由适配器按发布时间从新到旧排序。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentThread {
    /// 顶层评论；频道自己的评论被过滤后为 None，但其他人的回复仍然保留
    pub top_level: Option<Comment>,
    pub replies: Vec<Comment>,
}

impl CommentThread {
    /// 线程内所有候选评论数
    pub fn len(&self) -> usize {
        self.top_level.iter().count() + self.replies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 视频元信息（标题、缩略图）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMeta {
    pub video_id: String,
    pub title: String,
    pub thumbnail_url: Option<String>,
}

/// 拉取评论的范围
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncScope {
    /// 与频道相关的全部评论串
    Channel(String),
    /// 单个视频的评论串
    Video(String),
}

impl fmt::Display for SyncScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncScope::Channel(id) => write!(f, "channel:{}", id),
            SyncScope::Video(id) => write!(f, "video:{}", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment(id: &str) -> Comment {
        Comment {
            id: id.to_string(),
            author: "Ada".to_string(),
            author_channel_id: Some("UC_viewer".to_string()),
            text: "great video".to_string(),
            published_at: "2024-05-01T10:00:00Z".to_string(),
            video_id: "vid1".to_string(),
            video_title: None,
            video_thumbnail_url: None,
            is_reply: false,
            parent_text: String::new(),
        }
    }

    #[test]
    fn test_deep_link() {
        let c = comment("Ugx123");
        assert_eq!(
            c.deep_link("https://www.youtube.com/watch"),
            "https://www.youtube.com/watch?v=vid1&lc=Ugx123"
        );
    }

    #[test]
    fn test_is_authored_by() {
        let mut c = comment("a");
        assert!(!c.is_authored_by("UC_owner"));
        c.author_channel_id = Some("UC_owner".to_string());
        assert!(c.is_authored_by("UC_owner"));
        c.author_channel_id = None;
        assert!(!c.is_authored_by("UC_owner"));
    }

    #[test]
    fn test_published_at_parse() {
        let mut c = comment("a");
        assert!(c.published_at().is_some());
        c.published_at = "yesterday".to_string();
        assert!(c.published_at().is_none());
    }

    #[test]
    fn test_scope_display() {
        assert_eq!(SyncScope::Video("abc".into()).to_string(), "video:abc");
        assert_eq!(SyncScope::Channel("UC1".into()).to_string(), "channel:UC1");
    }
}
