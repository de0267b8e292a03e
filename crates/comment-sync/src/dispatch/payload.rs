//! 工单请求体
//!
//! 一条评论 → 一张工单：主题、`channel`/`via` = "api"、一条入站消息（发件人 + 正文）。
//! 正文包含评论内容、作者、发布时间、指向原评论的深链接，以及可用时的视频标题、
//! 缩略图和被回复的原评论。

use serde::{Deserialize, Serialize};

use crate::config::{SyncConfig, TicketConfig};
use crate::model::Comment;
use crate::utils::{TimeFormatter, TimezoneConfig};

const API_CHANNEL: &str = "api";

/// 构建工单所需的静态信息
#[derive(Debug, Clone)]
pub struct TicketTemplate {
    pub watch_url: String,
    pub sender_email: Option<String>,
    pub tags: Vec<String>,
    pub assignee_user_id: Option<u64>,
    pub timezone: TimezoneConfig,
}

impl TicketTemplate {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(&config.youtube.watch_url, &config.ticket)
    }

    pub fn new(watch_url: &str, ticket: &TicketConfig) -> Self {
        Self {
            watch_url: watch_url.to_string(),
            sender_email: ticket.sender_email.clone(),
            tags: ticket.tags.clone(),
            assignee_user_id: ticket.assignee_user_id,
            timezone: ticket.timezone,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketTag {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketAssignee {
    pub id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketSender {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// 入站消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketMessage {
    pub channel: String,
    pub via: String,
    pub from_agent: bool,
    pub sender: TicketSender,
    pub subject: String,
    pub body_text: String,
    pub body_html: String,
}

/// 工单创建请求体
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketPayload {
    pub subject: String,
    pub channel: String,
    pub via: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<TicketTag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_user: Option<TicketAssignee>,
    pub messages: Vec<TicketMessage>,
}

impl TicketPayload {
    pub fn from_comment(comment: &Comment, template: &TicketTemplate) -> Self {
        let subject = if comment.is_reply {
            format!("New Reply from {}", comment.author)
        } else {
            format!("New Comment from {}", comment.author)
        };
        let link = comment.deep_link(&template.watch_url);
        let published = display_time(comment, template.timezone);

        Self {
            subject: subject.clone(),
            channel: API_CHANNEL.to_string(),
            via: API_CHANNEL.to_string(),
            tags: template
                .tags
                .iter()
                .map(|name| TicketTag { name: name.clone() })
                .collect(),
            assignee_user: template.assignee_user_id.map(|id| TicketAssignee { id }),
            messages: vec![TicketMessage {
                channel: API_CHANNEL.to_string(),
                via: API_CHANNEL.to_string(),
                from_agent: false,
                sender: TicketSender {
                    name: comment.author.clone(),
                    email: template.sender_email.clone(),
                },
                subject,
                body_text: body_text(comment, &published, &link),
                body_html: body_html(comment, &published, &link),
            }],
        }
    }
}

/// 发布时间按配置时区显示；解析失败时原样输出
fn display_time(comment: &Comment, tz: TimezoneConfig) -> String {
    comment
        .published_at()
        .map(|dt| TimeFormatter::format_standard(dt, tz))
        .unwrap_or_else(|| comment.published_at.clone())
}

fn body_text(comment: &Comment, published: &str, link: &str) -> String {
    let mut body = String::new();
    if let Some(title) = &comment.video_title {
        body.push_str(&format!("**Video:** {}\n\n", title));
    }
    if comment.is_reply && !comment.parent_text.is_empty() {
        body.push_str(&format!("**In reply to:** {}\n\n", comment.parent_text));
    }
    body.push_str(&format!("**Comment:** {}\n\n", comment.text));
    body.push_str(&format!("**Author:** {}\n", comment.author));
    body.push_str(&format!("**Published At:** {}\n\n", published));
    body.push_str(&format!("[View Comment on YouTube]({})", link));
    if let Some(thumb) = &comment.video_thumbnail_url {
        body.push_str(&format!("\n\n![Video thumbnail]({})", thumb));
    }
    body
}

fn body_html(comment: &Comment, published: &str, link: &str) -> String {
    let mut body = String::new();
    if let Some(thumb) = &comment.video_thumbnail_url {
        body.push_str(&format!(
            "<p><img src=\"{}\" alt=\"Video thumbnail\"/></p>",
            escape_html(thumb)
        ));
    }
    if let Some(title) = &comment.video_title {
        body.push_str(&format!("<p><strong>Video:</strong> {}</p>", escape_html(title)));
    }
    if comment.is_reply && !comment.parent_text.is_empty() {
        // 上游正文已经是渲染后的 HTML
        body.push_str(&format!(
            "<blockquote><strong>In reply to:</strong> {}</blockquote>",
            comment.parent_text
        ));
    }
    body.push_str(&format!("<p><strong>Comment:</strong> {}</p>", comment.text));
    body.push_str(&format!(
        "<p><strong>Author:</strong> {}<br/><strong>Published At:</strong> {}</p>",
        escape_html(&comment.author),
        escape_html(published)
    ));
    body.push_str(&format!(
        "<p><a href=\"{}\">View Comment on YouTube</a></p>",
        escape_html(link)
    ));
    body
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_WATCH_URL;

    fn template() -> TicketTemplate {
        TicketTemplate {
            watch_url: DEFAULT_WATCH_URL.to_string(),
            sender_email: Some("youtube@example.com".to_string()),
            tags: vec!["YouTube".to_string(), "Comment".to_string()],
            assignee_user_id: Some(1591495),
            timezone: TimezoneConfig::utc(),
        }
    }

    fn comment() -> Comment {
        Comment {
            id: "Ugx1".to_string(),
            author: "Ada <3".to_string(),
            author_channel_id: Some("UC_viewer".to_string()),
            text: "Does this cable support 4K?".to_string(),
            published_at: "2024-05-01T10:00:00Z".to_string(),
            video_id: "vid1".to_string(),
            video_title: Some("Unboxing".to_string()),
            video_thumbnail_url: Some("https://i.ytimg.com/vi/vid1/hqdefault.jpg".to_string()),
            is_reply: false,
            parent_text: String::new(),
        }
    }

    #[test]
    fn test_payload_shape() {
        let payload = TicketPayload::from_comment(&comment(), &template());
        assert_eq!(payload.subject, "New Comment from Ada <3");
        assert_eq!(payload.channel, "api");
        assert_eq!(payload.via, "api");
        assert_eq!(payload.messages.len(), 1);

        let message = &payload.messages[0];
        assert!(!message.from_agent);
        assert_eq!(message.channel, "api");
        assert_eq!(message.sender.name, "Ada <3");
        assert_eq!(message.sender.email.as_deref(), Some("youtube@example.com"));
        assert!(message.body_text.contains("**Comment:** Does this cable support 4K?"));
        assert!(message.body_text.contains("**Published At:** 2024-05-01 10:00:00 +00:00"));
        assert!(message
            .body_text
            .contains("https://www.youtube.com/watch?v=vid1&lc=Ugx1"));
        assert!(message.body_text.contains("**Video:** Unboxing"));
        assert!(message.body_html.contains("Ada &lt;3"));
        assert!(message.body_html.contains("hqdefault.jpg"));
    }

    #[test]
    fn test_payload_json() {
        let payload = TicketPayload::from_comment(&comment(), &template());
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["tags"][0]["name"], "YouTube");
        assert_eq!(json["assignee_user"]["id"], 1591495);
        assert_eq!(json["messages"][0]["via"], "api");
        assert_eq!(json["messages"][0]["sender"]["name"], "Ada <3");
    }

    #[test]
    fn test_optional_fields_omitted() {
        let mut t = template();
        t.tags.clear();
        t.assignee_user_id = None;
        t.sender_email = None;
        let mut c = comment();
        c.video_title = None;
        c.video_thumbnail_url = None;

        let payload = TicketPayload::from_comment(&c, &t);
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("tags").is_none());
        assert!(json.get("assignee_user").is_none());
        assert!(json["messages"][0]["sender"].get("email").is_none());
        assert!(!payload.messages[0].body_text.contains("**Video:**"));
    }

    #[test]
    fn test_reply_context() {
        let mut c = comment();
        c.is_reply = true;
        c.parent_text = "Which cable is this?".to_string();
        let payload = TicketPayload::from_comment(&c, &template());
        assert_eq!(payload.subject, "New Reply from Ada <3");
        assert!(payload.messages[0]
            .body_text
            .contains("**In reply to:** Which cable is this?"));
        assert!(payload.messages[0].body_html.contains("<blockquote>"));
    }

    #[test]
    fn test_unparseable_time_is_shown_verbatim() {
        let mut c = comment();
        c.published_at = "sometime".to_string();
        let payload = TicketPayload::from_comment(&c, &template());
        assert!(payload.messages[0].body_text.contains("**Published At:** sometime"));
    }
}
