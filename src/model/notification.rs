//! Activity notifications.
//!
//! The `type` field decides which other fields a notification carries:
//! replies name the comment they answer and quote it, comments carry their
//! text, likes carry nothing extra.

use bson::{ Bson, UtcDateTime };
use crate::{
    literal::Order,
    target::{ IndexSpec, FieldDefault },
};
use super::Doc;

/// What happened, with the fields specific to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    /// Someone liked a post.
    Like,
    /// Someone commented on a post.
    #[serde(rename_all = "camelCase")]
    Comment {
        /// The comment.
        comment_text: String,
    },
    /// Someone replied to a comment.
    #[serde(rename_all = "camelCase")]
    Reply {
        /// The reply.
        comment_text: String,
        /// The comment replied to, quoted.
        original_comment_text: String,
        /// Identifier of the comment replied to.
        comment_id: String,
    },
    /// A type this version doesn't know about.
    #[serde(other)]
    Other,
}

/// A notification addressed to `receiver_id` about `post_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Unique identifier.
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Bson>,
    /// Who caused it.
    pub sender_id: String,
    /// Who gets notified.
    pub receiver_id: String,
    /// The post concerned.
    pub post_id: String,
    /// Rendered text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Whether the receiver has seen it. Backfilled with `false`.
    pub is_read: bool,
    /// Creation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<UtcDateTime>,
    /// Last change, e.g. being marked read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<UtcDateTime>,
    /// The `type` and its specific fields.
    #[serde(flatten)]
    pub kind: NotificationKind,
}

impl Notification {
    /// An unread notification without a message.
    pub fn new<S, R, P>(sender_id: S, receiver_id: R, post_id: P, kind: NotificationKind) -> Self
        where S: Into<String>,
              R: Into<String>,
              P: Into<String>,
    {
        Notification {
            id: None,
            sender_id: sender_id.into(),
            receiver_id: receiver_id.into(),
            post_id: post_id.into(),
            message: None,
            is_read: false,
            created_at: None,
            updated_at: None,
            kind,
        }
    }
}

impl Doc for Notification {
    const NAME: &'static str = "notifications";

    fn indexes() -> Vec<IndexSpec> {
        vec![
            IndexSpec::new("idx_sender_id")
                .key("senderId", Order::Ascending),
            IndexSpec::new("idx_receiver_id")
                .key("receiverId", Order::Ascending),
            IndexSpec::new("idx_post_id")
                .key("postId", Order::Ascending),
            IndexSpec::new("idx_type")
                .key("type", Order::Ascending),
            IndexSpec::new("idx_created_at_desc")
                .key("createdAt", Order::Descending),
            IndexSpec::new("idx_receiver_read_created")
                .key("receiverId", Order::Ascending)
                .key("isRead", Order::Ascending)
                .key("createdAt", Order::Descending),
            IndexSpec::new("idx_receiverId_createdAt")
                .key("receiverId", Order::Ascending)
                .key("createdAt", Order::Descending),
            IndexSpec::new("idx_senderId_postId_type")
                .key("senderId", Order::Ascending)
                .key("postId", Order::Ascending)
                .key("type", Order::Ascending),
            IndexSpec::new("idx_receiverId_isRead")
                .key("receiverId", Order::Ascending)
                .key("isRead", Order::Ascending),
            IndexSpec::new("idx_postId_type")
                .key("postId", Order::Ascending)
                .key("type", Order::Ascending),
        ]
    }

    fn field_defaults() -> Vec<FieldDefault> {
        vec![
            FieldDefault::new("isRead", Bson::Boolean(false)),
        ]
    }

    fn id(&self) -> Option<&Bson> {
        self.id.as_ref()
    }
}
