//! Posts in the home feed.

use bson::{ Bson, UtcDateTime };
use crate::{
    literal::Order,
    target::{ IndexSpec, FieldDefault },
};
use super::Doc;

/// A post. `likes` holds the ids of the users who liked it and is always an
/// array, possibly empty; documents written before it existed are
/// backfilled with `[]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feed {
    /// Unique identifier.
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Bson>,
    /// Author.
    pub user_id: String,
    /// Text content.
    pub message: String,
    /// Attached images, in attachment order.
    #[serde(default)]
    pub image_ids: Vec<String>,
    /// Users who liked the post.
    pub likes: Vec<String>,
    /// Creation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<UtcDateTime>,
    /// Last edit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<UtcDateTime>,
}

impl Feed {
    /// A post without images or likes.
    pub fn new<U, M>(user_id: U, message: M) -> Self
        where U: Into<String>,
              M: Into<String>,
    {
        Feed {
            id: None,
            user_id: user_id.into(),
            message: message.into(),
            image_ids: Vec::new(),
            likes: Vec::new(),
            created_at: None,
            updated_at: None,
        }
    }
}

impl Doc for Feed {
    const NAME: &'static str = "feeds";

    fn indexes() -> Vec<IndexSpec> {
        vec![
            IndexSpec::new("idx_feeds_user_id")
                .key("userId", Order::Ascending),
            IndexSpec::new("idx_feeds_created_at_desc")
                .key("createdAt", Order::Descending),
            IndexSpec::new("idx_feeds_user_created")
                .key("userId", Order::Ascending)
                .key("createdAt", Order::Descending),
        ]
    }

    fn field_defaults() -> Vec<FieldDefault> {
        vec![
            FieldDefault::new("likes", Bson::Array(Vec::new())),
        ]
    }

    fn id(&self) -> Option<&Bson> {
        self.id.as_ref()
    }
}
