//! Topic and post domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use madrona_core::{PostId, TopicId, UserId};

/// A discussion topic, the root of a thread of posts.
#[derive(Debug, Clone, Serialize)]
pub struct Topic {
    /// Unique topic ID.
    pub id: TopicId,
    /// Topic title.
    pub title: String,
    /// Free-form tags, matched exactly (lowercased) by search.
    pub tags: Vec<String>,
    /// When the topic was created.
    pub created_at: DateTime<Utc>,
    /// User who created the topic.
    pub author_id: UserId,
}

/// A single post within a topic.
#[derive(Debug, Clone, Serialize)]
pub struct Post {
    /// Unique post ID (serial).
    pub id: PostId,
    /// Topic this post belongs to.
    pub topic_id: TopicId,
    /// Author's handle at the time of posting.
    pub author: String,
    /// Post body text.
    pub body: String,
    /// When the post was created.
    pub created_at: DateTime<Utc>,
    /// User who wrote the post.
    pub author_id: UserId,
    /// Post this one replies to, if any.
    pub parent_post_id: Option<PostId>,
}
