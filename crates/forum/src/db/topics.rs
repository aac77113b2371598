//! Topic and post repositories.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use madrona_core::{PostId, TopicId, UserId};

use super::RepositoryError;
use crate::models::{Post, Topic};

/// Database row for a topic.
#[derive(Debug, sqlx::FromRow)]
struct DbTopic {
    id: Uuid,
    title: String,
    tags: Vec<String>,
    created_at: DateTime<Utc>,
    author_id: Uuid,
}

impl From<DbTopic> for Topic {
    fn from(r: DbTopic) -> Self {
        Self {
            id: TopicId::new(r.id),
            title: r.title,
            tags: r.tags,
            created_at: r.created_at,
            author_id: UserId::new(r.author_id),
        }
    }
}

/// Database row for a post.
#[derive(Debug, sqlx::FromRow)]
struct DbPost {
    id: i64,
    topic_id: Uuid,
    author: String,
    body: String,
    created_at: DateTime<Utc>,
    author_id: Uuid,
    parent_post_id: Option<i64>,
}

impl From<DbPost> for Post {
    fn from(r: DbPost) -> Self {
        Self {
            id: PostId::new(r.id),
            topic_id: TopicId::new(r.topic_id),
            author: r.author,
            body: r.body,
            created_at: r.created_at,
            author_id: UserId::new(r.author_id),
            parent_post_id: r.parent_post_id.map(PostId::new),
        }
    }
}

/// Parameters for creating a topic.
pub struct CreateTopic {
    /// Topic title.
    pub title: String,
    /// Tags, stored lowercased for exact-match search.
    pub tags: Vec<String>,
    /// Creating user.
    pub author_id: UserId,
}

/// Parameters for creating a post.
pub struct CreatePost {
    /// Topic the post belongs to.
    pub topic_id: TopicId,
    /// Author's handle at posting time.
    pub author: String,
    /// Post body.
    pub body: String,
    /// Authoring user.
    pub author_id: UserId,
    /// Post being replied to, if any.
    pub parent_post_id: Option<PostId>,
}

/// Repository for topic operations.
pub struct TopicRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> TopicRepository<'a> {
    /// Create a new topic repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Create a topic.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn create(&self, params: CreateTopic) -> Result<Topic, RepositoryError> {
        let row = sqlx::query_as::<_, DbTopic>(
            r"
            INSERT INTO topics (id, title, tags, author_id)
            VALUES ($1, $2, $3, $4)
            RETURNING id, title, tags, created_at, author_id
            ",
        )
        .bind(TopicId::generate().as_uuid())
        .bind(&params.title)
        .bind(&params.tags)
        .bind(params.author_id.as_uuid())
        .fetch_one(self.pool)
        .await?;

        Ok(row.into())
    }

    /// Get a topic by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: TopicId) -> Result<Option<Topic>, RepositoryError> {
        let row = sqlx::query_as::<_, DbTopic>(
            r"
            SELECT id, title, tags, created_at, author_id
            FROM topics
            WHERE id = $1
            ",
        )
        .bind(id.as_uuid())
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// List topics, newest first, optionally filtered by a search query.
    ///
    /// A query matches topics whose title contains it (case-insensitive)
    /// or that carry it as an exact, lowercased tag.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn search_and_list(
        &self,
        search: Option<&str>,
        page: i64,
        page_size: i64,
    ) -> Result<Vec<Topic>, RepositoryError> {
        let offset = (page - 1) * page_size;

        let rows = if let Some(q) = search {
            sqlx::query_as::<_, DbTopic>(
                r"
                SELECT id, title, tags, created_at, author_id
                FROM topics
                WHERE title ILIKE $1 OR $2 = ANY(tags)
                ORDER BY created_at DESC
                LIMIT $3 OFFSET $4
                ",
            )
            .bind(format!("%{q}%"))
            .bind(q.to_lowercase())
            .bind(page_size)
            .bind(offset)
            .fetch_all(self.pool)
            .await?
        } else {
            sqlx::query_as::<_, DbTopic>(
                r"
                SELECT id, title, tags, created_at, author_id
                FROM topics
                ORDER BY created_at DESC
                LIMIT $1 OFFSET $2
                ",
            )
            .bind(page_size)
            .bind(offset)
            .fetch_all(self.pool)
            .await?
        };

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Count topics matching an optional search query.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count(&self, search: Option<&str>) -> Result<i64, RepositoryError> {
        let count: (i64,) = if let Some(q) = search {
            sqlx::query_as(
                "SELECT COUNT(*) FROM topics WHERE title ILIKE $1 OR $2 = ANY(tags)",
            )
            .bind(format!("%{q}%"))
            .bind(q.to_lowercase())
            .fetch_one(self.pool)
            .await?
        } else {
            sqlx::query_as("SELECT COUNT(*) FROM topics")
                .fetch_one(self.pool)
                .await?
        };

        Ok(count.0)
    }
}

/// Repository for post operations.
pub struct PostRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> PostRepository<'a> {
    /// Create a new post repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Create a post.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn create(&self, params: CreatePost) -> Result<Post, RepositoryError> {
        let row = sqlx::query_as::<_, DbPost>(
            r"
            INSERT INTO posts (topic_id, author, body, author_id, parent_post_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, topic_id, author, body, created_at, author_id, parent_post_id
            ",
        )
        .bind(params.topic_id.as_uuid())
        .bind(&params.author)
        .bind(&params.body)
        .bind(params.author_id.as_uuid())
        .bind(params.parent_post_id.map(|id| id.as_i64()))
        .fetch_one(self.pool)
        .await?;

        Ok(row.into())
    }

    /// Get a post by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: PostId) -> Result<Option<Post>, RepositoryError> {
        let row = sqlx::query_as::<_, DbPost>(
            r"
            SELECT id, topic_id, author, body, created_at, author_id, parent_post_id
            FROM posts
            WHERE id = $1
            ",
        )
        .bind(id.as_i64())
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// List a topic's posts, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_by_topic(
        &self,
        topic_id: TopicId,
        page: i64,
        page_size: i64,
    ) -> Result<Vec<Post>, RepositoryError> {
        let offset = (page - 1) * page_size;

        let rows = sqlx::query_as::<_, DbPost>(
            r"
            SELECT id, topic_id, author, body, created_at, author_id, parent_post_id
            FROM posts
            WHERE topic_id = $1
            ORDER BY created_at ASC
            LIMIT $2 OFFSET $3
            ",
        )
        .bind(topic_id.as_uuid())
        .bind(page_size)
        .bind(offset)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Count a topic's posts.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count_by_topic(&self, topic_id: TopicId) -> Result<i64, RepositoryError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posts WHERE topic_id = $1")
            .bind(topic_id.as_uuid())
            .fetch_one(self.pool)
            .await?;

        Ok(count.0)
    }
}
