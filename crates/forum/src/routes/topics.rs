//! Topic and post route handlers.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect},
};
use serde::Deserialize;
use tracing::{instrument, warn};

use madrona_core::{PostId, TopicId};

use crate::db::topics::{CreatePost, CreateTopic, PostRepository, TopicRepository};
use crate::error::{AppError, Result};
use crate::filters;
use crate::middleware::{OptionalUser, RequireUser};
use crate::models::{Notification, Post, Topic, User};
use crate::pagination::Pagination;
use crate::state::AppState;

/// Posts and topics per listing page.
const PAGE_SIZE: i64 = 50;

/// Topic view for templates.
#[derive(Clone)]
pub struct TopicView {
    pub id: String,
    pub title: String,
    pub tags: String,
    pub created_at: String,
}

impl From<&Topic> for TopicView {
    fn from(topic: &Topic) -> Self {
        Self {
            id: topic.id.to_string(),
            title: topic.title.clone(),
            tags: topic.tags.join(", "),
            created_at: format_timestamp(topic.created_at),
        }
    }
}

/// Post view for templates.
#[derive(Clone)]
pub struct PostView {
    pub id: i64,
    pub author: String,
    pub body: String,
    pub created_at: String,
    pub parent_post_id: Option<i64>,
}

impl From<&Post> for PostView {
    fn from(post: &Post) -> Self {
        Self {
            id: post.id.as_i64(),
            author: post.author.clone(),
            body: post.body.clone(),
            created_at: format_timestamp(post.created_at),
            parent_post_id: post.parent_post_id.map(|id| id.as_i64()),
        }
    }
}

/// Topic listing page template.
#[derive(Template, WebTemplate)]
#[template(path = "topics.html")]
pub struct TopicsTemplate {
    pub topics: Vec<TopicView>,
    pub pagination: Pagination,
    pub search_query: String,
    pub current_user: Option<String>,
}

/// Single topic page template.
#[derive(Template, WebTemplate)]
#[template(path = "topic.html")]
pub struct TopicTemplate {
    pub topic: TopicView,
    pub posts: Vec<PostView>,
    pub pagination: Pagination,
    pub current_user: Option<String>,
}

/// Query parameters for listing pages.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<i64>,
    pub q: Option<String>,
}

/// Display the topic listing, optionally filtered by a search query.
#[instrument(skip(state, user))]
pub async fn index(
    State(state): State<AppState>,
    OptionalUser(user): OptionalUser,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse> {
    let page = query.page.unwrap_or(1).max(1);
    let search = query.q.as_deref().filter(|q| !q.is_empty());

    let repo = TopicRepository::new(state.pool());
    let topics = repo.search_and_list(search, page, PAGE_SIZE).await?;
    let total = repo.count(search).await?;

    Ok(TopicsTemplate {
        topics: topics.iter().map(TopicView::from).collect(),
        pagination: Pagination::new(total, page, PAGE_SIZE),
        search_query: search.unwrap_or_default().to_owned(),
        current_user: user.map(|u| u.handle),
    })
}

/// Display a single topic with its posts.
///
/// # Errors
///
/// Returns 404 if the topic id is not a UUID or the topic doesn't exist.
#[instrument(skip(state, user))]
pub async fn show(
    State(state): State<AppState>,
    OptionalUser(user): OptionalUser,
    Path(id): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse> {
    let topic_id: TopicId = id
        .parse()
        .map_err(|_| AppError::NotFound(format!("topic {id}")))?;
    let page = query.page.unwrap_or(1).max(1);

    let topic = TopicRepository::new(state.pool())
        .get(topic_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("topic {id}")))?;

    let posts_repo = PostRepository::new(state.pool());
    let posts = posts_repo.list_by_topic(topic_id, page, PAGE_SIZE).await?;
    let total = posts_repo.count_by_topic(topic_id).await?;

    Ok(TopicTemplate {
        topic: TopicView::from(&topic),
        posts: posts.iter().map(PostView::from).collect(),
        pagination: Pagination::new(total, page, PAGE_SIZE),
        current_user: user.map(|u| u.handle),
    })
}

/// JSON request body for creating a topic.
#[derive(Debug, Deserialize)]
pub struct CreateTopicRequest {
    pub title: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Create a topic (JSON API).
#[instrument(skip(state, user, request))]
pub async fn create(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Json(request): Json<CreateTopicRequest>,
) -> Result<impl IntoResponse> {
    if request.title.trim().is_empty() {
        return Err(AppError::BadRequest("title is required".to_owned()));
    }

    let tags = request
        .tags
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();

    let topic = TopicRepository::new(state.pool())
        .create(CreateTopic {
            title: request.title.trim().to_owned(),
            tags,
            author_id: user.id,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(topic)))
}

/// Form body for creating a post.
#[derive(Debug, Deserialize)]
pub struct NewPostForm {
    pub body: String,
    #[serde(default)]
    pub parent_post_id: Option<String>,
}

/// Create a post in a topic (HTML form).
///
/// Replying to a post enqueues a notification to that post's author. The
/// enqueue can suspend while the notification queue is full; a closed
/// queue is logged and never fails the request that created the post.
#[instrument(skip(state, user, form))]
pub async fn create_post(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<String>,
    Form(form): Form<NewPostForm>,
) -> Result<impl IntoResponse> {
    let topic_id: TopicId = id
        .parse()
        .map_err(|_| AppError::NotFound(format!("topic {id}")))?;

    if form.body.trim().is_empty() {
        return Err(AppError::BadRequest("body is a required field".to_owned()));
    }

    let parent_post_id = parse_parent_post_id(form.parent_post_id.as_deref())?;

    let topics = TopicRepository::new(state.pool());
    if topics.get(topic_id).await?.is_none() {
        return Err(AppError::NotFound(format!("topic {id}")));
    }

    let posts = PostRepository::new(state.pool());

    // Resolve the parent before creating the reply so a dangling id 404s.
    let parent = match parent_post_id {
        Some(parent_id) => Some(
            posts
                .get(parent_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("post {parent_id}")))?,
        ),
        None => None,
    };

    posts
        .create(CreatePost {
            topic_id,
            author: user.handle.clone(),
            body: form.body.trim().to_owned(),
            author_id: user.id,
            parent_post_id,
        })
        .await?;

    if let Some(parent) = parent {
        notify_parent_author(&state, &user, &parent, topic_id).await;
    }

    Ok(Redirect::to(&format!("/topics/{topic_id}")))
}

/// Enqueue a reply notification to the parent post's author.
///
/// Self-replies are not notified. A closed queue is logged and swallowed;
/// the post itself has already been persisted.
async fn notify_parent_author(state: &AppState, replier: &User, parent: &Post, topic_id: TopicId) {
    if parent.author_id == replier.id {
        return;
    }

    let notification = Notification::new(
        replier.handle.clone(),
        parent.author_id,
        format!("{} replied to your post in topic {topic_id}", replier.handle),
        format!("/topics/{topic_id}"),
    );

    if let Err(e) = state.notifications().enqueue(notification).await {
        warn!(error = %e, "could not enqueue reply notification");
    }
}

/// Parse the optional `parent_post_id` form field.
///
/// An empty field means a top-level post; a non-empty field must be a
/// valid post id.
fn parse_parent_post_id(raw: Option<&str>) -> Result<Option<PostId>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(digits) => digits
            .parse::<PostId>()
            .map(Some)
            .map_err(|_| AppError::BadRequest("invalid parent post ID".to_owned())),
    }
}

/// Format a timestamp for display.
fn format_timestamp(ts: chrono::DateTime<chrono::Utc>) -> String {
    ts.format("%b %e, %Y %H:%M").to_string()
}
