//! JSON/form API handlers.

use axum::{
    Form, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::instrument;

use madrona_core::NotificationId;

use crate::db::notifications::PgNotificationStore;
use crate::error::{AppError, Result};
use crate::middleware::RequireUser;
use crate::services::auth::AuthService;
use crate::services::notifications::NotificationStore;
use crate::state::AppState;

/// JSON request body for creating a user.
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    pub handle: String,
    #[serde(default)]
    pub admin: bool,
}

/// Create a new user account.
///
/// Returns the created user, including the generated API key - the one
/// time a caller learns it. The password hash never appears in responses.
#[instrument(skip(state, request))]
pub async fn create_user(
    State(state): State<AppState>,
    Json(request): Json<CreateUserRequest>,
) -> Result<impl IntoResponse> {
    if request.email.is_empty() || request.password.is_empty() || request.handle.is_empty() {
        return Err(AppError::BadRequest(
            "email, password, and handle are required fields".to_owned(),
        ));
    }

    let user = AuthService::new(state.pool())
        .register(
            &request.email,
            &request.password,
            &request.handle,
            request.admin,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(user)))
}

/// Form body for deleting a notification.
#[derive(Debug, Deserialize)]
pub struct DeleteNotificationForm {
    pub id: String,
}

/// Delete one of the caller's notifications by id.
///
/// Not-found is reported distinctly (404) from success.
#[instrument(skip(state, user, form))]
pub async fn delete_notification(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Form(form): Form<DeleteNotificationForm>,
) -> Result<impl IntoResponse> {
    if form.id.is_empty() {
        return Err(AppError::BadRequest("missing notification ID".to_owned()));
    }

    let id: NotificationId = form
        .id
        .parse()
        .map_err(|_| AppError::BadRequest("invalid notification ID".to_owned()))?;

    let deleted = PgNotificationStore::new(state.pool().clone())
        .delete(user.id, id)
        .await?;

    if !deleted {
        return Err(AppError::NotFound(format!("notification {id}")));
    }

    Ok(StatusCode::OK)
}
