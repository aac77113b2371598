//! Login and logout route handlers.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::State,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::{error, instrument, warn};

use crate::error::AppError;
use crate::filters;
use crate::middleware::auth::{clear_session, store_session_token};
use crate::services::auth::{AuthError, AuthService};
use crate::state::AppState;

/// Login page template.
#[derive(Template, WebTemplate)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub error: Option<String>,
    pub current_user: Option<String>,
}

/// Login form fields.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

/// Display the login page.
pub async fn login_page() -> impl IntoResponse {
    LoginTemplate {
        error: None,
        current_user: None,
    }
}

/// Handle login form submission.
///
/// Wrong credentials re-render the login page with an error; the form
/// never reveals whether the email or the password was at fault.
#[instrument(skip(state, session, form))]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Response {
    let auth = AuthService::new(state.pool());

    match auth.login(&form.email, &form.password).await {
        Ok((_user, token)) => {
            if let Err(e) = store_session_token(&session, &token.value).await {
                error!(error = %e, "failed to store session token");
                return AppError::Internal("session store failed".to_owned()).into_response();
            }
            Redirect::to("/topics").into_response()
        }
        Err(AuthError::InvalidCredentials | AuthError::InvalidEmail(_)) => {
            warn!("login failed");
            LoginTemplate {
                error: Some("Invalid email or password.".to_owned()),
                current_user: None,
            }
            .into_response()
        }
        Err(e) => AppError::Auth(e).into_response(),
    }
}

/// Handle logout.
///
/// Clears only the session pointer; the token row expires on its own and
/// the maintenance sweep removes it.
#[instrument(skip(session))]
pub async fn logout(session: Session) -> Response {
    if let Err(e) = clear_session(&session).await {
        warn!(error = %e, "failed to clear session on logout");
    }
    Redirect::to("/topics").into_response()
}
