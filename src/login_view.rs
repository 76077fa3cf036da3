use std::sync::Arc;

use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Extension, Json,
};
use axum_extra::extract::{
    cookie::{Cookie, CookieJar, SameSite},
    WithRejection,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::auth::SESSION_ID_KEY;
use crate::manager::{
    login_manager::LoginManager,
    session_manager::{SessionId, SessionManager},
    Caller, User,
};
use crate::response::{self, ApiError};
use crate::AppState;

#[derive(Deserialize, Validate)]
pub struct LoginForm {
    #[validate(email)]
    email: String,
    #[validate(length(min = 8, max = 30))]
    password: String,
}

#[derive(Serialize)]
struct LoginResponse {
    token: String,
    user: User,
}

pub async fn try_login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    WithRejection(Json(credentials), _): WithRejection<Json<LoginForm>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    credentials.validate()?;
    let LoginForm { email, password } = credentials;

    let user = LoginManager::new(&state.pool)
        .get_user(&email, &password)
        .await?;
    let sid = SessionManager::new(&state.pool, state.config.session_ttl)
        .generate_session_id_for(&user)
        .await?;

    let cookie = Cookie::build(SESSION_ID_KEY, sid.to_string())
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .finish();
    tracing::info!(user_id = %user.id, "user logged in");

    Ok((
        jar.add(cookie),
        response::ok(LoginResponse {
            token: sid.0,
            user,
        }),
    ))
}

#[derive(Deserialize, Validate)]
pub struct RegisterUserForm {
    #[validate(length(min = 1))]
    name: String,
    #[validate(email)]
    email: String,
    #[validate(length(min = 8, max = 30))]
    password: String,
    confirm_password: String,
}

pub async fn try_register(
    State(state): State<Arc<AppState>>,
    WithRejection(Json(form), _): WithRejection<Json<RegisterUserForm>, ApiError>,
) -> Result<Response, ApiError> {
    form.validate()?;
    let RegisterUserForm {
        name,
        email,
        password,
        confirm_password,
    } = form;

    let user = LoginManager::new(&state.pool)
        .new_user(&name, &email, &password, &confirm_password)
        .await?;
    Ok(response::created(user))
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(session_id): Extension<SessionId>,
    jar: CookieJar,
) -> Result<impl IntoResponse, ApiError> {
    SessionManager::new(&state.pool, state.config.session_ttl)
        .end_session(&session_id)
        .await?;

    let mut cookie = Cookie::named(SESSION_ID_KEY);
    cookie.set_path("/");
    Ok((jar.remove(cookie), response::ok(())))
}

pub async fn validate(Extension(caller): Extension<Caller>) -> Response {
    response::ok(caller.user_id)
}
