use std::sync::Arc;

use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;

use crate::manager::session_manager::{SessionId, SessionManager};
use crate::response::ApiError;
use crate::AppState;

pub const SESSION_ID_KEY: &str = "session_id";

/// The cookie wins over an `Authorization: Bearer` header.
fn session_id_from(jar: &CookieJar, headers: &HeaderMap) -> Option<SessionId> {
    if let Some(cookie) = jar.get(SESSION_ID_KEY) {
        return Some(SessionId(cookie.value().to_owned()));
    }
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| SessionId(token.trim().to_owned()))
        .filter(|sid| !sid.0.is_empty())
}

/// Attaches the caller's identity, and the session it came from, to the
/// request. Rejects the request with 401 when there is no live session.
pub async fn require_session<B>(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request<B>,
    next: Next<B>,
) -> Result<Response, ApiError> {
    let session_id = session_id_from(&jar, request.headers()).ok_or_else(ApiError::unauthorized)?;
    let caller = SessionManager::new(&state.pool, state.config.session_ttl)
        .get_caller(&session_id)
        .await?;

    tracing::debug!(user_id = %caller.user_id, "authenticated request");
    request.extensions_mut().insert(caller);
    request.extensions_mut().insert(session_id);
    Ok(next.run(request).await)
}
