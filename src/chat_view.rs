use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::Response,
    Extension, Json,
};
use axum_extra::extract::WithRejection;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::manager::{conversation_manager::ConversationManager, Caller};
use crate::response::{self, ApiError};
use crate::utils::i64_from_string;
use crate::AppState;

#[derive(Deserialize, Validate)]
pub struct NewMessageByEmail {
    #[validate(email)]
    member_email: String,
    #[validate(length(min = 1))]
    message: String,
}

#[derive(Deserialize, Validate)]
pub struct NewMessageByRoomId {
    #[validate(length(min = 1))]
    message: String,
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    #[serde(deserialize_with = "i64_from_string")]
    time_after: i64,
    target_email: String,
}

#[derive(Deserialize)]
pub struct SearchForm {
    #[serde(default)]
    search: String,
}

pub async fn send_by_email(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    WithRejection(Json(body), _): WithRejection<Json<NewMessageByEmail>, ApiError>,
) -> Result<Response, ApiError> {
    body.validate()?;
    let message = ConversationManager::sqlite(&state.pool, state.config.request_timeout)
        .send_by_email(&caller, &body.member_email, &body.message)
        .await?;
    Ok(response::created(message))
}

pub async fn send_by_room(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    WithRejection(Path(room_id), _): WithRejection<Path<Uuid>, ApiError>,
    WithRejection(Json(body), _): WithRejection<Json<NewMessageByRoomId>, ApiError>,
) -> Result<Response, ApiError> {
    body.validate()?;
    let message = ConversationManager::sqlite(&state.pool, state.config.request_timeout)
        .send_by_room(&caller, room_id, &body.message)
        .await?;
    Ok(response::created(message))
}

pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    WithRejection(Query(query), _): WithRejection<Query<HistoryQuery>, ApiError>,
) -> Result<Response, ApiError> {
    if query.target_email.trim().is_empty() {
        return Err(ApiError::bad_request());
    }
    let messages = ConversationManager::sqlite(&state.pool, state.config.request_timeout)
        .history(&caller, &query.target_email, query.time_after)
        .await?;
    Ok(response::ok(messages))
}

pub async fn list_rooms(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
) -> Result<Response, ApiError> {
    let rooms = ConversationManager::sqlite(&state.pool, state.config.request_timeout)
        .rooms(&caller)
        .await?;
    Ok(response::ok(rooms))
}

pub async fn get_room(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    WithRejection(Path(room_id), _): WithRejection<Path<Uuid>, ApiError>,
) -> Result<Response, ApiError> {
    let room = ConversationManager::sqlite(&state.pool, state.config.request_timeout)
        .room(&caller, room_id)
        .await?;
    Ok(response::ok(room))
}

pub async fn list_users(
    State(state): State<Arc<AppState>>,
    WithRejection(Query(form), _): WithRejection<Query<SearchForm>, ApiError>,
) -> Result<Response, ApiError> {
    let users = ConversationManager::sqlite(&state.pool, state.config.request_timeout)
        .search_users(&form.search)
        .await?;
    Ok(response::ok(users))
}
