use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::manager::{self, login_manager, session_manager};

pub const HTTP_SUCCESS: &str = "success";
pub const HTTP_SUCCESS_CREATED: &str = "created";

pub const BAD_REQUEST: &str = "bad malformat request";
pub const UNAUTHORIZED: &str = "unauthorized access";
pub const INTERNAL_SERVER_ERROR: &str = "something wrong happened, we're working on it";

/// Envelope shared by every JSON response.
#[derive(Serialize)]
pub struct BaseResponse<T> {
    pub message: String,
    pub data: Option<T>,
}

fn envelope<T: Serialize>(status: StatusCode, message: &str, data: Option<T>) -> Response {
    (
        status,
        Json(BaseResponse {
            message: message.to_owned(),
            data,
        }),
    )
        .into_response()
}

pub fn ok<T: Serialize>(data: T) -> Response {
    envelope(StatusCode::OK, HTTP_SUCCESS, Some(data))
}

pub fn created<T: Serialize>(data: T) -> Response {
    envelope(StatusCode::CREATED, HTTP_SUCCESS_CREATED, Some(data))
}

/// A 200 envelope that carries only a message.
pub fn message(message: &str) -> Response {
    envelope::<()>(StatusCode::OK, message, None)
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request() -> Self {
        Self::new(StatusCode::BAD_REQUEST, BAD_REQUEST)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, UNAUTHORIZED)
    }

    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        envelope::<()>(self.status, &self.message, None)
    }
}

impl From<manager::Error> for ApiError {
    fn from(err: manager::Error) -> Self {
        use manager::Error;
        match err {
            Error::UserNotFound(_) => Self::new(StatusCode::NOT_FOUND, "user not found"),
            Error::RoomNotFound => Self::new(StatusCode::NOT_FOUND, err.to_string()),
            Error::SameParticipant => Self::new(StatusCode::BAD_REQUEST, err.to_string()),
            Error::Timeout { operation } => {
                Self::new(StatusCode::GATEWAY_TIMEOUT, format!("{operation} timed out"))
            }
            Error::Storage { context, source } => {
                tracing::error!(%context, error = %source, "storage failure");
                Self::internal()
            }
        }
    }
}

impl From<login_manager::Error> for ApiError {
    fn from(err: login_manager::Error) -> Self {
        use login_manager::Error;
        match err {
            Error::EmailTaken => Self::new(StatusCode::CONFLICT, err.to_string()),
            Error::PasswordMismatch | Error::NotRegistered | Error::WrongPassword => {
                Self::new(StatusCode::BAD_REQUEST, err.to_string())
            }
            Error::Hash(_) | Error::DatabaseError(_) => {
                tracing::error!(error = %err, "login failure");
                Self::internal()
            }
        }
    }
}

impl From<session_manager::Error> for ApiError {
    fn from(err: session_manager::Error) -> Self {
        match err {
            session_manager::Error::DatabaseError(e) => {
                tracing::error!(error = %e, "session lookup failed");
                Self::internal()
            }
            _ => Self::unauthorized(),
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!(error = %err, "database error");
        Self::internal()
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::new(StatusCode::BAD_REQUEST, err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(%rejection, "rejected request body");
        Self::bad_request()
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        tracing::debug!(%rejection, "rejected query string");
        Self::bad_request()
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        tracing::debug!(%rejection, "rejected path");
        Self::bad_request()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_status_codes() {
        let status = |err: manager::Error| ApiError::from(err).status;
        assert_eq!(status(manager::Error::UserNotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status(manager::Error::RoomNotFound), StatusCode::NOT_FOUND);
        assert_eq!(status(manager::Error::SameParticipant), StatusCode::BAD_REQUEST);
        assert_eq!(
            status(manager::Error::Timeout { operation: "get history" }),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status(manager::Error::Storage {
                context: "append message".into(),
                source: "disk full".into(),
            }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn storage_details_stay_out_of_the_response() {
        let err = ApiError::from(manager::Error::Storage {
            context: "append message to room 42".into(),
            source: "FOREIGN KEY constraint failed".into(),
        });
        assert_eq!(err.message, INTERNAL_SERVER_ERROR);
    }
}
