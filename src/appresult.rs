use axum::{http::StatusCode, response::{IntoResponse, Response}};
use tracing::error;

use crate::{auth::IdentityError, db::StoreError, follows::FollowError, usernames::ResolveError};

pub type AppResult<T> = Result<T, AppError>;

/// Handler-boundary failure: a status plus a message that goes back to the
/// client as plain text. Internal errors pass their message through verbatim.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub error: anyhow::Error,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            error: anyhow::Error::msg(message.into()),
        }
    }

    pub fn internal(error: impl Into<anyhow::Error>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: error.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, error = ?self.error, "request failed");
        }
        (self.status, self.error.to_string()).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(_) => Self::conflict(err.to_string()),
            err => Self::internal(err),
        }
    }
}

impl From<ResolveError> for AppError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::Exhausted { .. } => Self::conflict(err.to_string()),
            ResolveError::Store(err) => err.into(),
        }
    }
}

impl From<FollowError> for AppError {
    fn from(err: FollowError) -> Self {
        match err {
            FollowError::SelfFollow => Self::bad_request(err.to_string()),
            FollowError::NotFound(_) => Self::not_found(err.to_string()),
            FollowError::Write(_) => Self::internal(err),
            FollowError::Store(err) => err.into(),
        }
    }
}

impl From<IdentityError> for AppError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::Rejected => Self::unauthorized(err.to_string()),
            err => Self::internal(err),
        }
    }
}
