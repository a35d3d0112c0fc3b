use std::fmt::{Display, Formatter};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, TodoError};

/// JSON envelope returned by the HTTP handlers on failure, and for plain
/// acknowledgements such as a successful delete.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub enum AppResponse {
    DatabaseError(String),
    SerializationError(String),
    NotFound(String),
    Conflict(String),
    UpdateFailed(String),
    BadRequest(String),
    Unauthorized(String),
    Ok(String),
}

impl Display for AppResponse {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AppResponse::DatabaseError(msg) => write!(f, "Database error: {msg}"),
            AppResponse::SerializationError(msg) => write!(f, "Serialization error: {msg}"),
            AppResponse::NotFound(msg) => write!(f, "Not found: {msg}"),
            AppResponse::Conflict(msg) => write!(f, "Conflict: {msg}"),
            AppResponse::UpdateFailed(msg) => write!(f, "Update failed: {msg}"),
            AppResponse::BadRequest(msg) => write!(f, "Bad Request: {msg}"),
            AppResponse::Unauthorized(msg) => write!(f, "Unauthorized: {msg}"),
            AppResponse::Ok(msg) => write!(f, "Ok: {msg}"),
        }
    }
}

impl AppResponse {
    pub fn success(msg: impl Into<String>) -> Self {
        AppResponse::Ok(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppResponse::DatabaseError(_)
            | AppResponse::SerializationError(_)
            | AppResponse::UpdateFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppResponse::NotFound(_) => StatusCode::NOT_FOUND,
            AppResponse::Conflict(_) => StatusCode::CONFLICT,
            AppResponse::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppResponse::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppResponse::Ok(_) => StatusCode::OK,
        }
    }
}

impl From<StoreError> for AppResponse {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict => AppResponse::Conflict(err.to_string()),
            StoreError::NotFound => AppResponse::NotFound(err.to_string()),
            StoreError::BadRequest(msg) => AppResponse::BadRequest(msg),
            StoreError::Serialization(e) => {
                AppResponse::SerializationError(format!("JSON serialization error: {}", e))
            }
            StoreError::Database(e) => AppResponse::DatabaseError(format!("{}", e)),
            StoreError::Io(e) => AppResponse::DatabaseError(format!("IO error: {}", e)),
        }
    }
}

impl From<TodoError> for AppResponse {
    fn from(err: TodoError) -> Self {
        match err {
            TodoError::Conflict { .. } => AppResponse::Conflict(err.to_string()),
            TodoError::NotFound { .. } => AppResponse::NotFound(err.to_string()),
            TodoError::UpdateFailed(_) => AppResponse::UpdateFailed(err.to_string()),
            TodoError::Store(e) => AppResponse::from(e),
        }
    }
}

impl IntoResponse for AppResponse {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}
