use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rusqlite::ErrorCode;

use crate::response::ApiResponse;
use crate::storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("User profile not found. Please complete your profile first.")]
    ProfileNotFound,

    #[error("Not found")]
    NotFound,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Failed to upload file: {0}")]
    Storage(#[from] StorageError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotAuthenticated => StatusCode::UNAUTHORIZED,
            AppError::ProfileNotFound | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Database(_)
            | AppError::Pool(_)
            | AppError::Storage(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the caller. Store and pool failures are logged and
    /// replaced with a generic message.
    fn public_message(&self) -> String {
        match self {
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                "Internal server error".to_string()
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                "Internal server error".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
            AppError::Storage(e) => {
                tracing::error!("Storage error: {}", e);
                self.to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body: ApiResponse<()> = ApiResponse::failure(self.public_message());
        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

/// Map a UNIQUE constraint failure to `Conflict(message)`, anything else to
/// a database error.
pub fn conflict_on_unique(message: &str) -> impl FnOnce(rusqlite::Error) -> AppError + '_ {
    move |e| match e {
        rusqlite::Error::SqliteFailure(ref err, _)
            if err.code == ErrorCode::ConstraintViolation
                && err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            AppError::Conflict(message.to_string())
        }
        other => AppError::Database(other),
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn response_status(err: AppError) -> StatusCode {
        let response = err.into_response();
        response.status()
    }

    #[test]
    fn not_authenticated_returns_401() {
        assert_eq!(
            response_status(AppError::NotAuthenticated),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn not_found_returns_404() {
        assert_eq!(response_status(AppError::NotFound), StatusCode::NOT_FOUND);
    }

    #[test]
    fn bad_request_returns_400() {
        assert_eq!(
            response_status(AppError::BadRequest("oops".into())),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn missing_profile_returns_400() {
        assert_eq!(
            response_status(AppError::ProfileNotFound),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn conflict_returns_409() {
        assert_eq!(
            response_status(AppError::Conflict("taken".into())),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn internal_returns_500() {
        assert_eq!(
            response_status(AppError::Internal("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn bad_request_message_is_surfaced_verbatim() {
        assert_eq!(
            AppError::BadRequest("Cat name is required".into()).public_message(),
            "Cat name is required"
        );
    }

    #[test]
    fn internal_details_are_hidden() {
        assert_eq!(
            AppError::Internal("secret path".into()).public_message(),
            "Internal server error"
        );
    }

    fn unique_table() -> rusqlite::Connection {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE names (name TEXT NOT NULL UNIQUE, size INTEGER CHECK (size > 0));
             INSERT INTO names (name, size) VALUES ('mochi', 1);",
        )
        .unwrap();
        conn
    }

    #[test]
    fn unique_violation_becomes_conflict() {
        let conn = unique_table();
        let err = conn
            .execute("INSERT INTO names (name, size) VALUES ('mochi', 1)", [])
            .map_err(conflict_on_unique("Name is already taken"))
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(ref msg) if msg == "Name is already taken"));
        assert_eq!(response_status(err), StatusCode::CONFLICT);
    }

    #[test]
    fn other_constraint_failures_stay_database_errors() {
        let conn = unique_table();
        let err = conn
            .execute("INSERT INTO names (name, size) VALUES ('luna', 0)", [])
            .map_err(conflict_on_unique("Name is already taken"))
            .unwrap_err();
        assert!(matches!(err, AppError::Database(_)));
    }
}
