use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::storage::StorageError;

pub fn router() -> Router<AppState> {
    Router::new().route("/storage/{bucket}/{*path}", get(serve))
}

async fn serve(
    State(state): State<AppState>,
    Path((bucket, path)): Path<(String, String)>,
) -> AppResult<Response> {
    if bucket != state.config.storage.bucket {
        return Err(AppError::NotFound);
    }

    let data = match state.storage.download(&path).await {
        Ok(data) => data,
        Err(StorageError::NotFound(_)) | Err(StorageError::InvalidPath(_)) => {
            return Err(AppError::NotFound);
        }
        Err(e) => {
            return Err(AppError::Internal(format!(
                "Failed to read object {}: {}",
                path, e
            )));
        }
    };

    let mime = mime_guess::from_path(&path).first_or_octet_stream();
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, mime.as_ref().to_string()),
            (header::CACHE_CONTROL, "public, max-age=3600".to_string()),
        ],
        data,
    )
        .into_response())
}
