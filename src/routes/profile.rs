use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::db::models::User;
use crate::error::{AppError, AppResult};
use crate::extractors::{ApiJson, ApiMultipart, MaybeUser};
use crate::response::{ok, ApiResponse};
use crate::routes::posts::multipart_error;
use crate::services::profiles::{self, AvatarUpload, ProfileUpdate};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/profile", get(get_profile).patch(update_profile))
        .route("/api/profile/avatar", post(upload_avatar))
}

async fn get_profile(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
) -> AppResult<Json<ApiResponse<User>>> {
    Ok(ok(profiles::require_profile(&state.db, user.as_ref())?))
}

async fn update_profile(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    ApiJson(update): ApiJson<ProfileUpdate>,
) -> AppResult<Json<ApiResponse<User>>> {
    Ok(ok(profiles::update_profile(&state.db, user.as_ref(), update)?))
}

async fn upload_avatar(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    ApiMultipart(mut multipart): ApiMultipart,
) -> AppResult<Json<ApiResponse<User>>> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("avatar") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().unwrap_or_default().to_string();
        let data = field.bytes().await.map_err(multipart_error)?;
        upload = Some(AvatarUpload {
            file_name,
            content_type,
            data,
        });
        break;
    }
    let upload = upload.ok_or_else(|| AppError::BadRequest("No avatar file provided".into()))?;

    let profile = profiles::upload_avatar(
        &state.db,
        state.storage.as_ref(),
        user.as_ref(),
        upload,
        state.config.storage.max_avatar_bytes,
    )
    .await?;
    Ok(ok(profile))
}
