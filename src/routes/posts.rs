use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::db::models::PostDetail;
use crate::error::{AppError, AppResult};
use crate::extractors::{ApiJson, ApiMultipart, MaybeUser};
use crate::response::{ok, ApiResponse};
use crate::services::posts::{self, MediaUpload, NewPost, PostUpdate};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct Deleted {
    pub deleted: usize,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/posts", get(list_posts).post(create_post))
        .route("/api/posts/mine", get(list_my_posts))
        .route(
            "/api/posts/{id}",
            get(get_post).patch(update_post).delete(delete_post),
        )
}

pub(crate) fn multipart_error(e: MultipartError) -> AppError {
    AppError::BadRequest(format!("Invalid form data: {}", e.body_text()))
}

/// Read the create-post form. Text fields: `cat_name`, `story`, `location`,
/// repeated `tags` (each may also be a comma-separated list). File fields:
/// repeated `media`.
async fn read_new_post(mut multipart: Multipart) -> AppResult<NewPost> {
    let mut form = NewPost::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "cat_name" => form.cat_name = field.text().await.map_err(multipart_error)?,
            "story" => form.story = Some(field.text().await.map_err(multipart_error)?),
            "location" => form.location = Some(field.text().await.map_err(multipart_error)?),
            "tags" => {
                let value = field.text().await.map_err(multipart_error)?;
                form.tags.extend(value.split(',').map(str::to_string));
            }
            "media" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field
                    .content_type()
                    .map(str::to_string)
                    .unwrap_or_else(|| {
                        mime_guess::from_path(&file_name)
                            .first_or_octet_stream()
                            .to_string()
                    });
                let data = field.bytes().await.map_err(multipart_error)?;
                if data.is_empty() {
                    continue;
                }
                form.media.push(MediaUpload {
                    file_name,
                    content_type,
                    data,
                });
            }
            other => tracing::debug!(field = other, "Ignoring unknown form field"),
        }
    }

    Ok(form)
}

async fn list_posts(State(state): State<AppState>) -> AppResult<Json<ApiResponse<Vec<PostDetail>>>> {
    Ok(ok(posts::list_posts(&state.db)?))
}

async fn list_my_posts(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
) -> AppResult<Json<ApiResponse<Vec<PostDetail>>>> {
    Ok(ok(posts::list_user_posts(&state.db, user.as_ref())?))
}

async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<PostDetail>>> {
    Ok(ok(posts::get_post(&state.db, &id)?))
}

async fn create_post(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    ApiMultipart(multipart): ApiMultipart,
) -> AppResult<Json<ApiResponse<PostDetail>>> {
    let form = read_new_post(multipart).await?;
    let post = posts::create_post(&state.db, state.storage.as_ref(), user.as_ref(), form).await?;
    Ok(ok(post))
}

async fn update_post(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path(id): Path<String>,
    ApiJson(update): ApiJson<PostUpdate>,
) -> AppResult<Json<ApiResponse<PostDetail>>> {
    Ok(ok(posts::update_post(&state.db, user.as_ref(), &id, update)?))
}

async fn delete_post(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<Deleted>>> {
    let deleted = posts::delete_post(&state.db, user.as_ref(), &id)?;
    Ok(ok(Deleted { deleted }))
}
