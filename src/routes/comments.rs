use axum::extract::{Path, State};
use axum::routing::{get, patch};
use axum::{Json, Router};
use serde::Deserialize;

use crate::db::models::CommentWithAuthor;
use crate::error::AppResult;
use crate::extractors::{ApiJson, MaybeUser};
use crate::response::{ok, ApiResponse};
use crate::routes::posts::Deleted;
use crate::services::comments;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CommentForm {
    pub content: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/posts/{id}/comments",
            get(list_comments).post(add_comment),
        )
        .route(
            "/api/comments/{id}",
            patch(update_comment).delete(delete_comment),
        )
}

async fn list_comments(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> AppResult<Json<ApiResponse<Vec<CommentWithAuthor>>>> {
    Ok(ok(comments::list_comments(&state.db, &post_id)?))
}

async fn add_comment(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path(post_id): Path<String>,
    ApiJson(form): ApiJson<CommentForm>,
) -> AppResult<Json<ApiResponse<CommentWithAuthor>>> {
    Ok(ok(comments::add_comment(
        &state.db,
        user.as_ref(),
        &post_id,
        &form.content,
    )?))
}

async fn update_comment(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path(id): Path<String>,
    ApiJson(form): ApiJson<CommentForm>,
) -> AppResult<Json<ApiResponse<CommentWithAuthor>>> {
    Ok(ok(comments::update_comment(
        &state.db,
        user.as_ref(),
        &id,
        &form.content,
    )?))
}

async fn delete_comment(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<Deleted>>> {
    let deleted = comments::delete_comment(&state.db, user.as_ref(), &id)?;
    Ok(ok(Deleted { deleted }))
}
