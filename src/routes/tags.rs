use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use crate::db::models::Tag;
use crate::error::AppResult;
use crate::extractors::{ApiJson, CurrentUser};
use crate::response::{ok, ApiResponse};
use crate::services::tags;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct TagForm {
    pub name: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/tags", get(list_tags).post(create_tag))
}

async fn list_tags(State(state): State<AppState>) -> AppResult<Json<ApiResponse<Vec<Tag>>>> {
    Ok(ok(tags::list_tags(&state.db)?))
}

/// Tag picker entry point. Returns the existing tag when the name is taken.
async fn create_tag(
    State(state): State<AppState>,
    _user: CurrentUser,
    ApiJson(form): ApiJson<TagForm>,
) -> AppResult<Json<ApiResponse<Tag>>> {
    Ok(ok(tags::get_or_create_tag(&state.db, &form.name)?))
}
