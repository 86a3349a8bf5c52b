use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::response::{AppendHeaders, IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::auth::{accounts, session};
use crate::error::AppResult;
use crate::extractors::{session_token, ApiJson};
use crate::response::{ok, ApiResponse};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SignedIn {
    pub user_id: String,
    pub email: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/signup", post(sign_up))
        .route("/api/auth/signin", post(sign_in))
        .route("/api/auth/signout", post(sign_out))
}

fn session_cookie(name: &str, token: &str, max_age_hours: u64) -> String {
    format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        name,
        token,
        max_age_hours * 3600
    )
}

fn clear_session_cookie(name: &str) -> String {
    format!("{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0", name)
}

fn open_session(state: &AppState, user_id: String, email: String) -> AppResult<Response> {
    let auth = &state.config.auth;
    let token = session::create_session(&state.db, &user_id, auth.session_hours)?;
    let cookie = session_cookie(&auth.cookie_name, &token, auth.session_hours);

    Ok((
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        ok(SignedIn { user_id, email }),
    )
        .into_response())
}

async fn sign_up(
    State(state): State<AppState>,
    ApiJson(credentials): ApiJson<Credentials>,
) -> AppResult<Response> {
    let identity = accounts::sign_up(
        &state.db,
        &credentials.email,
        &credentials.password,
        state.config.auth.bcrypt_cost,
    )?;
    open_session(&state, identity.id, identity.email)
}

async fn sign_in(
    State(state): State<AppState>,
    ApiJson(credentials): ApiJson<Credentials>,
) -> AppResult<Response> {
    let identity = accounts::sign_in(&state.db, &credentials.email, &credentials.password)?;
    tracing::info!(user_id = %identity.id, "Signed in");
    open_session(&state, identity.id, identity.email)
}

async fn sign_out(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    let cookie_name = &state.config.auth.cookie_name;
    if let Some(token) = session_token(&headers, cookie_name) {
        session::delete_session(&state.db, token)?;
    }

    Ok((
        AppendHeaders([(header::SET_COOKIE, clear_session_cookie(cookie_name))]),
        Json(ApiResponse::<()>::empty()),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_cookie_is_http_only_with_max_age() {
        let cookie = session_cookie("meowmery_session", "abc", 2);
        assert_eq!(
            cookie,
            "meowmery_session=abc; HttpOnly; SameSite=Lax; Path=/; Max-Age=7200"
        );
    }

    #[test]
    fn clear_cookie_expires_immediately() {
        assert!(clear_session_cookie("meowmery_session").ends_with("Max-Age=0"));
    }
}
