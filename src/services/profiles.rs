use bytes::Bytes;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Deserialize;

use crate::auth::session::Identity;
use crate::db::models::User;
use crate::error::{conflict_on_unique, AppError, AppResult};
use crate::state::DbPool;
use crate::storage::{file_extension, ObjectStore, UploadOptions};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub username: Option<String>,
    pub bio: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AvatarUpload {
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

pub(crate) fn find_profile(conn: &Connection, user_id: &str) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {} FROM users WHERE id = ?1", User::COLUMNS),
        params![user_id],
        User::from_row,
    )
    .optional()
}

/// Resolve a session identity to its profile row.
pub fn require_profile(pool: &DbPool, identity: Option<&Identity>) -> AppResult<User> {
    let identity = identity.ok_or(AppError::NotAuthenticated)?;
    let conn = pool.get()?;
    find_profile(&conn, &identity.id)?.ok_or(AppError::ProfileNotFound)
}

pub fn update_profile(
    pool: &DbPool,
    identity: Option<&Identity>,
    update: ProfileUpdate,
) -> AppResult<User> {
    let identity = identity.ok_or(AppError::NotAuthenticated)?;

    let username = match update.username {
        Some(name) => {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(AppError::BadRequest("Username cannot be empty".into()));
            }
            Some(name)
        }
        None => None,
    };
    let bio_set = update.bio.is_some();
    let bio = update.bio.filter(|b| !b.trim().is_empty());

    let conn = pool.get()?;

    // Uniqueness is left to the column constraint.
    let updated = conn
        .execute(
            "UPDATE users SET
                username = COALESCE(?1, username),
                bio = CASE WHEN ?2 THEN ?3 ELSE bio END,
                updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
             WHERE id = ?4",
            params![username, bio_set, bio, identity.id],
        )
        .map_err(conflict_on_unique("Username is already taken"))?;
    if updated == 0 {
        return Err(AppError::ProfileNotFound);
    }

    find_profile(&conn, &identity.id)?.ok_or(AppError::ProfileNotFound)
}

/// Replace the caller's avatar. The previous object is removed first; a
/// failed removal is logged and does not stop the upload.
pub async fn upload_avatar(
    pool: &DbPool,
    storage: &dyn ObjectStore,
    identity: Option<&Identity>,
    upload: AvatarUpload,
    max_bytes: usize,
) -> AppResult<User> {
    let identity = identity.ok_or(AppError::NotAuthenticated)?;

    if upload.data.len() > max_bytes {
        return Err(AppError::BadRequest(format!(
            "File size too large. Please choose an image under {}MB.",
            max_bytes / (1024 * 1024)
        )));
    }
    if !upload.content_type.starts_with("image/") {
        return Err(AppError::BadRequest(
            "Please select a valid image file.".into(),
        ));
    }

    let profile = require_profile(pool, Some(identity))?;

    if let Some(old_url) = profile.avatar_url.as_deref() {
        if let Some(file) = old_url.rsplit('/').next().filter(|f| !f.is_empty()) {
            let old_path = format!("{}/profile/{}", identity.id, file);
            if let Err(e) = storage.remove(&[old_path]).await {
                tracing::warn!(user_id = %identity.id, error = %e, "Failed to remove old avatar");
            }
        }
    }

    let ext = file_extension(&upload.file_name).unwrap_or_else(|| "jpg".to_string());
    let path = format!(
        "{}/profile/avatar-{}.{}",
        identity.id,
        chrono::Utc::now().timestamp_millis(),
        ext
    );
    let stored = storage
        .upload(
            &path,
            upload.data,
            UploadOptions {
                content_type: Some(upload.content_type),
                upsert: true,
            },
        )
        .await?;
    let url = storage.public_url(&stored);

    let conn = pool.get()?;
    conn.execute(
        "UPDATE users SET avatar_url = ?1, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
         WHERE id = ?2",
        params![url, identity.id],
    )?;
    tracing::info!(user_id = %identity.id, "Avatar updated");

    find_profile(&conn, &identity.id)?.ok_or(AppError::ProfileNotFound)
}
