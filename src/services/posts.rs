//! Memorial post flows.
//!
//! Authoring is a sequence of independent store and storage calls with no
//! enclosing transaction: once the post row is inserted it stays, whatever
//! happens to the media uploads and tag links that follow.

use bytes::Bytes;
use futures::future::{join_all, try_join_all};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Deserialize;
use tracing::instrument;

use crate::auth::session::Identity;
use crate::db::models::{Media, MediaType, Post, PostDetail, Tag};
use crate::error::{AppError, AppResult};
use crate::services::{comments, profiles, tags};
use crate::state::DbPool;
use crate::storage::{file_extension, ObjectStore, UploadOptions};

/// A file attached to a new post.
#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

#[derive(Debug, Clone, Default)]
pub struct NewPost {
    pub cat_name: String,
    pub story: Option<String>,
    pub location: Option<String>,
    pub media: Vec<MediaUpload>,
    pub tags: Vec<String>,
}

/// Partial edit. `None` leaves a field alone; an empty story or location
/// clears it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostUpdate {
    pub cat_name: Option<String>,
    pub story: Option<String>,
    pub location: Option<String>,
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required_cat_name(cat_name: &str) -> AppResult<String> {
    let cat_name = cat_name.trim();
    if cat_name.is_empty() {
        return Err(AppError::BadRequest("Cat name is required".into()));
    }
    Ok(cat_name.to_string())
}

/// Object key for a post attachment: `{user}/{post}/{millis}-{index}.{ext}`.
/// The index keeps files uploaded within the same millisecond apart.
pub fn media_object_path(
    user_id: &str,
    post_id: &str,
    stamp_millis: i64,
    index: usize,
    upload: &MediaUpload,
) -> String {
    let ext = file_extension(&upload.file_name)
        .or_else(|| {
            mime_guess::get_mime_extensions_str(&upload.content_type)
                .and_then(|exts| exts.first())
                .map(|ext| ext.to_string())
        })
        .unwrap_or_else(|| "bin".to_string());
    format!("{user_id}/{post_id}/{stamp_millis}-{index}.{ext}")
}

fn media_for_post(conn: &Connection, post_id: &str) -> rusqlite::Result<Vec<Media>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM media WHERE post_id = ?1 ORDER BY created_at ASC, id ASC",
        Media::COLUMNS
    ))?;
    let media = stmt
        .query_map(params![post_id], Media::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(media)
}

fn load_detail(conn: &Connection, post: Post) -> rusqlite::Result<PostDetail> {
    let user = profiles::find_profile(conn, &post.user_id)?;
    let media = media_for_post(conn, &post.id)?;
    let tags = tags::tags_for_post(conn, &post.id)?;
    let comments = comments::comments_for_post(conn, &post.id)?;
    Ok(PostDetail {
        post,
        user,
        media,
        tags,
        comments,
    })
}

fn query_details(
    conn: &Connection,
    filter: &str,
    args: &[&dyn rusqlite::ToSql],
) -> rusqlite::Result<Vec<PostDetail>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM posts {} ORDER BY created_at DESC, id DESC",
        Post::COLUMNS,
        filter
    ))?;
    let posts = stmt
        .query_map(args, Post::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    posts
        .into_iter()
        .map(|post| load_detail(conn, post))
        .collect()
}

/// Every post, newest first, with all relations joined.
pub fn list_posts(pool: &DbPool) -> AppResult<Vec<PostDetail>> {
    let conn = pool.get()?;
    Ok(query_details(&conn, "", &[])?)
}

/// The caller's own posts, newest first.
pub fn list_user_posts(pool: &DbPool, identity: Option<&Identity>) -> AppResult<Vec<PostDetail>> {
    let identity = identity.ok_or(AppError::NotAuthenticated)?;
    let conn = pool.get()?;
    Ok(query_details(&conn, "WHERE user_id = ?1", &[&identity.id])?)
}

pub fn get_post(pool: &DbPool, id: &str) -> AppResult<PostDetail> {
    let conn = pool.get()?;
    let post = conn
        .query_row(
            &format!("SELECT {} FROM posts WHERE id = ?1", Post::COLUMNS),
            params![id],
            Post::from_row,
        )
        .optional()?
        .ok_or(AppError::NotFound)?;
    Ok(load_detail(&conn, post)?)
}

async fn attach_media(
    pool: &DbPool,
    storage: &dyn ObjectStore,
    post: &Post,
    path: String,
    upload: MediaUpload,
) -> AppResult<Media> {
    let media_type = MediaType::from_mime(&upload.content_type);
    let stored = storage
        .upload(
            &path,
            upload.data,
            UploadOptions {
                content_type: Some(upload.content_type),
                upsert: false,
            },
        )
        .await?;
    let url = storage.public_url(&stored);

    let conn = pool.get()?;
    let id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO media (id, post_id, url, type) VALUES (?1, ?2, ?3, ?4)",
        params![id, post.id, url, media_type],
    )?;
    let media = conn.query_row(
        &format!("SELECT {} FROM media WHERE id = ?1", Media::COLUMNS),
        params![id],
        Media::from_row,
    )?;
    Ok(media)
}

async fn link_tag(pool: &DbPool, post_id: &str, name: &str) -> AppResult<Tag> {
    let tag = tags::get_or_create_tag(pool, name)?;
    tags::attach_tag(pool, post_id, &tag.id)?;
    Ok(tag)
}

/// Author a memorial post: insert the post, upload and register every media
/// file, resolve and link every tag, then read the whole thing back.
#[instrument(skip_all, fields(media = input.media.len(), tags = input.tags.len()))]
pub async fn create_post(
    pool: &DbPool,
    storage: &dyn ObjectStore,
    identity: Option<&Identity>,
    input: NewPost,
) -> AppResult<PostDetail> {
    let cat_name = required_cat_name(&input.cat_name)?;
    let identity = identity.ok_or(AppError::NotAuthenticated)?;
    let profile = profiles::require_profile(pool, Some(identity))?;

    let post = {
        let conn = pool.get()?;
        let id = uuid::Uuid::now_v7().to_string();
        conn.execute(
            "INSERT INTO posts (id, user_id, title, cat_name, story, location)
             VALUES (?1, ?2, ?3, ?3, ?4, ?5)",
            params![
                id,
                profile.id,
                cat_name,
                blank_to_none(input.story),
                blank_to_none(input.location)
            ],
        )?;
        conn.query_row(
            &format!("SELECT {} FROM posts WHERE id = ?1", Post::COLUMNS),
            params![id],
            Post::from_row,
        )?
    };
    tracing::info!(post_id = %post.id, user_id = %profile.id, "Post created");

    if !input.media.is_empty() {
        let stamp = chrono::Utc::now().timestamp_millis();
        let uploads = input.media.into_iter().enumerate().map(|(index, upload)| {
            let path = media_object_path(&profile.id, &post.id, stamp, index, &upload);
            attach_media(pool, storage, &post, path, upload)
        });
        // Every upload runs to completion; the first failure is reported and
        // whatever already landed stays.
        let results = join_all(uploads).await;
        let attached = results.into_iter().collect::<AppResult<Vec<Media>>>();
        if let Err(e) = &attached {
            tracing::warn!(post_id = %post.id, error = %e, "Media upload failed after post insert");
        }
        attached?;
    }

    let tag_names = tags::normalize_tag_names(&input.tags);
    if !tag_names.is_empty() {
        try_join_all(tag_names.iter().map(|name| link_tag(pool, &post.id, name))).await?;
    }

    get_post(pool, &post.id)
}

/// Edit title, story and location of the caller's post. Media, tags and the
/// stored cat name are left alone. A post the caller does not own matches
/// nothing and is returned unchanged.
pub fn update_post(
    pool: &DbPool,
    identity: Option<&Identity>,
    id: &str,
    update: PostUpdate,
) -> AppResult<PostDetail> {
    let title = update
        .cat_name
        .as_deref()
        .map(required_cat_name)
        .transpose()?;
    let identity = identity.ok_or(AppError::NotAuthenticated)?;

    let story_set = update.story.is_some();
    let location_set = update.location.is_some();

    let conn = pool.get()?;
    let updated = conn.execute(
        "UPDATE posts SET
            title = COALESCE(?1, title),
            story = CASE WHEN ?2 THEN ?3 ELSE story END,
            location = CASE WHEN ?4 THEN ?5 ELSE location END,
            updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
         WHERE id = ?6 AND user_id = ?7",
        params![
            title,
            story_set,
            blank_to_none(update.story),
            location_set,
            blank_to_none(update.location),
            id,
            identity.id
        ],
    )?;
    tracing::info!(post_id = id, user_id = %identity.id, updated, "Post update");
    drop(conn);

    get_post(pool, id)
}

/// Delete the caller's post. Media rows, tag links and comments go with it
/// through the schema's cascading foreign keys; stored objects are kept.
/// Returns the number of posts removed (0 when the caller is not the owner).
pub fn delete_post(pool: &DbPool, identity: Option<&Identity>, id: &str) -> AppResult<usize> {
    let identity = identity.ok_or(AppError::NotAuthenticated)?;
    let conn = pool.get()?;
    let deleted = conn.execute(
        "DELETE FROM posts WHERE id = ?1 AND user_id = ?2",
        params![id, identity.id],
    )?;
    tracing::info!(post_id = id, user_id = %identity.id, deleted, "Post delete");
    Ok(deleted)
}
