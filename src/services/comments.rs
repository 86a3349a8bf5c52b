use rusqlite::{params, Connection, OptionalExtension};

use crate::auth::session::Identity;
use crate::db::models::{Comment, CommentWithAuthor, User};
use crate::error::{AppError, AppResult};
use crate::state::DbPool;

const SELECT_WITH_AUTHOR: &str = "SELECT c.id, c.post_id, c.user_id, c.content, c.created_at, c.updated_at,
            u.id, u.username, u.bio, u.avatar_url, u.created_at, u.updated_at
     FROM comments c
     LEFT JOIN users u ON u.id = c.user_id";

fn comment_with_author(row: &rusqlite::Row<'_>) -> rusqlite::Result<CommentWithAuthor> {
    let comment = Comment::from_row(row)?;
    let user = match row.get::<_, Option<String>>(6)? {
        Some(_) => Some(User::from_row_at(row, 6)?),
        None => None,
    };
    Ok(CommentWithAuthor { comment, user })
}

fn validate_content(content: &str) -> AppResult<String> {
    let content = content.trim();
    if content.is_empty() {
        return Err(AppError::BadRequest("Comment cannot be empty".into()));
    }
    Ok(content.to_string())
}

pub(crate) fn comments_for_post(
    conn: &Connection,
    post_id: &str,
) -> rusqlite::Result<Vec<CommentWithAuthor>> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT_WITH_AUTHOR} WHERE c.post_id = ?1 ORDER BY c.created_at ASC, c.id ASC"
    ))?;
    let comments = stmt
        .query_map(params![post_id], comment_with_author)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(comments)
}

fn find_comment(conn: &Connection, id: &str) -> rusqlite::Result<Option<CommentWithAuthor>> {
    conn.query_row(
        &format!("{SELECT_WITH_AUTHOR} WHERE c.id = ?1"),
        params![id],
        comment_with_author,
    )
    .optional()
}

/// Comments on a post, oldest first.
pub fn list_comments(pool: &DbPool, post_id: &str) -> AppResult<Vec<CommentWithAuthor>> {
    let conn = pool.get()?;
    Ok(comments_for_post(&conn, post_id)?)
}

pub fn add_comment(
    pool: &DbPool,
    identity: Option<&Identity>,
    post_id: &str,
    content: &str,
) -> AppResult<CommentWithAuthor> {
    let content = validate_content(content)?;
    let identity = identity.ok_or(AppError::NotAuthenticated)?;

    let conn = pool.get()?;
    let post_exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM posts WHERE id = ?1",
        params![post_id],
        |row| row.get(0),
    )?;
    if !post_exists {
        return Err(AppError::NotFound);
    }

    let id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO comments (id, post_id, user_id, content) VALUES (?1, ?2, ?3, ?4)",
        params![id, post_id, identity.id, content],
    )?;
    tracing::info!(comment_id = %id, post_id, user_id = %identity.id, "Comment added");

    find_comment(&conn, &id)?.ok_or(AppError::NotFound)
}

/// Edit a comment's content. Only the author's own comment matches; anything
/// else is reported as not found.
pub fn update_comment(
    pool: &DbPool,
    identity: Option<&Identity>,
    id: &str,
    content: &str,
) -> AppResult<CommentWithAuthor> {
    let content = validate_content(content)?;
    let identity = identity.ok_or(AppError::NotAuthenticated)?;

    let conn = pool.get()?;
    let updated = conn.execute(
        "UPDATE comments SET content = ?1, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
         WHERE id = ?2 AND user_id = ?3",
        params![content, id, identity.id],
    )?;
    if updated == 0 {
        return Err(AppError::NotFound);
    }

    find_comment(&conn, id)?.ok_or(AppError::NotFound)
}

/// Delete the caller's comment. Ownership is a filter on the delete itself:
/// a comment belonging to someone else matches zero rows, and that is
/// returned as a successful count of 0.
pub fn delete_comment(pool: &DbPool, identity: Option<&Identity>, id: &str) -> AppResult<usize> {
    let identity = identity.ok_or(AppError::NotAuthenticated)?;

    let conn = pool.get()?;
    let deleted = conn.execute(
        "DELETE FROM comments WHERE id = ?1 AND user_id = ?2",
        params![id, identity.id],
    )?;
    tracing::info!(comment_id = id, user_id = %identity.id, deleted, "Comment delete");

    Ok(deleted)
}
