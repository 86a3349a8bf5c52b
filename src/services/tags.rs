use rusqlite::{params, Connection};

use crate::db::models::{PostTag, Tag};
use crate::error::{AppError, AppResult};
use crate::state::DbPool;

/// Canonical form of a tag name: trimmed and lowercased. `None` if nothing
/// is left.
pub fn normalize_tag_name(name: &str) -> Option<String> {
    let name = name.trim().to_lowercase();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Normalise a batch of requested names, dropping blanks and repeats while
/// keeping first-seen order.
pub fn normalize_tag_names<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = Vec::new();
    for name in names {
        if let Some(name) = normalize_tag_name(name.as_ref()) {
            if !seen.contains(&name) {
                seen.push(name);
            }
        }
    }
    seen
}

/// Idempotent upsert by unique name. Concurrent callers asking for the same
/// name all get the single row that won the insert.
pub fn get_or_create_tag(pool: &DbPool, name: &str) -> AppResult<Tag> {
    let name = normalize_tag_name(name)
        .ok_or_else(|| AppError::BadRequest("Tag name cannot be empty".into()))?;

    let conn = pool.get()?;
    let id = uuid::Uuid::now_v7().to_string();
    let inserted = conn.execute(
        "INSERT INTO tags (id, name) VALUES (?1, ?2) ON CONFLICT(name) DO NOTHING",
        params![id, name],
    )?;
    if inserted > 0 {
        tracing::debug!(tag = %name, "Created tag");
    }

    let tag = conn.query_row(
        &format!("SELECT {} FROM tags WHERE name = ?1", Tag::COLUMNS),
        params![name],
        Tag::from_row,
    )?;
    Ok(tag)
}

/// Link a tag to a post. Linking twice is a no-op.
pub fn attach_tag(pool: &DbPool, post_id: &str, tag_id: &str) -> AppResult<PostTag> {
    let conn = pool.get()?;
    conn.execute(
        "INSERT OR IGNORE INTO post_tags (post_id, tag_id) VALUES (?1, ?2)",
        params![post_id, tag_id],
    )?;
    Ok(PostTag {
        post_id: post_id.to_string(),
        tag_id: tag_id.to_string(),
    })
}

/// Every tag, alphabetically, for the tag picker.
pub fn list_tags(pool: &DbPool) -> AppResult<Vec<Tag>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM tags ORDER BY name ASC",
        Tag::COLUMNS
    ))?;
    let tags = stmt
        .query_map([], Tag::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tags)
}

pub(crate) fn tags_for_post(conn: &Connection, post_id: &str) -> rusqlite::Result<Vec<Tag>> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.name, t.created_at, t.updated_at
         FROM post_tags pt
         JOIN tags t ON t.id = pt.tag_id
         WHERE pt.post_id = ?1
         ORDER BY t.name ASC",
    )?;
    let tags = stmt
        .query_map(params![post_id], Tag::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn pool() -> (tempfile::TempDir, DbPool) {
        let tmp = tempfile::tempdir().unwrap();
        let pool = db::create_pool(&tmp.path().join("test.db")).unwrap();
        db::run_migrations(&pool).unwrap();
        (tmp, pool)
    }

    fn tag_count(pool: &DbPool) -> i64 {
        pool.get()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM tags", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn normalize_trims_and_lowercases() {
        assert_eq!(normalize_tag_name("  Tabby ").as_deref(), Some("tabby"));
        assert_eq!(normalize_tag_name("   "), None);
    }

    #[test]
    fn normalize_batch_dedupes_in_order() {
        let names = normalize_tag_names(["Orange", "tabby", " orange ", "", "Senior"]);
        assert_eq!(names, vec!["orange", "tabby", "senior"]);
    }

    #[test]
    fn get_or_create_is_idempotent() {
        let (_tmp, pool) = pool();
        let first = get_or_create_tag(&pool, "Tabby").unwrap();
        let second = get_or_create_tag(&pool, " tabby").unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.name, "tabby");
        assert_eq!(tag_count(&pool), 1);
    }

    #[test]
    fn get_or_create_rejects_blank() {
        let (_tmp, pool) = pool();
        assert!(matches!(
            get_or_create_tag(&pool, "  "),
            Err(AppError::BadRequest(_))
        ));
        assert_eq!(tag_count(&pool), 0);
    }

    #[test]
    fn list_tags_is_alphabetical() {
        let (_tmp, pool) = pool();
        for name in ["void", "calico", "orange"] {
            get_or_create_tag(&pool, name).unwrap();
        }
        let names: Vec<String> = list_tags(&pool).unwrap().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["calico", "orange", "void"]);
    }
}
