use rand::Rng;
use rusqlite::{params, OptionalExtension};

use crate::auth::session::Identity;
use crate::error::{conflict_on_unique, AppError, AppResult};
use crate::state::DbPool;

const MIN_PASSWORD_LEN: usize = 8;
const MAX_USERNAME_ATTEMPTS: usize = 8;

fn normalize_email(email: &str) -> AppResult<String> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(AppError::BadRequest("A valid email address is required".into())),
    }
}

/// Default username for a new profile: the email's local part, reduced to
/// characters that are safe in URLs.
fn username_from_email(email: &str) -> String {
    let local = email.split('@').next().unwrap_or_default();
    let name: String = local
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    if name.is_empty() {
        "cat-lover".to_string()
    } else {
        name
    }
}

/// Create an account and its profile, returning the new identity.
pub fn sign_up(pool: &DbPool, email: &str, password: &str, cost: u32) -> AppResult<Identity> {
    let email = normalize_email(email)?;
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    let password_hash =
        bcrypt::hash(password, cost).map_err(|e| AppError::Internal(e.to_string()))?;

    let mut conn = pool.get()?;
    let tx = conn.transaction()?;

    let id = uuid::Uuid::now_v7().to_string();
    tx.execute(
        "INSERT INTO accounts (id, email, password_hash) VALUES (?1, ?2, ?3)",
        params![id, email, password_hash],
    )
    .map_err(conflict_on_unique("An account with this email already exists"))?;

    let base = username_from_email(&email);
    let mut username = base.clone();
    let mut attempts = 0;
    loop {
        let taken: bool = tx.query_row(
            "SELECT COUNT(*) > 0 FROM users WHERE username = ?1",
            params![username],
            |row| row.get(0),
        )?;
        if !taken {
            break;
        }
        attempts += 1;
        if attempts > MAX_USERNAME_ATTEMPTS {
            return Err(AppError::Conflict(
                "Could not pick a free username, please try again".into(),
            ));
        }
        let suffix: [u8; 2] = rand::thread_rng().gen();
        username = format!("{}-{}", base, hex::encode(suffix));
    }

    tx.execute(
        "INSERT INTO users (id, username) VALUES (?1, ?2)",
        params![id, username],
    )
    .map_err(conflict_on_unique("Username is already taken"))?;
    tx.commit()?;

    tracing::info!(account_id = %id, username = %username, "Account created");
    Ok(Identity { id, email })
}

/// Verify credentials and return the matching identity.
pub fn sign_in(pool: &DbPool, email: &str, password: &str) -> AppResult<Identity> {
    let email = normalize_email(email)?;
    let conn = pool.get()?;

    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT id, password_hash FROM accounts WHERE email = ?1",
            params![email],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let invalid = || AppError::BadRequest("Invalid login credentials".into());
    let (id, password_hash) = row.ok_or_else(invalid)?;
    if !bcrypt::verify(password, &password_hash).unwrap_or(false) {
        return Err(invalid());
    }

    Ok(Identity { id, email })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    const TEST_COST: u32 = 4;

    fn pool() -> (tempfile::TempDir, DbPool) {
        let tmp = tempfile::tempdir().unwrap();
        let pool = db::create_pool(&tmp.path().join("test.db")).unwrap();
        db::run_migrations(&pool).unwrap();
        (tmp, pool)
    }

    #[test]
    fn username_from_email_strips_symbols() {
        assert_eq!(username_from_email("tom.cat+1@example.com"), "tomcat1");
        assert_eq!(username_from_email("...@example.com"), "cat-lover");
    }

    #[test]
    fn sign_up_creates_account_and_profile() {
        let (_tmp, pool) = pool();
        let identity = sign_up(&pool, " Whiskers@Example.com ", "purrpurr", TEST_COST).unwrap();
        assert_eq!(identity.email, "whiskers@example.com");

        let conn = pool.get().unwrap();
        let username: String = conn
            .query_row(
                "SELECT username FROM users WHERE id = ?1",
                params![identity.id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(username, "whiskers");
    }

    #[test]
    fn sign_up_suffixes_taken_username() {
        let (_tmp, pool) = pool();
        sign_up(&pool, "luna@a.com", "purrpurr", TEST_COST).unwrap();
        let second = sign_up(&pool, "luna@b.com", "purrpurr", TEST_COST).unwrap();

        let conn = pool.get().unwrap();
        let username: String = conn
            .query_row(
                "SELECT username FROM users WHERE id = ?1",
                params![second.id],
                |row| row.get(0),
            )
            .unwrap();
        assert!(username.starts_with("luna-"));
        assert_eq!(username.len(), "luna-".len() + 4);
    }

    #[test]
    fn sign_up_never_reuses_a_username() {
        let (_tmp, pool) = pool();
        for domain in ["a.com", "b.com", "c.com", "d.com"] {
            sign_up(&pool, &format!("luna@{domain}"), "purrpurr", TEST_COST).unwrap();
        }

        let conn = pool.get().unwrap();
        let distinct: i64 = conn
            .query_row(
                "SELECT COUNT(DISTINCT username) FROM users WHERE username LIKE 'luna%'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(distinct, 4);
    }

    #[test]
    fn duplicate_email_leaves_no_partial_rows() {
        let (_tmp, pool) = pool();
        sign_up(&pool, "luna@a.com", "purrpurr", TEST_COST).unwrap();
        assert!(sign_up(&pool, "luna@a.com", "purrpurr", TEST_COST).is_err());

        let conn = pool.get().unwrap();
        let (accounts, users): (i64, i64) = conn
            .query_row(
                "SELECT (SELECT COUNT(*) FROM accounts), (SELECT COUNT(*) FROM users)",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!((accounts, users), (1, 1));
    }

    #[test]
    fn sign_up_rejects_duplicate_email() {
        let (_tmp, pool) = pool();
        sign_up(&pool, "luna@a.com", "purrpurr", TEST_COST).unwrap();
        let err = sign_up(&pool, "LUNA@a.com", "purrpurr", TEST_COST).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn sign_up_rejects_short_password_and_bad_email() {
        let (_tmp, pool) = pool();
        assert!(matches!(
            sign_up(&pool, "luna@a.com", "short", TEST_COST),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            sign_up(&pool, "not-an-email", "purrpurr", TEST_COST),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn sign_in_checks_password() {
        let (_tmp, pool) = pool();
        let created = sign_up(&pool, "luna@a.com", "purrpurr", TEST_COST).unwrap();

        let identity = sign_in(&pool, "luna@a.com", "purrpurr").unwrap();
        assert_eq!(identity, created);

        assert!(sign_in(&pool, "luna@a.com", "wrong-password").is_err());
        assert!(sign_in(&pool, "nobody@a.com", "purrpurr").is_err());
    }
}
