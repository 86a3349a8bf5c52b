use rand::Rng;
use rusqlite::{params, OptionalExtension};

use crate::error::AppResult;
use crate::state::DbPool;

/// Authenticated identity behind a session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub email: String,
}

/// Create a new session for an account. Returns the session token.
pub fn create_session(pool: &DbPool, account_id: &str, hours: u64) -> AppResult<String> {
    let conn = pool.get()?;

    let token = generate_token();
    let id = uuid::Uuid::now_v7().to_string();

    conn.execute(
        "INSERT INTO sessions (id, account_id, token, expires_at)
         VALUES (?1, ?2, ?3, strftime('%Y-%m-%dT%H:%M:%fZ', 'now', ?4))",
        params![id, account_id, token, format!("+{} hours", hours)],
    )?;

    Ok(token)
}

/// Look up the identity for a live (unexpired) session token.
pub fn resolve_session(pool: &DbPool, token: &str) -> AppResult<Option<Identity>> {
    let conn = pool.get()?;
    let identity = conn
        .query_row(
            "SELECT a.id, a.email FROM sessions s
             JOIN accounts a ON a.id = s.account_id
             WHERE s.token = ?1 AND s.expires_at > strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
            params![token],
            |row| {
                Ok(Identity {
                    id: row.get(0)?,
                    email: row.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(identity)
}

/// Delete a session by token.
pub fn delete_session(pool: &DbPool, token: &str) -> AppResult<()> {
    let conn = pool.get()?;
    conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
    Ok(())
}

/// Generate a cryptographically random 32-byte hex token.
fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    hex::encode(bytes)
}
