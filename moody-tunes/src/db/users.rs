//! User database operations

use chrono::Utc;
use moody_common::db::User;
use moody_common::time;
use moody_common::Result;
use sqlx::{sqlite::SqliteRow, Row, SqliteExecutor};
use uuid::Uuid;

/// Insert a new user row
pub async fn insert_user<'e, E>(executor: E, user: &User) -> Result<()>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query("INSERT INTO users (id, username, email, created_at) VALUES (?, ?, ?, ?)")
        .bind(user.id.to_string())
        .bind(&user.username)
        .bind(&user.email)
        .bind(user.created_at.timestamp_millis())
        .execute(executor)
        .await?;

    Ok(())
}

/// Load user by username
pub async fn find_by_username<'e, E>(executor: E, username: &str) -> Result<Option<User>>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query("SELECT id, username, email, created_at FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(executor)
        .await?;

    row.map(|r| user_from_row(&r)).transpose()
}

/// Load user by id
pub async fn load_user<'e, E>(executor: E, id: Uuid) -> Result<Option<User>>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query("SELECT id, username, email, created_at FROM users WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(executor)
        .await?;

    row.map(|r| user_from_row(&r)).transpose()
}

/// Build a fresh user record
pub fn new_user(username: &str, email: Option<String>) -> User {
    User {
        id: Uuid::new_v4(),
        username: username.to_string(),
        email,
        created_at: Utc::now(),
    }
}

fn user_from_row(row: &SqliteRow) -> Result<User> {
    let id: String = row.get("id");
    Ok(User {
        id: parse_uuid(&id)?,
        username: row.get("username"),
        email: row.get("email"),
        created_at: time::from_millis(row.get("created_at")),
    })
}

/// Parse a stored UUID column
pub(crate) fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| moody_common::Error::Internal(format!("Corrupt UUID '{}': {}", value, e)))
}
