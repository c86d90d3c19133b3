//! Settings database operations
//!
//! Key-value accessors over the `settings` table.

use moody_common::{Error, Result};
use sqlx::SqlitePool;

/// Read and parse a setting; `None` when the key is absent or NULL
pub async fn get_setting<T>(db: &SqlitePool, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let value: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(db)
            .await?;

    match value.flatten() {
        Some(value) => {
            let parsed = value
                .trim()
                .parse::<T>()
                .map_err(|e| Error::Config(format!("Parse setting '{}' failed: {}", key, e)))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

/// Insert or overwrite a setting
pub async fn set_setting<T>(db: &SqlitePool, key: &str, value: T) -> Result<()>
where
    T: std::fmt::Display,
{
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await?;

    Ok(())
}
