//! Pending OAuth authorization state per user

use moody_common::{time, Result};
use sqlx::SqlitePool;
use uuid::Uuid;

/// Remember the state handed to the provider; replaces any earlier one
pub async fn save_state(pool: &SqlitePool, user_id: Uuid, state: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO oauth_states (user_id, state, created_at) VALUES (?, ?, ?)
        ON CONFLICT(user_id) DO UPDATE SET
            state = excluded.state,
            created_at = excluded.created_at
        "#,
    )
    .bind(user_id.to_string())
    .bind(state)
    .bind(time::now_millis())
    .execute(pool)
    .await?;

    Ok(())
}

/// Remove and return the pending state (single use)
pub async fn take_state(pool: &SqlitePool, user_id: Uuid) -> Result<Option<String>> {
    let state = sqlx::query_scalar("DELETE FROM oauth_states WHERE user_id = ? RETURNING state")
        .bind(user_id.to_string())
        .fetch_optional(pool)
        .await?;
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::users;
    use moody_common::db::init_memory_database;

    #[tokio::test]
    async fn test_state_is_single_use() {
        let pool = init_memory_database().await.unwrap();
        let user = users::new_user("alice", None);
        users::insert_user(&pool, &user).await.unwrap();

        save_state(&pool, user.id, "first").await.unwrap();
        save_state(&pool, user.id, "second").await.unwrap();

        assert_eq!(take_state(&pool, user.id).await.unwrap().as_deref(), Some("second"));
        assert_eq!(take_state(&pool, user.id).await.unwrap(), None);
    }
}
