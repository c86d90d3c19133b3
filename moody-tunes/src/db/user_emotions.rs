//! User-emotion database operations

use super::users::parse_uuid;
use moody_common::db::UserEmotion;
use moody_common::{Attributes, Emotion, Result};
use sqlx::{sqlite::SqliteRow, Row, SqliteExecutor};
use uuid::Uuid;

/// Create the (user, emotion) row with the given center unless it exists
///
/// Returns true when a row was created.
pub async fn create_if_missing<'e, E>(
    executor: E,
    user_id: Uuid,
    emotion: Emotion,
    center: &Attributes,
) -> Result<bool>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        INSERT OR IGNORE INTO user_emotions
            (user_id, emotion, energy, valence, danceability, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(user_id.to_string())
    .bind(emotion.code())
    .bind(center.energy)
    .bind(center.valence)
    .bind(center.danceability)
    .bind(moody_common::time::now_millis())
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Write a new center for (user, emotion), creating the row if needed
pub async fn save_attributes<'e, E>(
    executor: E,
    user_id: Uuid,
    emotion: Emotion,
    center: &Attributes,
) -> Result<()>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO user_emotions
            (user_id, emotion, energy, valence, danceability, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(user_id, emotion) DO UPDATE SET
            energy = excluded.energy,
            valence = excluded.valence,
            danceability = excluded.danceability,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(user_id.to_string())
    .bind(emotion.code())
    .bind(center.energy)
    .bind(center.valence)
    .bind(center.danceability)
    .bind(moody_common::time::now_millis())
    .execute(executor)
    .await?;

    Ok(())
}

/// Load one (user, emotion) row
pub async fn load<'e, E>(executor: E, user_id: Uuid, emotion: Emotion) -> Result<Option<UserEmotion>>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query(
        r#"
        SELECT user_id, emotion, energy, valence, danceability
        FROM user_emotions
        WHERE user_id = ? AND emotion = ?
        "#,
    )
    .bind(user_id.to_string())
    .bind(emotion.code())
    .fetch_optional(executor)
    .await?;

    row.map(|r| user_emotion_from_row(&r)).transpose()
}

/// All rows for a user, in registry order
pub async fn list_for_user<'e, E>(executor: E, user_id: Uuid) -> Result<Vec<UserEmotion>>
where
    E: SqliteExecutor<'e>,
{
    let rows = sqlx::query(
        r#"
        SELECT user_id, emotion, energy, valence, danceability
        FROM user_emotions
        WHERE user_id = ?
        ORDER BY id
        "#,
    )
    .bind(user_id.to_string())
    .fetch_all(executor)
    .await?;

    rows.iter().map(user_emotion_from_row).collect()
}

fn user_emotion_from_row(row: &SqliteRow) -> Result<UserEmotion> {
    let user_id: String = row.get("user_id");
    let emotion: String = row.get("emotion");
    Ok(UserEmotion {
        user_id: parse_uuid(&user_id)?,
        emotion: emotion.parse()?,
        energy: row.get("energy"),
        valence: row.get("valence"),
        danceability: row.get("danceability"),
    })
}
